//! Hashing utilities for content-addressed output caching.
//!
//! This module provides:
//! - `ContentHash`: a full 64-character hash identifying an output file
//! - `hash_output()`: hashing of file content together with its destination

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A content-addressed hash identifying one output file.
///
/// The hash is a full SHA-256 of the file content followed by the file's
/// path relative to the output root. Covering the path means a byte-identical
/// file at a new location still registers as a change, so moves and renames
/// invalidate correctly.
///
/// # Format
///
/// The hash is a lowercase hexadecimal string, e.g.
/// `"9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Hash an output file's content together with its relative destination path.
///
/// # Arguments
/// * `rel_key` - Normalized path relative to the output root (forward slashes)
/// * `content` - The bytes that would be written to that path
pub fn hash_output(rel_key: &str, content: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(content);
  hasher.update([0]);
  hasher.update(rel_key.as_bytes());
  ContentHash(format!("{:x}", hasher.finalize()))
}
