//! Content-addressed output cache.
//!
//! The cache remembers, per output file, a hash of the content last written
//! together with the file's path relative to the output root. A build asks
//! [`OutputCache::should_write`] before every physical write and skips files
//! whose bytes are already on disk; [`OutputCache::finalize`] then reports
//! files written by the previous build that the current build no longer
//! produces, so the orchestrator can prune them.
//!
//! # Storage Layout
//!
//! ```text
//! {project}/.kiln/
//! └── cache.json          # CacheFile: output root + path → hash map
//! ```
//!
//! The persisted file is advisory. A missing, unreadable, or unparseable
//! cache, or one written for a different output root, loads as an empty cache
//! and only costs redundant writes on the next build. Loading never fails.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::consts::CACHE_FILE;
use crate::util::hash::{ContentHash, hash_output};

/// Errors that can occur while persisting the cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
  /// Failed to create the metadata directory.
  #[error("failed to create cache directory: {0}")]
  CreateDir(io::Error),

  /// Failed to write the cache file.
  #[error("failed to write cache file: {0}")]
  Write(io::Error),

  /// Failed to serialize the cache.
  #[error("failed to serialize cache: {0}")]
  Serialize(serde_json::Error),
}

/// On-disk representation of the cache.
#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
  /// Output root the entries were written for.
  root: String,
  /// Relative output path → content hash.
  entries: BTreeMap<String, ContentHash>,
}

/// Two-generation cache of emitted output files.
///
/// During a build every produced file is recorded into the current
/// generation; decisions compare against the previous generation (the last
/// completed build). `Clone` exists so dry runs can run the full decision
/// logic against a scratch copy.
#[derive(Debug, Clone)]
pub struct OutputCache {
  /// Identity of the output root the previous generation belongs to.
  root: String,
  /// Entries surviving from the last completed build.
  previous: BTreeMap<String, ContentHash>,
  /// Entries recorded by the build in progress.
  current: BTreeMap<String, ContentHash>,
}

impl OutputCache {
  /// Create an empty cache for the given output root.
  pub fn new(output_root: &Path) -> Self {
    Self {
      root: output_root.display().to_string(),
      previous: BTreeMap::new(),
      current: BTreeMap::new(),
    }
  }

  /// Load the persisted cache from `meta_dir`, or an empty cache.
  ///
  /// Any read or parse problem degrades to an empty cache: the cache is an
  /// optimization, never a correctness input. A cache persisted for a
  /// different output root is ignored the same way, since its entries say
  /// nothing about what exists under the current root.
  pub fn load(meta_dir: &Path, output_root: &Path) -> Self {
    let empty = Self::new(output_root);
    let path = meta_dir.join(CACHE_FILE);

    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return empty,
      Err(e) => {
        warn!(path = %path.display(), error = %e, "ignoring unreadable output cache");
        return empty;
      }
    };

    let file: CacheFile = match serde_json::from_str(&content) {
      Ok(file) => file,
      Err(e) => {
        warn!(path = %path.display(), error = %e, "ignoring corrupt output cache");
        return empty;
      }
    };

    if file.root != empty.root {
      debug!(
        cached = %file.root,
        active = %empty.root,
        "output root changed, starting from an empty cache"
      );
      return empty;
    }

    debug!(entries = file.entries.len(), "loaded output cache");
    Self {
      root: file.root,
      previous: file.entries,
      current: BTreeMap::new(),
    }
  }

  /// Persist the previous generation to `meta_dir`.
  ///
  /// Call after [`Self::finalize`], so the promoted generation is the one
  /// written out. Written to a temp file first, then renamed into place.
  pub fn persist(&self, meta_dir: &Path) -> Result<(), CacheError> {
    fs::create_dir_all(meta_dir).map_err(CacheError::CreateDir)?;

    let file = CacheFile {
      root: self.root.clone(),
      entries: self.previous.clone(),
    };
    let content = serde_json::to_string_pretty(&file).map_err(CacheError::Serialize)?;

    let path = meta_dir.join(CACHE_FILE);
    let temp_path = meta_dir.join(format!("{}.tmp", CACHE_FILE));
    fs::write(&temp_path, &content).map_err(CacheError::Write)?;
    fs::rename(&temp_path, &path).map_err(CacheError::Write)?;
    Ok(())
  }

  /// Record `content` for `rel_key` and decide whether it must be written.
  ///
  /// Returns `false` when the previous build already wrote identical bytes to
  /// the identical relative path. The decision is stable within a build:
  /// asking again for the same path and content gives the same answer.
  pub fn should_write(&mut self, rel_key: &str, content: &[u8]) -> bool {
    let hash = hash_output(rel_key, content);
    let unchanged = self.previous.get(rel_key) == Some(&hash);
    self.current.insert(rel_key.to_string(), hash);
    !unchanged
  }

  /// Close the current generation.
  ///
  /// Returns the relative paths the previous build produced that this build
  /// did not, i.e. the files to delete, and promotes the current generation
  /// to previous.
  pub fn finalize(&mut self) -> BTreeSet<String> {
    let stale: BTreeSet<String> = self
      .previous
      .keys()
      .filter(|key| !self.current.contains_key(*key))
      .cloned()
      .collect();
    self.previous = std::mem::take(&mut self.current);
    stale
  }

  /// Number of entries in the last completed generation.
  pub fn len(&self) -> usize {
    self.previous.len()
  }

  /// Whether the last completed generation is empty.
  pub fn is_empty(&self) -> bool {
    self.previous.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn scratch_root() -> std::path::PathBuf {
    std::path::PathBuf::from("/tmp/kiln-out")
  }

  #[test]
  fn first_sight_must_write() {
    let mut cache = OutputCache::new(&scratch_root());
    assert!(cache.should_write("a.txt", b"one"));
  }

  #[test]
  fn unchanged_content_skips_after_finalize() {
    let mut cache = OutputCache::new(&scratch_root());
    assert!(cache.should_write("a.txt", b"one"));
    cache.finalize();
    assert!(!cache.should_write("a.txt", b"one"));
    assert!(cache.should_write("b.txt", b"one"));
  }

  #[test]
  fn changed_content_writes_again() {
    let mut cache = OutputCache::new(&scratch_root());
    cache.should_write("a.txt", b"one");
    cache.finalize();
    assert!(cache.should_write("a.txt", b"two"));
  }

  #[test]
  fn decision_is_stable_within_a_build() {
    let mut cache = OutputCache::new(&scratch_root());
    cache.should_write("a.txt", b"one");
    cache.finalize();
    assert_eq!(cache.should_write("a.txt", b"one"), cache.should_write("a.txt", b"one"));
    assert_eq!(cache.should_write("a.txt", b"two"), cache.should_write("a.txt", b"two"));
  }

  #[test]
  fn finalize_reports_dropped_paths() {
    let mut cache = OutputCache::new(&scratch_root());
    cache.should_write("a.txt", b"one");
    cache.should_write("b.txt", b"two");
    cache.finalize();

    cache.should_write("a.txt", b"one");
    let stale = cache.finalize();
    assert_eq!(stale, BTreeSet::from(["b.txt".to_string()]));
  }

  #[test]
  fn finalize_promotes_generations() {
    let mut cache = OutputCache::new(&scratch_root());
    cache.should_write("a.txt", b"one");
    cache.finalize();

    // Nothing recorded this build, so everything from the last one is stale.
    let stale = cache.finalize();
    assert_eq!(stale, BTreeSet::from(["a.txt".to_string()]));
    assert!(cache.is_empty());
  }

  mod persistence {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
      let dir = tempfile::tempdir().unwrap();
      let out = scratch_root();

      let mut cache = OutputCache::new(&out);
      cache.should_write("a.txt", b"one");
      cache.finalize();
      cache.persist(dir.path()).unwrap();

      let mut reloaded = OutputCache::load(dir.path(), &out);
      assert_eq!(reloaded.len(), 1);
      assert!(!reloaded.should_write("a.txt", b"one"));
    }

    #[test]
    fn missing_file_loads_empty() {
      let dir = tempfile::tempdir().unwrap();
      let cache = OutputCache::load(dir.path(), &scratch_root());
      assert!(cache.is_empty());
    }

    #[test]
    fn corrupt_file_loads_empty() {
      let dir = tempfile::tempdir().unwrap();
      fs::write(dir.path().join(CACHE_FILE), "{ not json").unwrap();
      let cache = OutputCache::load(dir.path(), &scratch_root());
      assert!(cache.is_empty());
    }

    #[test]
    fn different_root_loads_empty() {
      let dir = tempfile::tempdir().unwrap();
      let mut cache = OutputCache::new(&scratch_root());
      cache.should_write("a.txt", b"one");
      cache.finalize();
      cache.persist(dir.path()).unwrap();

      let other = OutputCache::load(dir.path(), std::path::Path::new("/tmp/elsewhere"));
      assert!(other.is_empty());
    }
  }
}
