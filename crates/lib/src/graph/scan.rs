//! Dependency discovery from Lua sources.
//!
//! The scanner extracts `require(...)` and `dofile(...)` targets from source
//! text and resolves them against the project's source tree. Extraction is
//! textual, not a full parse: comments are stripped first, and a match only
//! becomes an edge when it resolves to a file inside the source directory, so
//! over-approximation is harmless. Requires of external libraries resolve to
//! nothing and produce no edge.
//!
//! # Resolution
//!
//! A module name follows Lua convention: `mobs.golem` resolves to
//! `src/mobs/golem.lua`, falling back to `src/mobs/golem/init.lua`. A
//! `dofile` argument is a project-relative file path taken as-is.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};
use walkdir::WalkDir;

use super::ModuleGraph;
use crate::util::paths;

/// Errors that can occur while scanning sources.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
  /// Walking the source directory failed.
  #[error("failed to walk '{path}': {source}")]
  Walk {
    path: PathBuf,
    source: walkdir::Error,
  },

  /// Reading a source file failed.
  #[error("failed to read '{path}': {source}")]
  Read { path: PathBuf, source: io::Error },
}

/// Scan the whole source tree into a fresh graph.
///
/// A missing or empty source directory yields an empty graph; projects
/// without modules are valid, they just produce nothing.
pub fn scan_project(root: &Path, source_dir: &Path) -> Result<ModuleGraph, ScanError> {
  let dir = root.join(source_dir);
  let mut files = Vec::new();
  if dir.is_dir() {
    for entry in WalkDir::new(&dir).sort_by_file_name() {
      let entry = entry.map_err(|e| ScanError::Walk {
        path: dir.clone(),
        source: e,
      })?;
      if entry.file_type().is_file()
        && entry.path().extension().is_some_and(|ext| ext == "lua")
        && let Some(rel) = paths::project_relative(root, entry.path())
      {
        files.push(rel);
      }
    }
  }
  debug!(modules = files.len(), "scanned source tree");
  scan_files(root, source_dir, &files)
}

/// Scan exactly the given project-relative files into a partial graph.
///
/// Files that vanished between the change notification and the read are
/// skipped; deletions are handled by the caller, not the scanner.
pub fn scan_files(root: &Path, source_dir: &Path, files: &[PathBuf]) -> Result<ModuleGraph, ScanError> {
  let mut graph = ModuleGraph::new();
  for rel in files {
    let abs = root.join(rel);
    let source = match fs::read_to_string(&abs) {
      Ok(source) => source,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!(path = %rel.display(), "source vanished before scan, skipping");
        continue;
      }
      Err(e) => return Err(ScanError::Read { path: abs, source: e }),
    };

    graph.add_module(rel);
    for target in extract_targets(&source) {
      let resolved = match &target {
        RequireTarget::Module(name) => resolve_require(root, source_dir, name),
        RequireTarget::File(path) => resolve_file(root, source_dir, path),
      };
      match resolved {
        Some(dep) => graph.add_dependency(rel, &dep),
        None => trace!(module = %rel.display(), ?target, "unresolved target, treating as external"),
      }
    }
  }
  Ok(graph)
}

/// One extracted load site.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RequireTarget {
  /// `require("a.b")` style module name.
  Module(String),
  /// `dofile("src/a/b.lua")` style file path.
  File(String),
}

/// Extract all `require`/`dofile` string arguments from source text.
fn extract_targets(source: &str) -> Vec<RequireTarget> {
  let text = strip_comments(source);
  let bytes = text.as_bytes();
  let mut out = Vec::new();

  for (keyword, is_file) in [("require", false), ("dofile", true)] {
    let mut from = 0;
    while let Some(found) = text[from..].find(keyword) {
      let start = from + found;
      let end = start + keyword.len();
      from = end;

      // Standalone identifier only, not e.g. `prerequire` or `requires`.
      if start > 0 && is_ident_byte(bytes[start - 1]) {
        continue;
      }
      if bytes.get(end).copied().is_some_and(is_ident_byte) {
        continue;
      }

      if let Some(arg) = read_call_argument(&text[end..]) {
        out.push(if is_file {
          RequireTarget::File(arg)
        } else {
          RequireTarget::Module(arg)
        });
      }
    }
  }
  out
}

fn is_ident_byte(b: u8) -> bool {
  b.is_ascii_alphanumeric() || b == b'_'
}

/// Read the quoted argument of a call, with or without parentheses.
fn read_call_argument(rest: &str) -> Option<String> {
  let mut s = rest.trim_start();
  if let Some(stripped) = s.strip_prefix('(') {
    s = stripped.trim_start();
  }
  let quote = s.chars().next()?;
  if quote != '"' && quote != '\'' {
    return None;
  }
  let body = &s[1..];
  let end = body.find(quote)?;
  let arg = &body[..end];
  if arg.is_empty() { None } else { Some(arg.to_string()) }
}

/// Replace Lua comments with spaces, leaving code and strings in place.
///
/// Handles `--` line comments and `--[[ ]]` block comments at any long
/// bracket level, and does not mistake `--` inside a string for a comment.
fn strip_comments(source: &str) -> String {
  enum State {
    Code,
    Quoted(u8),
    LongString(usize),
    LineComment,
    BlockComment(usize),
  }

  let bytes = source.as_bytes();
  let mut out = Vec::with_capacity(bytes.len());
  let mut state = State::Code;
  let mut i = 0;

  while i < bytes.len() {
    let b = bytes[i];
    match state {
      State::Code => {
        if b == b'-' && bytes.get(i + 1) == Some(&b'-') {
          if let Some(level) = long_bracket_open(bytes, i + 2) {
            state = State::BlockComment(level);
            let skip = 2 + level + 2;
            out.resize(out.len() + skip, b' ');
            i += skip;
          } else {
            state = State::LineComment;
            out.extend_from_slice(b"  ");
            i += 2;
          }
          continue;
        }
        if let Some(level) = long_bracket_open(bytes, i) {
          state = State::LongString(level);
          let skip = level + 2;
          out.extend_from_slice(&bytes[i..i + skip]);
          i += skip;
          continue;
        }
        if b == b'\'' || b == b'"' {
          state = State::Quoted(b);
        }
        out.push(b);
        i += 1;
      }
      State::Quoted(quote) => {
        if b == b'\\' && i + 1 < bytes.len() {
          out.extend_from_slice(&bytes[i..i + 2]);
          i += 2;
          continue;
        }
        if b == quote || b == b'\n' {
          state = State::Code;
        }
        out.push(b);
        i += 1;
      }
      State::LongString(level) => {
        if long_bracket_close(bytes, i, level) {
          state = State::Code;
          out.extend_from_slice(&bytes[i..i + level + 2]);
          i += level + 2;
          continue;
        }
        out.push(b);
        i += 1;
      }
      State::LineComment => {
        if b == b'\n' {
          state = State::Code;
          out.push(b);
        } else {
          out.push(b' ');
        }
        i += 1;
      }
      State::BlockComment(level) => {
        if long_bracket_close(bytes, i, level) {
          state = State::Code;
          out.resize(out.len() + level + 2, b' ');
          i += level + 2;
          continue;
        }
        out.push(if b == b'\n' { b'\n' } else { b' ' });
        i += 1;
      }
    }
  }

  String::from_utf8_lossy(&out).into_owned()
}

/// Detect `[`, `=`*n, `[` at `i`; returns the `=` count.
fn long_bracket_open(bytes: &[u8], i: usize) -> Option<usize> {
  if bytes.get(i) != Some(&b'[') {
    return None;
  }
  let mut level = 0;
  while bytes.get(i + 1 + level) == Some(&b'=') {
    level += 1;
  }
  (bytes.get(i + 1 + level) == Some(&b'[')).then_some(level)
}

/// Detect `]`, `=`*level, `]` at `i`.
fn long_bracket_close(bytes: &[u8], i: usize, level: usize) -> bool {
  if bytes.get(i) != Some(&b']') || bytes.get(i + 1 + level) != Some(&b']') {
    return false;
  }
  bytes[i + 1..i + 1 + level].iter().all(|&b| b == b'=')
}

/// Resolve a `require` name to a project-relative source path, if it names a
/// project module.
///
/// Tries `<source_dir>/<name with . as />.lua`, then `.../<name>/init.lua`.
pub fn resolve_require(root: &Path, source_dir: &Path, name: &str) -> Option<PathBuf> {
  if name.is_empty() || name.contains('/') || name.contains('\\') {
    return None;
  }
  let segments: Vec<&str> = name.split('.').collect();
  if segments.iter().any(|s| s.is_empty()) {
    return None;
  }

  let mut rel = source_dir.to_path_buf();
  for segment in &segments {
    rel.push(segment);
  }

  let as_file = rel.with_extension("lua");
  if root.join(&as_file).is_file() {
    return Some(as_file);
  }
  let as_init = rel.join("init.lua");
  if root.join(&as_init).is_file() {
    return Some(as_init);
  }
  None
}

/// Resolve a `dofile` argument to a project-relative source path, if it names
/// a file inside the source directory.
pub fn resolve_file(root: &Path, source_dir: &Path, raw: &str) -> Option<PathBuf> {
  let path = Path::new(raw);
  if path.is_absolute() {
    return None;
  }
  let rel = paths::lexical_normalize(path);
  if !rel.starts_with(source_dir) {
    return None;
  }
  if root.join(&rel).is_file() { Some(rel) } else { None }
}

/// The `require` name of a project-relative source path.
///
/// Inverse of [`resolve_require`]: `src/mobs/golem.lua` becomes
/// `mobs.golem`, `src/mobs/init.lua` becomes `mobs`.
pub fn module_name(source_dir: &Path, rel: &Path) -> Option<String> {
  let sub = rel.strip_prefix(source_dir).ok()?;
  let stem = sub.with_extension("");
  let mut parts: Vec<String> = stem
    .components()
    .filter_map(|c| c.as_os_str().to_str())
    .map(str::to_string)
    .collect();
  if parts.len() > 1 && parts.last().is_some_and(|p| p == "init") {
    parts.pop();
  }
  if parts.is_empty() {
    return None;
  }
  Some(parts.join("."))
}
