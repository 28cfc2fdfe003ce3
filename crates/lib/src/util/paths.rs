//! Path normalization helpers.
//!
//! Module identities and cache keys are project-relative paths. Watcher events
//! arrive as absolute paths and may reference files that no longer exist, so
//! normalization here is lexical and never touches the filesystem.

use std::path::{Component, Path, PathBuf};

/// Resolve `.` and `..` components lexically, without consulting the filesystem.
///
/// Leading `..` components that would escape the path are kept as-is.
pub fn lexical_normalize(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        if !out.pop() {
          out.push("..");
        }
      }
      other => out.push(other),
    }
  }
  out
}

/// Express `path` relative to `root`, or `None` when it lies outside.
///
/// Both sides are normalized lexically first; `root` is expected to already be
/// canonical (the session canonicalizes the project root once at startup).
pub fn project_relative(root: &Path, path: &Path) -> Option<PathBuf> {
  let path = if path.is_absolute() {
    lexical_normalize(path)
  } else {
    lexical_normalize(&root.join(path))
  };
  path.strip_prefix(root).ok().map(Path::to_path_buf)
}

/// Normalize a relative path into a stable string key with forward slashes.
pub fn path_key(rel: &Path) -> String {
  let parts: Vec<_> = rel
    .components()
    .filter_map(|c| match c {
      Component::Normal(s) => s.to_str(),
      _ => None,
    })
    .collect();
  parts.join("/")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalize_resolves_dot_and_dotdot() {
    assert_eq!(lexical_normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
    assert_eq!(lexical_normalize(Path::new("a/b/../../d")), PathBuf::from("d"));
  }

  #[test]
  fn relative_inside_root() {
    let root = Path::new("/proj");
    assert_eq!(
      project_relative(root, Path::new("/proj/src/mobs/init.lua")),
      Some(PathBuf::from("src/mobs/init.lua"))
    );
  }

  #[test]
  fn relative_outside_root_is_none() {
    let root = Path::new("/proj");
    assert_eq!(project_relative(root, Path::new("/other/file.lua")), None);
    assert_eq!(project_relative(root, Path::new("/proj/../other/f.lua")), None);
  }

  #[test]
  fn relative_input_is_anchored_at_root() {
    let root = Path::new("/proj");
    assert_eq!(
      project_relative(root, Path::new("src/a.lua")),
      Some(PathBuf::from("src/a.lua"))
    );
  }

  #[test]
  fn key_uses_forward_slashes() {
    let rel: PathBuf = ["server", "ns", "functions", "tick.fn"].iter().collect();
    assert_eq!(path_key(&rel), "server/ns/functions/tick.fn");
  }
}
