//! Path classification for watch events.
//!
//! Every event path is sorted into a [`ChangeCategory`] before the scheduler
//! sees it. Sources and resources feed incremental rebuilds; configuration
//! and library changes force a session restart; everything else is noise.

use std::path::{Component, Path, PathBuf};

use crate::config::ProjectConfig;
use crate::consts::{
  CONFIG_FILE, DEFAULT_LIB_DIRS, DEFAULT_OUTPUT_DIR, DEFAULT_RESOURCES_DIR, DEFAULT_SOURCE_DIR, META_DIR,
};

/// What a changed path means for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeCategory {
  /// A `.lua` file under the source tree; schedules an incremental rebuild.
  Source,
  /// A file under the static resource tree; re-synced by the next save.
  Resource,
  /// `kiln.lua` itself. The loaded configuration is never hot-swapped.
  Config,
  /// A file under a library directory. Library modules stay cached in the
  /// Lua runtime, so these force a restart just like configuration.
  Dependency,
  /// Everything else, including output files and version-control noise.
  Other,
}

/// Project-relative directories the classifier checks against.
#[derive(Debug, Clone)]
pub struct WatchPaths {
  pub source_dir: PathBuf,
  pub resources_dir: PathBuf,
  pub lib_dirs: Vec<PathBuf>,
  /// The output target, when it lives inside the project root. Writes from
  /// our own save step must never feed back into the loop.
  pub output_rel: Option<PathBuf>,
}

impl WatchPaths {
  pub fn from_config(root: &Path, config: &ProjectConfig, target: &Path) -> Self {
    Self {
      source_dir: config.source_dir.clone(),
      resources_dir: config.resources_dir.clone(),
      lib_dirs: config.lib_dirs.clone(),
      output_rel: target.strip_prefix(root).ok().map(Path::to_path_buf),
    }
  }

  /// The stock layout, for sessions with no loaded configuration to ask.
  pub fn defaults() -> Self {
    Self {
      source_dir: PathBuf::from(DEFAULT_SOURCE_DIR),
      resources_dir: PathBuf::from(DEFAULT_RESOURCES_DIR),
      lib_dirs: DEFAULT_LIB_DIRS.iter().map(PathBuf::from).collect(),
      output_rel: Some(PathBuf::from(DEFAULT_OUTPUT_DIR)),
    }
  }
}

/// Classify a project-relative path.
pub fn classify(paths: &WatchPaths, rel: &Path) -> ChangeCategory {
  if is_noise(rel) {
    return ChangeCategory::Other;
  }
  if let Some(output) = &paths.output_rel
    && rel.starts_with(output)
  {
    return ChangeCategory::Other;
  }
  if rel == Path::new(CONFIG_FILE) {
    return ChangeCategory::Config;
  }
  if paths.lib_dirs.iter().any(|dir| rel.starts_with(dir)) {
    return ChangeCategory::Dependency;
  }
  if rel.starts_with(&paths.source_dir) {
    return if rel.extension().is_some_and(|ext| ext == "lua") {
      ChangeCategory::Source
    } else {
      ChangeCategory::Other
    };
  }
  if rel.starts_with(&paths.resources_dir) {
    return ChangeCategory::Resource;
  }
  ChangeCategory::Other
}

/// Version-control internals, our own metadata, and editor temp files.
fn is_noise(rel: &Path) -> bool {
  for component in rel.components() {
    if let Component::Normal(name) = component
      && (name == ".git" || name == META_DIR)
    {
      return true;
    }
  }
  let Some(name) = rel.file_name().and_then(|n| n.to_str()) else {
    return true;
  };
  name.ends_with('~')
    || name.starts_with(".#")
    || matches!(rel.extension().and_then(|e| e.to_str()), Some("swp" | "swx" | "tmp"))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn paths() -> WatchPaths {
    WatchPaths {
      source_dir: PathBuf::from("src"),
      resources_dir: PathBuf::from("resources"),
      lib_dirs: vec![PathBuf::from("lib")],
      output_rel: Some(PathBuf::from("dist")),
    }
  }

  fn category(rel: &str) -> ChangeCategory {
    classify(&paths(), Path::new(rel))
  }

  #[test]
  fn lua_sources_schedule_rebuilds() {
    assert_eq!(category("src/index.lua"), ChangeCategory::Source);
    assert_eq!(category("src/mobs/golem.lua"), ChangeCategory::Source);
  }

  #[test]
  fn non_lua_files_under_src_are_noise() {
    assert_eq!(category("src/notes.md"), ChangeCategory::Other);
  }

  #[test]
  fn resource_files_resync_without_execution() {
    assert_eq!(category("resources/icons/golem.png"), ChangeCategory::Resource);
  }

  #[test]
  fn the_config_file_forces_a_restart() {
    assert_eq!(category("kiln.lua"), ChangeCategory::Config);
  }

  #[test]
  fn library_changes_force_a_restart() {
    assert_eq!(category("lib/helpers.lua"), ChangeCategory::Dependency);
    assert_eq!(category("lib/vendor/json.lua"), ChangeCategory::Dependency);
  }

  #[test]
  fn output_and_metadata_never_feed_back() {
    assert_eq!(category("dist/server/pack.json"), ChangeCategory::Other);
    assert_eq!(category(".kiln/cache.json"), ChangeCategory::Other);
    assert_eq!(category(".git/objects/ab/cdef"), ChangeCategory::Other);
  }

  #[test]
  fn editor_temp_files_are_noise() {
    assert_eq!(category("src/index.lua~"), ChangeCategory::Other);
    assert_eq!(category("src/.#index.lua"), ChangeCategory::Other);
    assert_eq!(category("src/index.swp"), ChangeCategory::Other);
    assert_eq!(category("kiln.lua~"), ChangeCategory::Other);
  }

  #[test]
  fn defaults_cover_the_stock_layout() {
    let defaults = WatchPaths::defaults();
    assert_eq!(classify(&defaults, Path::new("src/a.lua")), ChangeCategory::Source);
    assert_eq!(classify(&defaults, Path::new("dist/server/x.fn")), ChangeCategory::Other);
    assert_eq!(classify(&defaults, Path::new("kiln.lua")), ChangeCategory::Config);
  }

  #[test]
  fn paths_outside_any_tracked_tree_are_noise() {
    assert_eq!(category("README.md"), ChangeCategory::Other);
    assert_eq!(category("worlds/alpha/level.dat"), ChangeCategory::Other);
  }
}
