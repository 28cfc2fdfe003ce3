//! Build option resolution.

use std::path::{Path, PathBuf};

use crate::config::{ConfigError, ProjectConfig};

/// Caller-supplied build options, from CLI flags or the watch loop.
#[derive(Debug, Default, Clone)]
pub struct BuildOptions {
  /// Run every decision but leave the filesystem and cache untouched.
  pub dry_run: bool,
  /// Explicit output root, replacing the configured `output_dir`.
  pub root: Option<PathBuf>,
  /// Save into a named world under the configured `worlds_dir`.
  pub world: Option<String>,
  /// Save directly into a server installation.
  pub server_path: Option<PathBuf>,
}

impl BuildOptions {
  /// Resolve the effective output root.
  ///
  /// `root`, `world` and `server_path` are mutually exclusive; picking more
  /// than one is rejected here, before any module executes.
  pub fn resolve_target(&self, project_root: &Path, config: &ProjectConfig) -> Result<PathBuf, ConfigError> {
    let picked = [self.root.is_some(), self.world.is_some(), self.server_path.is_some()]
      .into_iter()
      .filter(|p| *p)
      .count();
    if picked > 1 {
      return Err(ConfigError::Invalid(
        "--root, --world and --server-path are mutually exclusive".to_string(),
      ));
    }

    if let Some(root) = &self.root {
      return Ok(root.clone());
    }
    if let Some(world) = &self.world {
      let Some(worlds_dir) = &config.worlds_dir else {
        return Err(ConfigError::Invalid(
          "--world requires 'worlds_dir' in kiln.lua".to_string(),
        ));
      };
      // A relative worlds_dir is anchored at the project root.
      let base = if worlds_dir.is_absolute() {
        worlds_dir.clone()
      } else {
        project_root.join(worlds_dir)
      };
      return Ok(base.join(world).join("packs").join(&config.namespace));
    }
    if let Some(server) = &self.server_path {
      return Ok(server.join("packs").join(&config.namespace));
    }
    Ok(project_root.join(&config.output_dir))
  }
}
