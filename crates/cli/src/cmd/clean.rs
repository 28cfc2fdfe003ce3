//! Implementation of the `kiln clean` command.

use std::fs;
use std::io;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::info;

use kiln_lib::build::BuildOptions;
use kiln_lib::config::ProjectConfig;
use kiln_lib::consts::META_DIR;

use super::to_anyhow;
use crate::output;

/// Remove the resolved output target and the `.kiln` metadata directory.
///
/// Takes the same target flags as `build` so a world or server deployment
/// can be cleaned too.
pub fn cmd_clean(project: &Path, options: BuildOptions) -> Result<ExitCode> {
  let root = dunce::canonicalize(project)
    .with_context(|| format!("cannot resolve project root '{}'", project.display()))?;
  let config = to_anyhow(ProjectConfig::load(&root))?;
  let target = to_anyhow(options.resolve_target(&root, &config))?;
  info!(root = %root.display(), target = %target.display(), "cleaning project");

  let meta = root.join(META_DIR);
  let mut removed = 0;
  for dir in [&target, &meta] {
    match fs::remove_dir_all(dir) {
      Ok(()) => {
        output::print_stat("removed", &dir.display().to_string());
        removed += 1;
      }
      Err(error) if error.kind() == io::ErrorKind::NotFound => {}
      Err(error) => {
        return Err(error).with_context(|| format!("cannot remove '{}'", dir.display()));
      }
    }
  }

  if removed == 0 {
    output::print_info("nothing to clean");
  } else {
    output::print_success("clean");
  }
  Ok(ExitCode::SUCCESS)
}
