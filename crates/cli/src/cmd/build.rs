//! Implementation of the `kiln build` command.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use kiln_lib::build::{self, BuildOptions};

use super::to_anyhow;
use crate::output::{self, OutputFormat};

/// Run one full build and report it.
///
/// Exits non-zero when any module or hook failed, so scripted builds can
/// gate on the result.
pub fn cmd_build(project: &Path, options: BuildOptions, format: OutputFormat, verbose: bool) -> Result<ExitCode> {
  let outcome = to_anyhow(build::build(project, &options))?;
  let report = outcome.report;

  if format.is_json() {
    output::print_json(&report)?;
  } else {
    output::print_report(&report, verbose);
  }

  Ok(if report.success {
    ExitCode::SUCCESS
  } else {
    ExitCode::FAILURE
  })
}
