//! Implementation of the `kiln watch` command.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use kiln_lib::build::{BuildError, BuildOptions, BuildReport};
use kiln_lib::watch::{WatchOptions, WatchOutcome, WatchSession};

use super::to_anyhow;
use crate::output;

/// Watch the project and rebuild on changes until the user quits.
///
/// A configuration or library change ends the current session; the loop
/// here starts a fresh one over the same subscription, so edits to
/// `kiln.lua` take effect without leaving watch mode.
pub fn cmd_watch(project: &Path, build: BuildOptions, manual: bool, verbose: bool) -> Result<ExitCode> {
  let options = WatchOptions { build, manual };
  let mut session = to_anyhow(WatchSession::new(project, options))?;

  if manual {
    output::print_info("manual mode: press enter to build, 'q' to quit");
  } else {
    output::print_info("press 'q' then enter to quit");
  }

  loop {
    let outcome = session.run(&mut |result| print_build(result, verbose))?;
    match outcome {
      WatchOutcome::Restart => output::print_warning("configuration changed, reloading session"),
      WatchOutcome::Interrupted => return Ok(ExitCode::SUCCESS),
    }
  }
}

fn print_build(result: std::result::Result<&BuildReport, &BuildError>, verbose: bool) {
  match result {
    Ok(report) if report.success => {
      let dry = if report.dry_run { ", dry run" } else { "" };
      output::print_success(&format!(
        "built {} resource(s) in {} ({} written, {} deleted{})",
        report.counts.total(),
        output::format_duration(report.duration),
        report.files_written,
        report.files_deleted,
        dry
      ));
    }
    Ok(report) => {
      for line in report.failure_lines() {
        output::print_error(&line);
      }
      if verbose {
        for failure in &report.failures {
          if let Some(traceback) = &failure.traceback {
            for line in traceback.lines() {
              eprintln!("    {line}");
            }
          }
        }
      }
    }
    Err(error) => output::print_error(&error.to_string()),
  }
}
