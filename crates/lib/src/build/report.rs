//! Build result reporting.

use std::time::{Duration, SystemTime};

use serde::{Serialize, Serializer};

use crate::pack::ResourceCounts;
use crate::runner::ModuleFailure;

/// Summary of one build pass, the only structure surfaced to callers.
#[derive(Debug, Serialize)]
pub struct BuildReport {
  /// False when any module or hook failed.
  pub success: bool,
  /// True when the build planned but did not touch the filesystem.
  pub dry_run: bool,
  /// Modules that executed in this pass.
  pub modules_executed: usize,
  /// Modules skipped because something they depend on failed.
  pub modules_skipped: usize,
  /// User-registered resources, excluding bootstrap outputs.
  pub counts: ResourceCounts,
  /// Output files written (or, on dry runs, that would have been).
  pub files_written: usize,
  /// Stale output files deleted (or that would have been).
  pub files_deleted: usize,
  /// Per-module failures, in the order they occurred.
  pub failures: Vec<ModuleFailure>,
  /// Wall-clock build time.
  #[serde(serialize_with = "millis")]
  pub duration: Duration,
  /// When the build finished.
  #[serde(serialize_with = "rfc3339")]
  pub finished_at: SystemTime,
}

impl BuildReport {
  /// Short failure summary, one line per failed module.
  pub fn failure_lines(&self) -> impl Iterator<Item = String> {
    self.failures.iter().map(ToString::to_string)
  }
}

fn millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.serialize_u64(duration.as_millis() as u64)
}

fn rfc3339<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.collect_str(&humantime::format_rfc3339_seconds(*time))
}
