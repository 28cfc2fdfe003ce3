//! CLI output formatting utilities.
//!
//! Consistent terminal output: colored status lines with Unicode symbols,
//! human-readable durations, and the JSON report mode.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use kiln_lib::build::BuildReport;
use owo_colors::{OwoColorize, Stream, Style};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  match secs {
    0 => format!("{}ms", duration.subsec_millis()),
    1..60 => format!("{}.{:02}s", secs, duration.subsec_millis() / 10),
    _ => format!("{}m {}s", secs / 60, secs % 60),
  }
}

fn status_line(symbol: &str, style: Style, message: &str) {
  println!("{} {}", symbol.if_supports_color(Stream::Stdout, |s| s.style(style)), message);
}

pub fn print_success(message: &str) {
  status_line(symbols::SUCCESS, Style::new().green(), message);
}

pub fn print_info(message: &str) {
  status_line(symbols::INFO, Style::new().blue(), message);
}

// Errors and warnings go to stderr, fully colored, so failed builds stay
// visible when stdout is piped into a pager or a JSON consumer.
pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("failed to serialize report")?;
  println!("{}", json);
  Ok(())
}

/// Human rendering of one build report.
pub fn print_report(report: &BuildReport, verbose: bool) {
  for failure in &report.failures {
    print_error(&format!("{}: {}", failure.module.display(), failure.message));
    if verbose
      && let Some(traceback) = &failure.traceback
    {
      for line in traceback.lines() {
        eprintln!("    {line}");
      }
    }
  }

  if report.success {
    let dry = if report.dry_run { " (dry run)" } else { "" };
    print_success(&format!(
      "built {} resource(s) in {}{}",
      report.counts.total(),
      format_duration(report.duration),
      dry
    ));
    print_stat("functions", &report.counts.functions.to_string());
    print_stat("other", &report.counts.other.to_string());
    print_stat("modules", &report.modules_executed.to_string());
    print_stat("written", &report.files_written.to_string());
    print_stat("deleted", &report.files_deleted.to_string());
  } else {
    print_error(&format!("build failed, {} module(s) skipped", report.modules_skipped));
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn durations_render_at_three_scales() {
    assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
    assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
  }
}
