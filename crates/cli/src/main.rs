use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use kiln_lib::build::BuildOptions;
use tracing_subscriber::EnvFilter;

mod cmd;
mod output;

use output::OutputFormat;

/// kiln - incremental Lua content-pack compiler
#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Show full Lua tracebacks on failures
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Project root, where kiln.lua lives
  #[arg(short = 'C', long, global = true, default_value = ".")]
  project: PathBuf,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build the pack once
  Build {
    #[command(flatten)]
    target: TargetArgs,

    /// Plan and report without writing any files
    #[arg(long)]
    dry_run: bool,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
  },

  /// Watch the project and rebuild on changes
  Watch {
    #[command(flatten)]
    target: TargetArgs,

    /// Park changes until enter is pressed instead of building right away
    #[arg(long)]
    manual: bool,
  },

  /// Delete the build output and cached metadata
  Clean {
    #[command(flatten)]
    target: TargetArgs,
  },
}

/// Where the pack lands. At most one may be given; the configured
/// `output_dir` is the default.
#[derive(Args)]
struct TargetArgs {
  /// Write the pack under this directory
  #[arg(long)]
  root: Option<PathBuf>,

  /// Write into <worlds_dir>/<WORLD>/packs/<namespace>
  #[arg(long)]
  world: Option<String>,

  /// Write into <SERVER_PATH>/packs/<namespace>
  #[arg(long)]
  server_path: Option<PathBuf>,
}

impl TargetArgs {
  fn into_options(self, dry_run: bool) -> BuildOptions {
    BuildOptions {
      dry_run,
      root: self.root,
      world: self.world,
      server_path: self.server_path,
    }
  }
}

fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .without_time()
    .init();

  let cli = Cli::parse();
  let result = match cli.command {
    Commands::Build { target, dry_run, format } => {
      cmd::cmd_build(&cli.project, target.into_options(dry_run), format, cli.verbose)
    }
    Commands::Watch { target, manual } => {
      cmd::cmd_watch(&cli.project, target.into_options(false), manual, cli.verbose)
    }
    Commands::Clean { target } => cmd::cmd_clean(&cli.project, target.into_options(false)),
  };

  match result {
    Ok(code) => code,
    Err(error) => {
      output::print_error(&format!("{error:#}"));
      ExitCode::FAILURE
    }
  }
}
