mod build;
mod clean;
mod watch;

pub use build::cmd_build;
pub use clean::cmd_clean;
pub use watch::cmd_watch;

use std::fmt::Display;

// mlua error types are not Send + Sync, so they cannot cross into anyhow
// directly; flatten them to their message at the edge.
pub(crate) fn to_anyhow<T, E: Display>(result: Result<T, E>) -> anyhow::Result<T> {
  result.map_err(|error| anyhow::anyhow!("{error}"))
}
