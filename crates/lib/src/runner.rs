//! Module execution passes.
//!
//! A pass takes an ordered list of affected modules and drives them through
//! two phases: first every scheduled module is invalidated (cached state
//! dropped, previously recorded effects reversed), then each is executed in
//! the given order. Invalidating everything before executing anything is the
//! property that keeps attribution correct: while a dependent is loading, a
//! `require` of its dependency must either hit a fresh cache entry produced
//! during this pass or re-execute the dependency, never observe a stale one.
//!
//! The pass is generic over [`ModuleHost`] so the scheduling logic is
//! testable without a Lua runtime.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error};

use crate::graph::{Depth, ModuleGraph};
use crate::pack::Produced;

/// One module execution failure, kept for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleFailure {
  /// Project-relative path of the module that failed.
  pub module: PathBuf,
  /// Error message with any traceback stripped.
  pub message: String,
  /// Lua stack traceback, when one was captured.
  pub traceback: Option<String>,
}

impl ModuleFailure {
  pub fn new(module: &Path, message: impl Into<String>) -> Self {
    Self {
      module: module.to_path_buf(),
      message: message.into(),
      traceback: None,
    }
  }
}

impl std::fmt::Display for ModuleFailure {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}: {}", self.module.display(), self.message)
  }
}

/// Host the pass drives: the production implementation is Lua-backed, tests
/// substitute a scripted fake.
pub trait ModuleHost {
  /// Drop cached state for `module` and reverse `previous`, its effects
  /// recorded by an earlier pass.
  fn invalidate(&mut self, module: &Path, previous: Option<&Produced>) -> Result<(), ModuleFailure>;

  /// Load and run `module`, returning the effects registered during the run.
  ///
  /// A failing module must leave no partial effects behind.
  fn execute(&mut self, module: &Path) -> Result<Produced, ModuleFailure>;
}

/// What one pass did.
#[derive(Debug, Default)]
pub struct PassOutcome {
  /// Modules that executed successfully, in execution order.
  pub executed: Vec<PathBuf>,
  /// Modules skipped because a module they depend on failed, or because
  /// invalidation aborted the pass before execution started.
  pub skipped: Vec<PathBuf>,
  /// All failures, in the order they occurred.
  pub failures: Vec<ModuleFailure>,
}

impl PassOutcome {
  pub fn success(&self) -> bool {
    self.failures.is_empty()
  }
}

/// Run one invalidate-then-execute pass over `modules`, in the given order.
///
/// `records` maps each module to the effects of its last successful run; the
/// pass consumes entries for everything scheduled and re-inserts them for
/// everything that executed, so after the pass the map again mirrors the
/// registry.
///
/// The order is expected to put dependencies before dependents (see
/// [`ModuleGraph::affected`]). On a failure the failed module's transitive
/// dependents are skipped for the rest of the pass; unrelated modules still
/// run.
pub fn run_pass(
  host: &mut dyn ModuleHost,
  graph: &ModuleGraph,
  modules: &[PathBuf],
  records: &mut BTreeMap<PathBuf, Produced>,
) -> PassOutcome {
  let mut outcome = PassOutcome::default();

  for (position, module) in modules.iter().enumerate() {
    let previous = records.remove(module);
    if let Err(failure) = host.invalidate(module, previous.as_ref()) {
      error!(module = %module.display(), error = %failure.message, "invalidation failed, aborting pass");
      outcome.failures.push(failure);
      // Everything else is skipped, including the already-invalidated
      // modules before this one: none of them will execute in this pass.
      outcome.skipped.extend(
        modules
          .iter()
          .enumerate()
          .filter(|(i, _)| *i != position)
          .map(|(_, m)| m.clone()),
      );
      return outcome;
    }
  }

  let mut struck: HashSet<PathBuf> = HashSet::new();
  for module in modules {
    if struck.contains(module) {
      debug!(module = %module.display(), "skipping dependent of a failed module");
      outcome.skipped.push(module.clone());
      continue;
    }
    match host.execute(module) {
      Ok(produced) => {
        debug!(
          module = %module.display(),
          resources = produced.resources.len(),
          objectives = produced.objectives.len(),
          "module executed"
        );
        records.insert(module.clone(), produced);
        outcome.executed.push(module.clone());
      }
      Err(failure) => {
        error!(module = %module.display(), error = %failure.message, "module failed");
        if let Ok(dependents) = graph.dependents(module, Depth::Transitive) {
          struck.extend(dependents);
        }
        outcome.failures.push(failure);
      }
    }
  }

  outcome
}
