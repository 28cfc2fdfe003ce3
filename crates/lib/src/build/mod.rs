//! Build orchestration.
//!
//! A build evaluates `kiln.lua`, executes user modules through the Lua
//! runtime, and persists the registered resources through the content cache.
//! The first build of a session loads everything; subsequent builds reuse the
//! returned [`ProjectContext`] and only touch the modules affected by a
//! change set.
//!
//! # Submodules
//!
//! - [`options`] - Caller-supplied flags and output-target resolution
//! - [`report`] - The [`BuildReport`] surfaced to the CLI
//! - `output` - Serialization of the registry into the output tree

pub mod options;
mod output;
pub mod report;

pub use options::BuildOptions;
pub use report::BuildReport;

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Instant, SystemTime};

use mlua::prelude::*;
use tracing::{debug, info, warn};

use crate::cache::{CacheError, OutputCache};
use crate::config::{self, ConfigError, Hooks, ProjectConfig};
use crate::consts::{CONFIG_FILE, META_DIR};
use crate::graph::{GraphError, ModuleGraph, scan};
use crate::lua::host::{self, LuaHost};
use crate::lua::{globals, runtime};
use crate::pack::{Produced, Registry};
use crate::runner::{self, ModuleFailure, PassOutcome};

use output::SaveStats;

/// Errors that fail a build outright, before or outside module execution.
///
/// Per-module errors never show up here; they land in
/// [`BuildReport::failures`] instead.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
  /// The project root does not resolve to a real directory.
  #[error("cannot resolve project root '{path}': {source}")]
  ProjectRoot { path: PathBuf, source: io::Error },

  /// Configuration error.
  #[error("{0}")]
  Config(#[from] ConfigError),

  /// Lua error outside module execution.
  #[error("lua error: {0}")]
  Lua(#[from] LuaError),

  /// Dependency scanning failed.
  #[error("{0}")]
  Scan(#[from] scan::ScanError),

  /// Graph lookup failed after every fallback.
  #[error("{0}")]
  Graph(#[from] GraphError),

  /// The output cache could not be persisted.
  #[error("cache error: {0}")]
  Cache(#[from] CacheError),

  /// Walking the static resource tree failed.
  #[error("failed to read resources: {0}")]
  Resources(#[from] walkdir::Error),

  /// A resource payload could not be serialized.
  #[error("cannot serialize '{key}': {source}")]
  Serialize { key: String, source: serde_json::Error },

  /// An output file could not be written.
  #[error("cannot write '{path}': {source}")]
  WriteOutput { path: PathBuf, source: io::Error },

  /// A static resource file could not be read.
  #[error("cannot read resource file '{path}': {source}")]
  ReadResource { path: PathBuf, source: io::Error },
}

/// Accumulated file changes driving one incremental build.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangeSet {
  /// Project-relative paths of changed `.lua` sources. Whether each one
  /// still exists is checked when the build starts, not when the event
  /// arrived.
  pub sources: BTreeSet<PathBuf>,
  /// True when something under the static resource tree changed; those are
  /// re-synced by the save step without executing any module.
  pub resources: bool,
}

impl ChangeSet {
  pub fn is_empty(&self) -> bool {
    self.sources.is_empty() && !self.resources
  }

  /// Fold another change set into this one.
  pub fn merge(&mut self, other: ChangeSet) {
    self.sources.extend(other.sources);
    self.resources |= other.resources;
  }
}

/// Everything a session needs to build incrementally: the Lua runtime with
/// its module cache, the shared registry, the dependency graph, per-module
/// effect records, and the output cache.
///
/// Returned by every build so the next one can pick up where it left off.
/// Dropped (and rebuilt from scratch) when `kiln.lua` or a library changes.
#[derive(Debug)]
pub struct ProjectContext {
  pub(crate) root: PathBuf,
  pub(crate) config: ProjectConfig,
  pub(crate) hooks: Hooks,
  pub(crate) lua: Lua,
  pub(crate) registry: Rc<RefCell<Registry>>,
  pub(crate) graph: ModuleGraph,
  pub(crate) records: BTreeMap<PathBuf, Produced>,
  /// Modules whose state was torn down but not rebuilt by a failed pass;
  /// folded into the next build's affected set.
  pub(crate) pending: BTreeSet<PathBuf>,
  pub(crate) cache: OutputCache,
  pub(crate) target: PathBuf,
  pub(crate) dry_run: bool,
}

impl ProjectContext {
  /// Canonicalized project root.
  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Evaluated project configuration.
  pub fn config(&self) -> &ProjectConfig {
    &self.config
  }
}

/// A finished build: the report plus the context for the next one.
#[derive(Debug)]
pub struct BuildOutcome {
  pub report: BuildReport,
  pub context: ProjectContext,
}

/// Run a full build: fresh runtime, full scan, every module.
pub fn build(root: &Path, options: &BuildOptions) -> Result<BuildOutcome, BuildError> {
  let started = Instant::now();
  let mut context = create_context(root, options)?;

  let modules: Vec<PathBuf> = context.graph.modules().cloned().collect();
  let order = context.graph.affected(&modules)?;
  info!(modules = order.len(), root = %context.root.display(), "full build");

  let pass = execute_pass(&mut context, &order);
  finish(context, pass, started)
}

/// Run an incremental build over `changes`, reusing `context`.
///
/// Changed sources are partially rescanned and merged into the graph; the
/// affected set (plus anything pending from a failed pass) is invalidated and
/// re-executed. Sources that no longer exist are invalidated, excluded from
/// execution, and dropped from the graph.
pub fn rebuild(mut context: ProjectContext, changes: &ChangeSet) -> Result<BuildOutcome, BuildError> {
  let started = Instant::now();

  let mut seeds: BTreeSet<PathBuf> = changes.sources.clone();
  seeds.extend(std::mem::take(&mut context.pending));

  let (present, removed): (BTreeSet<PathBuf>, BTreeSet<PathBuf>) = seeds
    .into_iter()
    .partition(|rel| context.root.join(rel).is_file());

  if !present.is_empty() {
    let files: Vec<PathBuf> = present.iter().cloned().collect();
    let partial = scan::scan_files(&context.root, &context.config.source_dir, &files)?;
    context.graph.merge(&partial);
  }

  let all_seeds: Vec<PathBuf> = present.iter().chain(removed.iter()).cloned().collect();
  let order = affected_with_rescan(&mut context, all_seeds)?;
  info!(
    changed = changes.sources.len(),
    removed = removed.len(),
    affected = order.len(),
    "incremental build"
  );

  // Deleted sources are invalidated but never executed; dependents that
  // still require them will fail and report it.
  for rel in &removed {
    if let Some(name) = scan::module_name(&context.config.source_dir, rel)
      && let Err(e) = runtime::invalidate_module(&context.lua, &name)
    {
      warn!(module = %rel.display(), error = %e, "failed to drop cached module");
    }
    if let Some(previous) = context.records.remove(rel) {
      context.registry.borrow_mut().remove_produced(&previous);
    }
    context.graph.remove_module(rel);
  }

  let exec_order: Vec<PathBuf> = order.into_iter().filter(|m| !removed.contains(m)).collect();
  let pass = execute_pass(&mut context, &exec_order);
  finish(context, pass, started)
}

fn create_context(root: &Path, options: &BuildOptions) -> Result<ProjectContext, BuildError> {
  let root = dunce::canonicalize(root).map_err(|source| BuildError::ProjectRoot {
    path: root.to_path_buf(),
    source,
  })?;

  let registry = Rc::new(RefCell::new(Registry::default()));
  let lua = runtime::create_runtime(registry.clone())?;
  let (config, hooks) = config::load(&lua, &root)?;
  registry.borrow_mut().set_policies(config.policies.clone());
  globals::set_namespace(&lua, &config.namespace)?;
  runtime::set_package_path(&lua, &root, &config.source_dir, &config.lib_dirs)?;

  let target = options.resolve_target(&root, &config)?;
  let cache = OutputCache::load(&root.join(META_DIR), &target);
  let graph = scan::scan_project(&root, &config.source_dir)?;
  debug!(modules = graph.len(), cached = cache.len(), "project context created");

  Ok(ProjectContext {
    root,
    config,
    hooks,
    lua,
    registry,
    graph,
    records: BTreeMap::new(),
    pending: BTreeSet::new(),
    cache,
    target,
    dry_run: options.dry_run,
  })
}

/// `affected`, with the rescan-and-retry fallback for unknown modules.
///
/// A miss means the graph never saw the path (a file created and changed
/// within one debounce window, say). One full rescan repairs it; anything
/// still unknown after that is skipped with a warning rather than failing
/// the watch session.
fn affected_with_rescan(context: &mut ProjectContext, seeds: Vec<PathBuf>) -> Result<Vec<PathBuf>, BuildError> {
  match context.graph.affected(&seeds) {
    Ok(order) => Ok(order),
    Err(GraphError::UnknownModule(path)) => {
      warn!(module = %path.display(), "module not in graph, rescanning project");
      let full = scan::scan_project(&context.root, &context.config.source_dir)?;
      context.graph.merge(&full);

      let (known, unknown): (Vec<PathBuf>, Vec<PathBuf>) =
        seeds.into_iter().partition(|p| context.graph.contains(p));
      for path in &unknown {
        warn!(module = %path.display(), "module unknown even after rescan, skipping");
      }
      Ok(context.graph.affected(&known)?)
    }
  }
}

fn execute_pass(context: &mut ProjectContext, order: &[PathBuf]) -> PassOutcome {
  if let Err(failure) = call_hook(&context.lua, &context.hooks.before_build, "before_build") {
    return PassOutcome {
      executed: Vec::new(),
      skipped: order.to_vec(),
      failures: vec![failure],
    };
  }

  let mut host = LuaHost::new(&context.lua, &context.registry, &context.config.source_dir);
  runner::run_pass(&mut host, &context.graph, order, &mut context.records)
}

/// Save if the pass was clean, fold unfinished modules into `pending`, and
/// assemble the report.
fn finish(mut context: ProjectContext, pass: PassOutcome, started: Instant) -> Result<BuildOutcome, BuildError> {
  let PassOutcome {
    executed,
    skipped,
    mut failures,
  } = pass;
  let mut stats = SaveStats::default();

  if failures.is_empty() {
    match call_hook(&context.lua, &context.hooks.before_save, "before_save") {
      Err(failure) => failures.push(failure),
      Ok(()) => {
        stats = output::save(
          &context.registry.borrow(),
          &context.config,
          &context.root,
          &context.target,
          &mut context.cache,
          context.dry_run,
        )?;
        if let Err(failure) = call_hook(&context.lua, &context.hooks.after_build, "after_build") {
          failures.push(failure);
        }
      }
    }
  }

  // Skipped and failed modules were invalidated without being rebuilt; they
  // must be part of the next affected set or their outputs stay lost.
  context.pending.extend(skipped.iter().cloned());
  context.pending.extend(
    failures
      .iter()
      .filter(|f| f.module.starts_with(&context.config.source_dir))
      .map(|f| f.module.clone()),
  );

  let success = failures.is_empty();
  if success {
    context.pending.clear();
  }

  let report = BuildReport {
    success,
    dry_run: context.dry_run,
    modules_executed: executed.len(),
    modules_skipped: skipped.len(),
    counts: context.registry.borrow().counts(),
    files_written: stats.files_written,
    files_deleted: stats.files_deleted,
    failures,
    duration: started.elapsed(),
    finished_at: SystemTime::now(),
  };
  Ok(BuildOutcome { report, context })
}

/// Run one lifecycle hook, attributing any error to `kiln.lua`.
fn call_hook(lua: &Lua, key: &Option<LuaRegistryKey>, name: &str) -> Result<(), ModuleFailure> {
  let Some(key) = key else {
    return Ok(());
  };
  let site = Path::new(CONFIG_FILE);
  let func: LuaFunction = lua.registry_value(key).map_err(|e| host::failure_from_lua(site, &e))?;
  debug!(hook = name, "running lifecycle hook");
  func.call::<()>(()).map_err(|e| {
    let mut failure = host::failure_from_lua(site, &e);
    failure.message = format!("hook '{name}': {}", failure.message);
    failure
  })
}
