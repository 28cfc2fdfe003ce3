//! Module dependency graph for incremental rebuilds.
//!
//! The graph tracks which user modules require which other modules, so a
//! change to one file can be widened to the set of modules whose output may
//! differ. Nodes are project-relative source paths; an edge points from a
//! dependency to its dependent, mirroring execution order.
//!
//! The graph tolerates cycles. User code with `require` cycles is Lua's
//! problem at load time; traversal here only guarantees termination and a
//! finite result.
//!
//! # Submodules
//!
//! - [`scan`] - Dependency discovery from Lua sources

pub mod scan;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;

/// Errors produced by graph queries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
  /// The queried path has no node. Callers typically rescan and retry.
  #[error("unknown module '{}'", .0.display())]
  UnknownModule(PathBuf),
}

/// How far a traversal reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
  /// Immediate neighbors only.
  Direct,
  /// Everything reachable, excluding the start node itself.
  Transitive,
}

/// Dependency graph over user modules.
///
/// Uses a stable graph so node indices in the path map survive removals when
/// source files are deleted.
///
/// The graph distinguishes modules it has *scanned* from modules it has only
/// seen *referenced* as a dependency. A partial scan creates referenced nodes
/// for everything its files require; merging such a graph must replace edge
/// sets only for the scanned modules, or a rescan of one file would sever the
/// recorded dependencies of everything it requires.
#[derive(Debug, Default)]
pub struct ModuleGraph {
  graph: StableDiGraph<PathBuf, ()>,
  nodes: HashMap<PathBuf, NodeIndex>,
  scanned: HashSet<PathBuf>,
}

impl ModuleGraph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of known modules, scanned or referenced.
  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn contains(&self, path: &Path) -> bool {
    self.nodes.contains_key(path)
  }

  /// All known module paths, unordered.
  pub fn modules(&self) -> impl Iterator<Item = &PathBuf> {
    self.nodes.keys()
  }

  fn ensure_node(&mut self, path: &Path) -> NodeIndex {
    if let Some(&idx) = self.nodes.get(path) {
      return idx;
    }
    let idx = self.graph.add_node(path.to_path_buf());
    self.nodes.insert(path.to_path_buf(), idx);
    idx
  }

  /// Record `path` as a scanned module and return its node.
  pub fn add_module(&mut self, path: &Path) -> NodeIndex {
    self.scanned.insert(path.to_path_buf());
    self.ensure_node(path)
  }

  /// Record that `dependent` requires `dependency`.
  ///
  /// The dependent counts as scanned; the dependency node is created lazily
  /// as a reference. Self-references and duplicate edges are dropped.
  pub fn add_dependency(&mut self, dependent: &Path, dependency: &Path) {
    if dependent == dependency {
      return;
    }
    let dependent_idx = self.add_module(dependent);
    let dependency_idx = self.ensure_node(dependency);
    // Edge from dependency to dependent, mirroring execution order.
    if !self.graph.contains_edge(dependency_idx, dependent_idx) {
      self.graph.add_edge(dependency_idx, dependent_idx, ());
    }
  }

  /// Remove a module, for confirmed source deletions only.
  ///
  /// Edges to and from the node disappear with it; former dependents keep
  /// their own nodes and simply lose this dependency.
  pub fn remove_module(&mut self, path: &Path) -> bool {
    self.scanned.remove(path);
    match self.nodes.remove(path) {
      Some(idx) => {
        self.graph.remove_node(idx);
        true
      }
      None => false,
    }
  }

  /// Modules that `path` requires.
  pub fn dependencies(&self, path: &Path, depth: Depth) -> Result<BTreeSet<PathBuf>, GraphError> {
    self.neighbors(path, Direction::Incoming, depth)
  }

  /// Modules that require `path`.
  pub fn dependents(&self, path: &Path, depth: Depth) -> Result<BTreeSet<PathBuf>, GraphError> {
    self.neighbors(path, Direction::Outgoing, depth)
  }

  fn neighbors(&self, path: &Path, direction: Direction, depth: Depth) -> Result<BTreeSet<PathBuf>, GraphError> {
    let &start = self
      .nodes
      .get(path)
      .ok_or_else(|| GraphError::UnknownModule(path.to_path_buf()))?;

    let mut out = BTreeSet::new();
    match depth {
      Depth::Direct => {
        for idx in self.graph.neighbors_directed(start, direction) {
          out.insert(self.graph[idx].clone());
        }
      }
      Depth::Transitive => {
        // Visited set doubles as the cycle guard: a node already entered is
        // never pushed again, so traversal terminates on any input.
        let mut visited: HashSet<NodeIndex> = HashSet::from([start]);
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
          for idx in self.graph.neighbors_directed(current, direction) {
            if visited.insert(idx) {
              out.insert(self.graph[idx].clone());
              stack.push(idx);
            }
          }
        }
      }
    }
    Ok(out)
  }

  /// Fold a partially scanned graph into this one.
  ///
  /// For every module the partial graph scanned, its dependency edge set here
  /// is replaced wholesale by the partial one. Modules the partial graph only
  /// references as dependencies, and modules it does not mention at all, keep
  /// their nodes and edges untouched; unknown modules are created lazily.
  pub fn merge(&mut self, partial: &ModuleGraph) {
    for path in &partial.scanned {
      let idx = self.add_module(path);

      let stale: Vec<_> = self
        .graph
        .edges_directed(idx, Direction::Incoming)
        .map(|edge| edge.id())
        .collect();
      for edge in stale {
        self.graph.remove_edge(edge);
      }
    }
    for path in &partial.scanned {
      // Scanned nodes exist in the partial by construction.
      if let Ok(deps) = partial.dependencies(path, Depth::Direct) {
        for dep in deps {
          self.add_dependency(path, &dep);
        }
      }
    }
  }

  /// Modules whose output may differ after `changed` source files changed.
  ///
  /// The result is the union of each changed module and its transitive
  /// dependents, ordered by ascending transitive dependency count so that
  /// dependencies execute before anything that requires them. Ties break by
  /// path, keeping the order deterministic.
  ///
  /// # Errors
  ///
  /// Returns `UnknownModule` for the first changed path without a node;
  /// callers rescan the project and retry.
  pub fn affected(&self, changed: &[PathBuf]) -> Result<Vec<PathBuf>, GraphError> {
    let mut set = BTreeSet::new();
    for path in changed {
      if !self.contains(path) {
        return Err(GraphError::UnknownModule(path.clone()));
      }
      set.insert(path.clone());
      set.extend(self.dependents(path, Depth::Transitive)?);
    }

    let mut ordered: Vec<(usize, PathBuf)> = set
      .into_iter()
      .map(|path| {
        let rank = self
          .dependencies(&path, Depth::Transitive)
          .map(|deps| deps.len())
          .unwrap_or(0);
        (rank, path)
      })
      .collect();
    ordered.sort();
    Ok(ordered.into_iter().map(|(_, path)| path).collect())
  }
}
