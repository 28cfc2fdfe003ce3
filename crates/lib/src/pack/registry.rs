//! The shared resource registry.
//!
//! One [`Registry`] instance lives for the whole build session. User modules
//! write into it through the Lua `pack` API while they are being loaded; the
//! orchestrator reads it back out when saving. Incremental rebuilds rely on
//! the capture mechanism: the runner brackets each module execution with
//! [`Registry::begin_capture`] / [`Registry::end_capture`] and keeps the
//! resulting [`Produced`] record so the module's effects can be reversed
//! before it runs again.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use super::types::{ConflictPolicies, ConflictPolicy, Resource, ResourceContent, ResourceCounts, ResourceId, ResourceKind};

/// Errors that can occur while registering resources.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
  /// Two registrations claimed the same identity under the `throw` policy.
  #[error("duplicate {0}")]
  Duplicate(ResourceId),

  /// `begin_capture` was called while a capture was already open.
  #[error("a capture is already in progress")]
  CaptureInProgress,

  /// `end_capture` was called without a matching `begin_capture`.
  #[error("no capture in progress")]
  NoCapture,
}

/// Resources and objectives one module execution added to the registry.
///
/// The record holds identities, not payloads: reversing a module means
/// removing exactly the identities it introduced. A resource later replaced
/// by another module under the `replace` policy stays attributed to its
/// first registrant.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Produced {
  /// Resource identities the execution introduced.
  pub resources: BTreeSet<ResourceId>,
  /// Objective names the execution introduced.
  pub objectives: BTreeSet<String>,
}

impl Produced {
  pub fn is_empty(&self) -> bool {
    self.resources.is_empty() && self.objectives.is_empty()
  }
}

/// Key sets snapshotted at `begin_capture`.
#[derive(Debug)]
struct CaptureMark {
  resources: BTreeSet<ResourceId>,
  objectives: BTreeSet<String>,
}

/// The shared registry of everything user modules have produced.
#[derive(Debug, Default)]
pub struct Registry {
  resources: BTreeMap<ResourceId, ResourceContent>,
  objectives: BTreeSet<String>,
  policies: ConflictPolicies,
  capture: Option<CaptureMark>,
}

impl Registry {
  pub fn new(policies: ConflictPolicies) -> Self {
    Self {
      resources: BTreeMap::new(),
      objectives: BTreeSet::new(),
      policies,
      capture: None,
    }
  }

  /// Swap in the project's conflict policies once configuration is known.
  pub fn set_policies(&mut self, policies: ConflictPolicies) {
    self.policies = policies;
  }

  /// Register a resource, applying the conflict policy for its kind.
  pub fn add(&mut self, resource: Resource) -> Result<(), RegistryError> {
    let Resource { id, content } = resource;
    if self.resources.contains_key(&id) {
      match self.policies.for_kind(id.kind) {
        ConflictPolicy::Throw => return Err(RegistryError::Duplicate(id)),
        ConflictPolicy::Warn => {
          warn!(resource = %id, "duplicate registration, replacing previous payload");
        }
        ConflictPolicy::Replace => {
          debug!(resource = %id, "duplicate registration, replacing previous payload");
        }
        ConflictPolicy::Ignore => {
          debug!(resource = %id, "duplicate registration, keeping previous payload");
          return Ok(());
        }
      }
    }
    self.resources.insert(id, content);
    Ok(())
  }

  /// Register a scoreboard-style objective. Idempotent.
  pub fn add_objective(&mut self, name: &str) {
    self.objectives.insert(name.to_string());
  }

  /// Snapshot the current identity sets so the next `end_capture` can diff.
  pub fn begin_capture(&mut self) -> Result<(), RegistryError> {
    if self.capture.is_some() {
      return Err(RegistryError::CaptureInProgress);
    }
    self.capture = Some(CaptureMark {
      resources: self.resources.keys().cloned().collect(),
      objectives: self.objectives.clone(),
    });
    Ok(())
  }

  /// Close the open capture and return what was added since `begin_capture`.
  pub fn end_capture(&mut self) -> Result<Produced, RegistryError> {
    let mark = self.capture.take().ok_or(RegistryError::NoCapture)?;
    Ok(Produced {
      resources: self
        .resources
        .keys()
        .filter(|id| !mark.resources.contains(*id))
        .cloned()
        .collect(),
      objectives: self.objectives.difference(&mark.objectives).cloned().collect(),
    })
  }

  /// Remove everything a produced record attributes to a module.
  pub fn remove_produced(&mut self, produced: &Produced) {
    for id in &produced.resources {
      self.resources.remove(id);
    }
    for objective in &produced.objectives {
      self.objectives.remove(objective);
    }
  }

  /// All registered resources, in identity order.
  pub fn resources(&self) -> impl Iterator<Item = (&ResourceId, &ResourceContent)> {
    self.resources.iter()
  }

  /// All registered objectives, sorted.
  pub fn objectives(&self) -> &BTreeSet<String> {
    &self.objectives
  }

  /// Counts of registered resources, split functions vs everything else.
  pub fn counts(&self) -> ResourceCounts {
    let functions = self
      .resources
      .keys()
      .filter(|id| id.kind == ResourceKind::Function)
      .count();
    ResourceCounts {
      functions,
      other: self.resources.len() - functions,
    }
  }

  pub fn len(&self) -> usize {
    self.resources.len()
  }

  pub fn is_empty(&self) -> bool {
    self.resources.is_empty() && self.objectives.is_empty()
  }
}
