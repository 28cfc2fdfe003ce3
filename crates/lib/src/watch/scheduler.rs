//! Watch-session state machine.
//!
//! The scheduler owns the rebuild policy and nothing else: no filesystem, no
//! timers, no Lua. The loop feeds it coalesced change bursts and build
//! results; it answers with the next [`Action`]. Keeping it pure makes the
//! single-flight and restart rules directly testable.

use crate::build::ChangeSet;

/// Where a watch session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
  /// Idle, waiting for changes.
  Watching,
  /// A build is in flight.
  Building,
  /// Changes are parked until an explicit trigger (manual mode only).
  Pending,
  /// The session must be reloaded; terminal for this scheduler.
  Restarting,
  /// The last build failed; waiting for the next change, no auto-retry.
  Error,
}

/// What the loop should do next.
#[derive(Debug, PartialEq)]
pub enum Action {
  None,
  /// Run a build over the given changes.
  Build(ChangeSet),
  /// Tear the session down and reload it from scratch.
  Restart,
}

/// Pure rebuild scheduler.
///
/// Invariants:
/// - at most one build runs at a time, and at most one follow-up rebuild is
///   ever queued behind it; further bursts extend the queued change set
/// - a restart request is honored only once the in-flight build completes;
///   builds are never cancelled mid-flight
#[derive(Debug)]
pub struct Scheduler {
  state: WatchState,
  manual: bool,
  /// Changes accumulated while parked or while a build is in flight.
  pending: ChangeSet,
  /// Whether a rebuild is queued behind the in-flight build.
  queued: bool,
  restart_requested: bool,
}

impl Scheduler {
  pub fn new(manual: bool) -> Self {
    Self {
      state: WatchState::Watching,
      manual,
      pending: ChangeSet::default(),
      queued: false,
      restart_requested: false,
    }
  }

  pub fn state(&self) -> WatchState {
    self.state
  }

  /// Feed one debounced burst of changes.
  ///
  /// `restart` marks a burst containing a configuration or library change;
  /// it outranks everything else in the burst.
  pub fn on_changes(&mut self, changes: ChangeSet, restart: bool) -> Action {
    if restart {
      if self.state == WatchState::Building {
        self.restart_requested = true;
        return Action::None;
      }
      self.state = WatchState::Restarting;
      return Action::Restart;
    }
    if changes.is_empty() {
      return Action::None;
    }

    match self.state {
      WatchState::Watching | WatchState::Error => {
        self.pending.merge(changes);
        if self.manual {
          self.state = WatchState::Pending;
          Action::None
        } else {
          self.state = WatchState::Building;
          Action::Build(std::mem::take(&mut self.pending))
        }
      }
      WatchState::Pending => {
        self.pending.merge(changes);
        Action::None
      }
      WatchState::Building => {
        self.pending.merge(changes);
        if !self.manual {
          self.queued = true;
        }
        Action::None
      }
      WatchState::Restarting => Action::None,
    }
  }

  /// An explicit user trigger; starts a parked build, nothing else.
  pub fn on_trigger(&mut self) -> Action {
    if self.state == WatchState::Pending {
      self.state = WatchState::Building;
      Action::Build(std::mem::take(&mut self.pending))
    } else {
      Action::None
    }
  }

  /// The in-flight build finished. Deferred restarts win over queued
  /// rebuilds; the queued change set is dropped with them since the reload
  /// rebuilds everything anyway.
  pub fn on_build_finished(&mut self, success: bool) -> Action {
    if self.restart_requested {
      self.state = WatchState::Restarting;
      return Action::Restart;
    }
    if self.queued {
      self.queued = false;
      return Action::Build(std::mem::take(&mut self.pending));
    }
    self.state = if self.manual && !self.pending.is_empty() {
      WatchState::Pending
    } else if success {
      WatchState::Watching
    } else {
      WatchState::Error
    };
    Action::None
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeSet;
  use std::path::PathBuf;

  fn set(paths: &[&str]) -> ChangeSet {
    ChangeSet {
      sources: paths.iter().map(PathBuf::from).collect::<BTreeSet<_>>(),
      resources: false,
    }
  }

  #[test]
  fn a_change_starts_a_build_immediately() {
    let mut scheduler = Scheduler::new(false);
    let action = scheduler.on_changes(set(&["src/a.lua"]), false);
    assert_eq!(action, Action::Build(set(&["src/a.lua"])));
    assert_eq!(scheduler.state(), WatchState::Building);
  }

  #[test]
  fn empty_bursts_are_inert() {
    let mut scheduler = Scheduler::new(false);
    assert_eq!(scheduler.on_changes(ChangeSet::default(), false), Action::None);
    assert_eq!(scheduler.state(), WatchState::Watching);
  }

  #[test]
  fn bursts_while_building_coalesce_into_one_rebuild() {
    let mut scheduler = Scheduler::new(false);
    scheduler.on_changes(set(&["src/a.lua"]), false);

    // Two more bursts land while the build is in flight.
    assert_eq!(scheduler.on_changes(set(&["src/b.lua"]), false), Action::None);
    assert_eq!(scheduler.on_changes(set(&["src/c.lua"]), false), Action::None);

    // Exactly one follow-up build, covering the union.
    let action = scheduler.on_build_finished(true);
    assert_eq!(action, Action::Build(set(&["src/b.lua", "src/c.lua"])));
    assert_eq!(scheduler.state(), WatchState::Building);

    assert_eq!(scheduler.on_build_finished(true), Action::None);
    assert_eq!(scheduler.state(), WatchState::Watching);
  }

  #[test]
  fn idle_restarts_are_immediate() {
    let mut scheduler = Scheduler::new(false);
    assert_eq!(scheduler.on_changes(ChangeSet::default(), true), Action::Restart);
    assert_eq!(scheduler.state(), WatchState::Restarting);
  }

  #[test]
  fn restarts_wait_for_the_inflight_build() {
    let mut scheduler = Scheduler::new(false);
    scheduler.on_changes(set(&["src/a.lua"]), false);

    assert_eq!(scheduler.on_changes(ChangeSet::default(), true), Action::None);
    assert_eq!(scheduler.state(), WatchState::Building);

    assert_eq!(scheduler.on_build_finished(true), Action::Restart);
    assert_eq!(scheduler.state(), WatchState::Restarting);
  }

  #[test]
  fn restarts_outrank_queued_rebuilds() {
    let mut scheduler = Scheduler::new(false);
    scheduler.on_changes(set(&["src/a.lua"]), false);
    scheduler.on_changes(set(&["src/b.lua"]), false);
    scheduler.on_changes(ChangeSet::default(), true);

    assert_eq!(scheduler.on_build_finished(true), Action::Restart);
  }

  #[test]
  fn failures_enter_the_error_state_until_the_next_change() {
    let mut scheduler = Scheduler::new(false);
    scheduler.on_changes(set(&["src/a.lua"]), false);
    assert_eq!(scheduler.on_build_finished(false), Action::None);
    assert_eq!(scheduler.state(), WatchState::Error);

    // No auto-retry; the next change starts a build as usual.
    let action = scheduler.on_changes(set(&["src/a.lua"]), false);
    assert_eq!(action, Action::Build(set(&["src/a.lua"])));
    assert_eq!(scheduler.state(), WatchState::Building);
  }

  #[test]
  fn manual_mode_parks_changes_until_triggered() {
    let mut scheduler = Scheduler::new(true);
    assert_eq!(scheduler.on_changes(set(&["src/a.lua"]), false), Action::None);
    assert_eq!(scheduler.state(), WatchState::Pending);
    assert_eq!(scheduler.on_changes(set(&["src/b.lua"]), false), Action::None);

    let action = scheduler.on_trigger();
    assert_eq!(action, Action::Build(set(&["src/a.lua", "src/b.lua"])));
    assert_eq!(scheduler.state(), WatchState::Building);

    assert_eq!(scheduler.on_build_finished(true), Action::None);
    assert_eq!(scheduler.state(), WatchState::Watching);
  }

  #[test]
  fn manual_changes_during_a_build_park_again() {
    let mut scheduler = Scheduler::new(true);
    scheduler.on_changes(set(&["src/a.lua"]), false);
    scheduler.on_trigger();

    assert_eq!(scheduler.on_changes(set(&["src/b.lua"]), false), Action::None);
    assert_eq!(scheduler.on_build_finished(true), Action::None);
    assert_eq!(scheduler.state(), WatchState::Pending);

    assert_eq!(scheduler.on_trigger(), Action::Build(set(&["src/b.lua"])));
  }

  #[test]
  fn triggers_with_nothing_parked_do_nothing() {
    let mut scheduler = Scheduler::new(true);
    assert_eq!(scheduler.on_trigger(), Action::None);
    assert_eq!(scheduler.state(), WatchState::Watching);

    let mut auto = Scheduler::new(false);
    assert_eq!(auto.on_trigger(), Action::None);
  }
}
