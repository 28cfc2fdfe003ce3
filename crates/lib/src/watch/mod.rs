//! Filesystem watch loop.
//!
//! A [`WatchSession`] subscribes to the project tree once and then runs
//! sessions: an initial full build, followed by incremental rebuilds as
//! change bursts arrive. Events are debounced into bursts, classified
//! ([`classify`]), and fed to the pure [`Scheduler`], which decides whether
//! to build, queue, or reload.
//!
//! Build failures never end a session; the loop reports them and waits for
//! the next change. Only a configuration or library change
//! ([`WatchOutcome::Restart`]) or the user quitting
//! ([`WatchOutcome::Interrupted`]) ends one.

pub mod classify;
pub mod scheduler;

pub use classify::{ChangeCategory, WatchPaths};
pub use scheduler::{Action, Scheduler, WatchState};

use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::build::{self, BuildError, BuildOptions, BuildReport, ChangeSet, ProjectContext};
use crate::consts::DEBOUNCE_MS;

/// Errors that keep a watch session from running at all.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
  /// The project root does not resolve to a real directory.
  #[error("cannot resolve project root '{path}': {source}")]
  Root { path: PathBuf, source: io::Error },

  /// The notify backend could not be started or pointed at the root.
  #[error("cannot watch the project tree: {0}")]
  Init(#[from] notify::Error),

  /// The change stream died while the loop was still running.
  #[error("change stream closed unexpectedly")]
  Closed,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
  /// Configuration or a library changed; the caller should run a fresh
  /// session to pick it up.
  Restart,
  /// The user quit.
  Interrupted,
}

#[derive(Debug, Default, Clone)]
pub struct WatchOptions {
  pub build: BuildOptions,
  /// Park changes until the user presses enter instead of auto-building.
  pub manual: bool,
}

/// Callback surface for per-build results.
///
/// `Ok` carries the report of a completed pass (which may still have failed
/// modules); `Err` carries an error that prevented the build from running.
pub type OnBuild<'a> = &'a mut dyn FnMut(Result<&BuildReport, &BuildError>);

enum LoopEvent {
  Fs(notify::Result<Event>),
  Line(String),
}

/// One debounced burst of input.
#[derive(Default)]
struct Burst {
  changes: ChangeSet,
  restart: bool,
  trigger: bool,
  quit: bool,
}

/// A live subscription to the project tree.
///
/// Create one per process and call [`WatchSession::run`] once per session;
/// after a [`WatchOutcome::Restart`] the same subscription serves the next
/// session. The notify subscription is released when the value drops, on
/// every exit path.
pub struct WatchSession {
  root: PathBuf,
  options: WatchOptions,
  rx: Receiver<LoopEvent>,
  _watcher: RecommendedWatcher,
}

impl WatchSession {
  /// Subscribe to `root` recursively and wire up the input thread.
  pub fn new(root: &Path, options: WatchOptions) -> Result<Self, WatchError> {
    // Event paths come back absolute; the root must be too.
    let root = dunce::canonicalize(root).map_err(|source| WatchError::Root {
      path: root.to_path_buf(),
      source,
    })?;

    let (tx, rx) = mpsc::channel();
    let fs_tx = tx.clone();
    let mut watcher = RecommendedWatcher::new(
      move |result| {
        let _ = fs_tx.send(LoopEvent::Fs(result));
      },
      notify::Config::default(),
    )?;
    watcher.watch(&root, RecursiveMode::Recursive)?;

    // Forwards stdin lines for manual triggers and 'q'. The thread lives
    // for the process; its sends fail harmlessly once the session is gone.
    thread::spawn(move || {
      for line in io::stdin().lines() {
        let Ok(line) = line else { break };
        if tx.send(LoopEvent::Line(line)).is_err() {
          break;
        }
      }
    });

    Ok(Self {
      root,
      options,
      rx,
      _watcher: watcher,
    })
  }

  /// Run one session to completion.
  ///
  /// Starts with a full build, then rebuilds on every scheduled change set.
  /// `on_build` observes every build result, including failed ones.
  pub fn run(&mut self, on_build: OnBuild) -> Result<WatchOutcome, WatchError> {
    let mut scheduler = Scheduler::new(self.options.manual);
    let mut context = self.initial_build(on_build);
    let mut paths = self.watch_paths(&context);
    info!(root = %self.root.display(), manual = self.options.manual, "watching for changes");

    loop {
      let first = match self.rx.recv() {
        Ok(event) => event,
        Err(_) => return Err(WatchError::Closed),
      };
      let burst = self.drain_burst(first, &paths);
      if burst.quit {
        info!("watch interrupted");
        return Ok(WatchOutcome::Interrupted);
      }

      let mut action = scheduler.on_changes(burst.changes, burst.restart);
      if burst.trigger && action == Action::None {
        action = scheduler.on_trigger();
      }

      loop {
        match action {
          Action::None => break,
          Action::Restart => {
            info!("configuration changed, session reload required");
            return Ok(WatchOutcome::Restart);
          }
          Action::Build(changes) => {
            let success = self.run_build(&mut context, &changes, on_build);
            paths = self.watch_paths(&context);
            action = scheduler.on_build_finished(success);
          }
        }
      }
    }
  }

  fn initial_build(&self, on_build: OnBuild) -> Option<ProjectContext> {
    match build::build(&self.root, &self.options.build) {
      Ok(outcome) => {
        on_build(Ok(&outcome.report));
        // Failed passes still return a usable context; their pending
        // modules carry into the next build.
        Some(outcome.context)
      }
      Err(error) => {
        on_build(Err(&error));
        None
      }
    }
  }

  fn run_build(&self, context: &mut Option<ProjectContext>, changes: &ChangeSet, on_build: OnBuild) -> bool {
    let result = match context.take() {
      Some(previous) => build::rebuild(previous, changes),
      // No reusable session after a hard failure; reload everything.
      None => build::build(&self.root, &self.options.build),
    };
    match result {
      Ok(outcome) => {
        on_build(Ok(&outcome.report));
        let success = outcome.report.success;
        *context = Some(outcome.context);
        success
      }
      Err(error) => {
        on_build(Err(&error));
        false
      }
    }
  }

  fn watch_paths(&self, context: &Option<ProjectContext>) -> WatchPaths {
    match context {
      Some(context) => WatchPaths::from_config(&context.root, &context.config, &context.target),
      None => WatchPaths::defaults(),
    }
  }

  /// Absorb `first` plus everything arriving before the stream goes quiet
  /// for one debounce window.
  fn drain_burst(&self, first: LoopEvent, paths: &WatchPaths) -> Burst {
    let mut burst = Burst::default();
    self.absorb(&mut burst, first, paths);
    while !burst.quit {
      match self.rx.recv_timeout(Duration::from_millis(DEBOUNCE_MS)) {
        Ok(event) => self.absorb(&mut burst, event, paths),
        Err(RecvTimeoutError::Timeout) => break,
        // Surfaces as Closed on the next blocking recv.
        Err(RecvTimeoutError::Disconnected) => break,
      }
    }
    burst
  }

  fn absorb(&self, burst: &mut Burst, event: LoopEvent, paths: &WatchPaths) {
    match event {
      LoopEvent::Line(line) => match line.trim() {
        "q" | "quit" => burst.quit = true,
        _ => burst.trigger = true,
      },
      LoopEvent::Fs(Err(error)) => {
        warn!(error = %error, "watch backend error");
      }
      LoopEvent::Fs(Ok(event)) => {
        if !matches!(
          event.kind,
          EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) {
          return;
        }
        for path in &event.paths {
          let Ok(rel) = path.strip_prefix(&self.root) else {
            continue;
          };
          match classify::classify(paths, rel) {
            ChangeCategory::Source => {
              burst.changes.sources.insert(rel.to_path_buf());
            }
            ChangeCategory::Resource => burst.changes.resources = true,
            ChangeCategory::Config | ChangeCategory::Dependency => {
              debug!(path = %rel.display(), "restart-level change");
              burst.restart = true;
            }
            ChangeCategory::Other => {}
          }
        }
      }
    }
  }
}
