//! Lua-backed module host.
//!
//! Bridges the execution engine to the project runtime: invalidation clears
//! `package.loaded`, execution goes through `require`, and effects are
//! captured by diffing the registry around the call.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use mlua::prelude::*;

use crate::graph::scan;
use crate::lua::runtime;
use crate::pack::{Produced, Registry};
use crate::runner::{ModuleFailure, ModuleHost};

/// The production [`ModuleHost`] driving the project Lua runtime.
pub struct LuaHost<'a> {
  lua: &'a Lua,
  registry: &'a Rc<RefCell<Registry>>,
  source_dir: &'a Path,
}

impl<'a> LuaHost<'a> {
  pub fn new(lua: &'a Lua, registry: &'a Rc<RefCell<Registry>>, source_dir: &'a Path) -> Self {
    Self {
      lua,
      registry,
      source_dir,
    }
  }

  fn require_name(&self, module: &Path) -> Result<String, ModuleFailure> {
    scan::module_name(self.source_dir, module).ok_or_else(|| {
      ModuleFailure::new(
        module,
        format!("'{}' is not inside the source directory", module.display()),
      )
    })
  }
}

impl ModuleHost for LuaHost<'_> {
  fn invalidate(&mut self, module: &Path, previous: Option<&Produced>) -> Result<(), ModuleFailure> {
    let name = self.require_name(module)?;
    runtime::invalidate_module(self.lua, &name).map_err(|e| failure_from_lua(module, &e))?;
    if let Some(produced) = previous {
      self.registry.borrow_mut().remove_produced(produced);
    }
    Ok(())
  }

  fn execute(&mut self, module: &Path) -> Result<Produced, ModuleFailure> {
    let name = self.require_name(module)?;

    self
      .registry
      .borrow_mut()
      .begin_capture()
      .map_err(|e| ModuleFailure::new(module, e.to_string()))?;

    // No registry borrow may be held here: the module's own pack.* calls
    // borrow it mutably while require runs.
    let result = runtime::require_module(self.lua, &name);

    let produced = self
      .registry
      .borrow_mut()
      .end_capture()
      .map_err(|e| ModuleFailure::new(module, e.to_string()))?;

    match result {
      Ok(()) => Ok(produced),
      Err(e) => {
        // A failing module contributes nothing, not even the registrations
        // it made before the error.
        self.registry.borrow_mut().remove_produced(&produced);
        Err(failure_from_lua(module, &e))
      }
    }
  }
}

/// Split an mlua error into message and traceback for reporting.
pub(crate) fn failure_from_lua(module: &Path, error: &LuaError) -> ModuleFailure {
  let full = error.to_string();
  match full.split_once("\nstack traceback:") {
    Some((message, trace)) => ModuleFailure {
      module: module.to_path_buf(),
      message: message.trim_end().to_string(),
      traceback: Some(format!("stack traceback:{}", trace)),
    },
    None => ModuleFailure::new(module, full),
  }
}
