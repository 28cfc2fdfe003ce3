//! Low-level Lua VM management.
//!
//! The runtime is created once per project session and reused across
//! incremental builds. Module caching is Lua's own `package.loaded` table;
//! invalidation clears an entry there so the next `require` re-executes the
//! file.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::prelude::*;

use crate::lua::globals;
use crate::pack::Registry;

/// Create a new Lua runtime wired to the shared resource registry.
///
/// The `pack` global is registered immediately; the project namespace and
/// `package.path` are configured separately once the project configuration
/// has been evaluated, since both come out of `kiln.lua`.
pub fn create_runtime(registry: Rc<RefCell<Registry>>) -> LuaResult<Lua> {
  let lua = Lua::new();
  globals::register_globals(&lua, registry)?;
  Ok(lua)
}

/// Point `package.path` at the project's source and library directories.
///
/// The default path is replaced entirely: user modules resolve against the
/// project tree and its configured libraries, nothing else.
pub fn set_package_path(lua: &Lua, root: &Path, source_dir: &Path, lib_dirs: &[PathBuf]) -> LuaResult<()> {
  let mut templates = Vec::new();
  for dir in std::iter::once(source_dir).chain(lib_dirs.iter().map(PathBuf::as_path)) {
    let base = root.join(dir);
    templates.push(format!("{}/?.lua", base.display()));
    templates.push(format!("{}/?/init.lua", base.display()));
  }
  lua
    .globals()
    .get::<LuaTable>("package")?
    .set("path", templates.join(";"))?;
  Ok(())
}

/// Load and execute a Lua file at the given path.
///
/// Returns the value the chunk evaluates to.
pub fn load_file(lua: &Lua, path: &Path) -> LuaResult<LuaValue> {
  let canonical_path = path
    .canonicalize()
    .map_err(|e| LuaError::external(format!("cannot resolve '{}': {}", path.display(), e)))?;
  let content = std::fs::read_to_string(&canonical_path)
    .map_err(|e| LuaError::external(format!("cannot read '{}': {}", canonical_path.display(), e)))?;

  lua
    .load(&content)
    .set_name(format!("@{}", canonical_path.display()))
    .eval::<LuaValue>()
}

/// Drop a module from `package.loaded` so the next require re-executes it.
pub fn invalidate_module(lua: &Lua, name: &str) -> LuaResult<()> {
  let loaded: LuaTable = lua.globals().get::<LuaTable>("package")?.get::<LuaTable>("loaded")?;
  loaded.raw_set(name, LuaValue::Nil)?;
  Ok(())
}

/// Execute a module through `require`, discarding its return value.
pub fn require_module(lua: &Lua, name: &str) -> LuaResult<()> {
  let require: LuaFunction = lua.globals().get("require")?;
  require.call::<LuaValue>(name)?;
  Ok(())
}
