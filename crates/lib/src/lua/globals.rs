//! The `pack` global table.
//!
//! This module registers the `pack` global which user modules call to
//! register output resources:
//! - `pack.func(name, body)` - a function; body is a string or array of lines
//! - `pack.tag(name, values)` - a tag listing other resource names
//! - `pack.data(name, table)` - a structured data entry, serialized to JSON
//! - `pack.asset(name, bytes)` - an opaque client-side file
//! - `pack.objective(name)` - a scoreboard-style objective
//! - `pack.namespace()` - the project namespace
//!
//! Resource names take an optional namespace prefix (`"other:path/name"`);
//! bare names inherit the project namespace.

use std::cell::RefCell;
use std::rc::Rc;

use mlua::prelude::*;
use mlua::LuaSerdeExt;

use crate::pack::{Registry, Resource, ResourceContent, ResourceId, ResourceKind, ResourceLocation};

/// Registry key holding the project namespace for bare resource names.
const NAMESPACE_KEY: &str = "__kiln_namespace";

/// Register the `pack` global table in the Lua runtime.
pub fn register_globals(lua: &Lua, registry: Rc<RefCell<Registry>>) -> LuaResult<()> {
  // The namespace is filled in after kiln.lua has been evaluated.
  lua.set_named_registry_value(NAMESPACE_KEY, "")?;

  let pack = lua.create_table()?;

  let reg = registry.clone();
  let func = lua.create_function(move |lua, (name, body): (String, LuaValue)| {
    let content = ResourceContent::Text(function_body(body)?);
    add_resource(lua, &reg, ResourceKind::Function, &name, content)
  })?;
  pack.set("func", func)?;

  let reg = registry.clone();
  let tag = lua.create_function(move |lua, (name, values): (String, Vec<String>)| {
    let content = ResourceContent::Json(serde_json::json!({ "values": values }));
    add_resource(lua, &reg, ResourceKind::Tag, &name, content)
  })?;
  pack.set("tag", tag)?;

  let reg = registry.clone();
  let data = lua.create_function(move |lua, (name, value): (String, LuaValue)| {
    let json: serde_json::Value = lua.from_value(value)?;
    add_resource(lua, &reg, ResourceKind::Data, &name, ResourceContent::Json(json))
  })?;
  pack.set("data", data)?;

  let reg = registry.clone();
  let asset = lua.create_function(move |lua, (name, data): (String, LuaString)| {
    let content = ResourceContent::Binary(data.as_bytes().to_vec());
    add_resource(lua, &reg, ResourceKind::Asset, &name, content)
  })?;
  pack.set("asset", asset)?;

  let reg = registry.clone();
  let objective = lua.create_function(move |_, name: String| {
    if !valid_objective(&name) {
      return Err(LuaError::external(format!(
        "invalid objective name '{}': expected [a-z0-9_.]",
        name
      )));
    }
    reg.borrow_mut().add_objective(&name);
    Ok(())
  })?;
  pack.set("objective", objective)?;

  let namespace = lua.create_function(|lua, ()| lua.named_registry_value::<String>(NAMESPACE_KEY))?;
  pack.set("namespace", namespace)?;

  lua.globals().set("pack", pack)?;
  Ok(())
}

/// Set the project namespace bare resource names resolve under.
pub fn set_namespace(lua: &Lua, namespace: &str) -> LuaResult<()> {
  lua.set_named_registry_value(NAMESPACE_KEY, namespace)
}

fn add_resource(
  lua: &Lua,
  registry: &Rc<RefCell<Registry>>,
  kind: ResourceKind,
  raw_name: &str,
  content: ResourceContent,
) -> LuaResult<()> {
  let namespace: String = lua.named_registry_value(NAMESPACE_KEY)?;
  let location = ResourceLocation::parse(raw_name, &namespace).map_err(LuaError::external)?;
  registry
    .borrow_mut()
    .add(Resource {
      id: ResourceId::new(kind, location),
      content,
    })
    .map_err(LuaError::external)
}

/// Coerce a function body into its emitted text.
///
/// Accepts a single string or an array of lines; either way the result ends
/// with exactly the written content plus a trailing newline.
fn function_body(value: LuaValue) -> LuaResult<String> {
  let mut body = match value {
    LuaValue::String(s) => s.to_string_lossy(),
    LuaValue::Table(t) => {
      let mut lines = Vec::new();
      for line in t.sequence_values::<String>() {
        lines.push(line?);
      }
      lines.join("\n")
    }
    other => {
      return Err(LuaError::external(format!(
        "function body must be a string or an array of strings, got {}",
        other.type_name()
      )));
    }
  };
  if !body.ends_with('\n') {
    body.push('\n');
  }
  Ok(body)
}

fn valid_objective(name: &str) -> bool {
  !name.is_empty()
    && name
      .bytes()
      .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'.')
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::pack::{ConflictPolicies, ConflictPolicy};
  use std::collections::BTreeSet;

  fn test_runtime() -> (Lua, Rc<RefCell<Registry>>) {
    test_runtime_with(ConflictPolicies::default())
  }

  fn test_runtime_with(policies: ConflictPolicies) -> (Lua, Rc<RefCell<Registry>>) {
    let registry = Rc::new(RefCell::new(Registry::new(policies)));
    let lua = crate::lua::runtime::create_runtime(registry.clone()).unwrap();
    set_namespace(&lua, "test").unwrap();
    (lua, registry)
  }

  fn keys(registry: &Rc<RefCell<Registry>>) -> Vec<String> {
    registry.borrow().resources().map(|(id, _)| id.rel_key()).collect()
  }

  mod functions {
    use super::*;

    #[test]
    fn string_body_registers_server_side() {
      let (lua, registry) = test_runtime();
      lua.load(r#"pack.func('mobs/spawn', 'summon golem')"#).exec().unwrap();

      assert_eq!(keys(&registry), vec!["server/test/functions/mobs/spawn.fn"]);
      let (_, content) = registry.borrow().resources().next().map(|(id, c)| (id.clone(), c.clone())).unwrap();
      assert_eq!(content, ResourceContent::Text("summon golem\n".to_string()));
    }

    #[test]
    fn array_body_joins_lines() {
      let (lua, registry) = test_runtime();
      lua
        .load(r#"pack.func('boot', { 'line one', 'line two' })"#)
        .exec()
        .unwrap();

      let registry = registry.borrow();
      let (_, content) = registry.resources().next().unwrap();
      assert_eq!(content, &ResourceContent::Text("line one\nline two\n".to_string()));
    }

    #[test]
    fn non_string_body_errors() {
      let (lua, _) = test_runtime();
      let err = lua.load(r#"pack.func('broken', 42)"#).exec().unwrap_err();
      assert!(err.to_string().contains("string or an array"));
    }
  }

  mod names {
    use super::*;

    #[test]
    fn explicit_namespace_overrides_project_namespace() {
      let (lua, registry) = test_runtime();
      lua.load(r#"pack.func('vanilla:tick', 'noop')"#).exec().unwrap();
      assert_eq!(keys(&registry), vec!["server/vanilla/functions/tick.fn"]);
    }

    #[test]
    fn invalid_names_surface_as_lua_errors() {
      let (lua, _) = test_runtime();
      let err = lua.load(r#"pack.func('../escape', 'x')"#).exec().unwrap_err();
      assert!(err.to_string().contains("invalid resource path"));
    }

    #[test]
    fn namespace_accessor_reports_the_project_namespace() {
      let (lua, _) = test_runtime();
      let ns: String = lua.load("return pack.namespace()").eval().unwrap();
      assert_eq!(ns, "test");
    }
  }

  mod payloads {
    use super::*;

    #[test]
    fn tags_wrap_their_values() {
      let (lua, registry) = test_runtime();
      lua.load(r#"pack.tag('enemies', { 'test:golem', 'test:wisp' })"#).exec().unwrap();

      let registry = registry.borrow();
      let (id, content) = registry.resources().next().unwrap();
      assert_eq!(id.kind, ResourceKind::Tag);
      assert_eq!(
        content,
        &ResourceContent::Json(serde_json::json!({ "values": ["test:golem", "test:wisp"] }))
      );
    }

    #[test]
    fn data_tables_serialize_to_json() {
      let (lua, registry) = test_runtime();
      lua
        .load(r#"pack.data('loot/golem', { rolls = 2, entries = { 'iron', 'flowers' } })"#)
        .exec()
        .unwrap();

      let registry = registry.borrow();
      let (_, content) = registry.resources().next().unwrap();
      let ResourceContent::Json(value) = content else {
        panic!("expected json payload");
      };
      assert_eq!(value["rolls"], 2);
      assert_eq!(value["entries"][1], "flowers");
    }

    #[test]
    fn assets_keep_raw_bytes_client_side() {
      let (lua, registry) = test_runtime();
      lua.load(r#"pack.asset('textures/golem.png', '\1\2\3')"#).exec().unwrap();

      assert_eq!(keys(&registry), vec!["client/test/assets/textures/golem.png"]);
      let registry = registry.borrow();
      let (_, content) = registry.resources().next().unwrap();
      assert_eq!(content, &ResourceContent::Binary(vec![1, 2, 3]));
    }

    #[test]
    fn objectives_accumulate() {
      let (lua, registry) = test_runtime();
      lua.load(r#"pack.objective('kills')"#).exec().unwrap();
      lua.load(r#"pack.objective('deaths')"#).exec().unwrap();
      lua.load(r#"pack.objective('kills')"#).exec().unwrap();

      assert_eq!(
        registry.borrow().objectives(),
        &BTreeSet::from(["deaths".to_string(), "kills".to_string()])
      );
    }

    #[test]
    fn invalid_objective_names_error() {
      let (lua, _) = test_runtime();
      let err = lua.load(r#"pack.objective('Kills!')"#).exec().unwrap_err();
      assert!(err.to_string().contains("invalid objective name"));
    }
  }

  mod conflicts {
    use super::*;

    #[test]
    fn duplicates_error_under_the_default_policy() {
      let (lua, _) = test_runtime();
      lua.load(r#"pack.func('tick', 'a')"#).exec().unwrap();
      let err = lua.load(r#"pack.func('tick', 'b')"#).exec().unwrap_err();
      assert!(err.to_string().contains("duplicate function test:tick"));
    }

    #[test]
    fn replace_policy_lets_the_later_registration_win() {
      let (lua, registry) = test_runtime_with(ConflictPolicies::new(ConflictPolicy::Replace));
      lua.load(r#"pack.func('tick', 'a')"#).exec().unwrap();
      lua.load(r#"pack.func('tick', 'b')"#).exec().unwrap();

      let registry = registry.borrow();
      let (_, content) = registry.resources().next().unwrap();
      assert_eq!(content, &ResourceContent::Text("b\n".to_string()));
    }
  }
}
