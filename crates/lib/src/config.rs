//! Project configuration.
//!
//! `kiln.lua` at the project root describes the pack: namespace, directory
//! layout, conflict handling, and optional lifecycle hooks. The file is
//! evaluated inside the project's own Lua runtime so hook functions close
//! over the same globals user modules see.

use std::cell::RefCell;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;

use mlua::prelude::*;

use crate::consts::{
  CONFIG_FILE, DEFAULT_LIB_DIRS, DEFAULT_OUTPUT_DIR, DEFAULT_RESOURCES_DIR, DEFAULT_SOURCE_DIR,
};
use crate::lua::runtime;
use crate::pack::{ConflictPolicies, ConflictPolicy, Registry, ResourceKind, valid_namespace};

/// Errors that can occur while loading `kiln.lua`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  /// No configuration file in the project root.
  #[error("no kiln.lua found in '{0}'")]
  Missing(PathBuf),

  /// The configuration file failed to evaluate.
  #[error("lua error: {0}")]
  Lua(#[from] LuaError),

  /// The configuration table is malformed.
  #[error("invalid configuration: {0}")]
  Invalid(String),
}

/// Evaluated project configuration.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
  /// Default namespace for resource registrations.
  pub namespace: String,
  pub description: Option<String>,
  pub version: Option<String>,
  /// Module tree, relative to the project root.
  pub source_dir: PathBuf,
  /// Default output root, relative to the project root.
  pub output_dir: PathBuf,
  /// Static files copied verbatim into the output tree.
  pub resources_dir: PathBuf,
  /// Extra `package.path` roots for third-party Lua libraries.
  pub lib_dirs: Vec<PathBuf>,
  /// Directory containing named worlds, for `--world` targeting.
  pub worlds_dir: Option<PathBuf>,
  /// Duplicate-registration handling per resource kind.
  pub policies: ConflictPolicies,
}

impl ProjectConfig {
  /// Evaluate `kiln.lua` in a throwaway runtime.
  ///
  /// For callers that need the configuration without a build session, such
  /// as target resolution for cleaning. Hooks are discarded with the
  /// runtime.
  pub fn load(root: &Path) -> Result<Self, ConfigError> {
    let registry = Rc::new(RefCell::new(Registry::default()));
    let lua = runtime::create_runtime(registry)?;
    let (config, _hooks) = load(&lua, root)?;
    Ok(config)
  }
}

/// Lifecycle hook functions, pinned in the Lua registry.
///
/// Keys stay valid as long as the runtime that created them lives; the
/// project context owns both.
#[derive(Debug, Default)]
pub struct Hooks {
  pub before_build: Option<LuaRegistryKey>,
  pub before_save: Option<LuaRegistryKey>,
  pub after_build: Option<LuaRegistryKey>,
}

/// Evaluate `kiln.lua` under `root` and extract the typed configuration.
///
/// # Arguments
/// * `lua` - The project runtime the config (and its hooks) should live in
/// * `root` - Project root directory
///
/// # Returns
/// The parsed [`ProjectConfig`] plus any lifecycle [`Hooks`] the config
/// declared.
pub fn load(lua: &Lua, root: &Path) -> Result<(ProjectConfig, Hooks), ConfigError> {
  let path = root.join(CONFIG_FILE);
  if !path.is_file() {
    return Err(ConfigError::Missing(root.to_path_buf()));
  }

  let value = runtime::load_file(lua, &path)?;
  let LuaValue::Table(table) = value else {
    return Err(ConfigError::Invalid("kiln.lua must return a table".to_string()));
  };

  let namespace: String = table
    .get("namespace")
    .map_err(|_| ConfigError::Invalid("the 'namespace' field is required".to_string()))?;
  if !valid_namespace(&namespace) {
    return Err(ConfigError::Invalid(format!(
      "invalid namespace '{namespace}': expected [a-z0-9_-]"
    )));
  }

  let description: Option<String> = table.get("description")?;
  let version: Option<String> = table.get("version")?;

  let source_dir = dir_field(&table, "source_dir", DEFAULT_SOURCE_DIR)?;
  let output_dir = dir_field(&table, "output_dir", DEFAULT_OUTPUT_DIR)?;
  let resources_dir = dir_field(&table, "resources_dir", DEFAULT_RESOURCES_DIR)?;

  let lib_dirs = match table.get::<Option<LuaTable>>("lib_dirs")? {
    Some(list) => {
      let mut dirs = Vec::new();
      for entry in list.sequence_values::<String>() {
        dirs.push(relative_dir("lib_dirs", &entry?)?);
      }
      dirs
    }
    None => DEFAULT_LIB_DIRS.iter().map(PathBuf::from).collect(),
  };

  // Worlds live wherever the game keeps them, usually outside the project.
  let worlds_dir: Option<PathBuf> = table.get::<Option<String>>("worlds_dir")?.map(PathBuf::from);

  let policies = conflict_policies(&table)?;
  let hooks = match table.get::<Option<LuaTable>>("hooks")? {
    Some(t) => Hooks {
      before_build: hook_key(lua, &t, "before_build")?,
      before_save: hook_key(lua, &t, "before_save")?,
      after_build: hook_key(lua, &t, "after_build")?,
    },
    None => Hooks::default(),
  };

  Ok((
    ProjectConfig {
      namespace,
      description,
      version,
      source_dir,
      output_dir,
      resources_dir,
      lib_dirs,
      worlds_dir,
      policies,
    },
    hooks,
  ))
}

fn dir_field(table: &LuaTable, key: &str, default: &str) -> Result<PathBuf, ConfigError> {
  match table.get::<Option<String>>(key)? {
    Some(raw) => relative_dir(key, &raw),
    None => Ok(PathBuf::from(default)),
  }
}

fn relative_dir(key: &str, raw: &str) -> Result<PathBuf, ConfigError> {
  let dir = PathBuf::from(raw);
  if raw.is_empty()
    || dir.is_absolute()
    || dir.components().any(|c| matches!(c, Component::ParentDir))
  {
    return Err(ConfigError::Invalid(format!(
      "'{key}' must name a relative directory inside the project, got '{raw}'"
    )));
  }
  Ok(dir)
}

/// Parse `on_conflict`, which is either a bare policy string applied to all
/// kinds or a table with `default` and per-kind overrides.
fn conflict_policies(table: &LuaTable) -> Result<ConflictPolicies, ConfigError> {
  match table.get::<LuaValue>("on_conflict")? {
    LuaValue::Nil => Ok(ConflictPolicies::default()),
    LuaValue::String(s) => {
      let raw = s.to_string_lossy();
      Ok(ConflictPolicies::new(parse_policy(&raw)?))
    }
    LuaValue::Table(t) => {
      let mut policies = match t.get::<Option<String>>("default")? {
        Some(raw) => ConflictPolicies::new(parse_policy(&raw)?),
        None => ConflictPolicies::default(),
      };
      for (key, kind) in [
        ("function", ResourceKind::Function),
        ("tag", ResourceKind::Tag),
        ("data", ResourceKind::Data),
        ("asset", ResourceKind::Asset),
      ] {
        if let Some(raw) = t.get::<Option<String>>(key)? {
          policies.set(kind, parse_policy(&raw)?);
        }
      }
      Ok(policies)
    }
    other => Err(ConfigError::Invalid(format!(
      "'on_conflict' must be a policy string or table, got {}",
      other.type_name()
    ))),
  }
}

fn parse_policy(raw: &str) -> Result<ConflictPolicy, ConfigError> {
  ConflictPolicy::parse(raw).ok_or_else(|| {
    ConfigError::Invalid(format!(
      "unknown conflict policy '{raw}': expected throw, warn, replace or ignore"
    ))
  })
}

fn hook_key(lua: &Lua, hooks: &LuaTable, name: &str) -> Result<Option<LuaRegistryKey>, ConfigError> {
  let func: Option<LuaFunction> = hooks
    .get(name)
    .map_err(|_| ConfigError::Invalid(format!("hook '{name}' must be a function")))?;
  match func {
    Some(f) => Ok(Some(lua.create_registry_value(f)?)),
    None => Ok(None),
  }
}
