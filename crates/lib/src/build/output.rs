//! Output persistence.
//!
//! Turns the registry into a planned set of output files (generated
//! resources, bootstrap descriptors and the objectives init function,
//! plus verbatim copies of the static resource tree), then pushes the plan
//! through the content cache: write what changed, delete what went stale,
//! persist the cache. Writes always happen before deletes, so a path
//! rewritten in the same pass can never be deleted by it.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cache::OutputCache;
use crate::config::ProjectConfig;
use crate::consts::{FUNCTION_EXT, INIT_FUNCTION, META_DIR, PACK_DESCRIPTOR, PACK_FORMAT};
use crate::pack::{PackTarget, Registry};
use crate::util::paths;

use super::BuildError;

/// File traffic of one save step.
#[derive(Debug, Default, Clone, Copy)]
pub struct SaveStats {
  pub files_written: usize,
  pub files_deleted: usize,
}

#[derive(Serialize)]
struct PackDescriptor<'a> {
  name: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  description: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  version: Option<&'a str>,
  pack_format: u32,
}

/// Serialize the registry and persist it under `target`.
///
/// On dry runs every decision is made against a scratch copy of the cache,
/// and neither the output tree nor the persisted cache is touched.
pub fn save(
  registry: &Registry,
  config: &ProjectConfig,
  root: &Path,
  target: &Path,
  cache: &mut OutputCache,
  dry_run: bool,
) -> Result<SaveStats, BuildError> {
  let planned = plan_files(registry, config, root)?;
  if dry_run {
    let mut scratch = cache.clone();
    return apply(&planned, target, &mut scratch, true);
  }
  let stats = apply(&planned, target, cache, false)?;
  cache.persist(&root.join(META_DIR))?;
  Ok(stats)
}

/// Everything this build wants on disk: output-relative path to bytes.
fn plan_files(
  registry: &Registry,
  config: &ProjectConfig,
  root: &Path,
) -> Result<BTreeMap<String, Vec<u8>>, BuildError> {
  let mut planned = BTreeMap::new();

  // Static resources first, so generated files win collisions.
  let resources_root = root.join(&config.resources_dir);
  if resources_root.is_dir() {
    for entry in WalkDir::new(&resources_root).sort_by_file_name() {
      let entry = entry?;
      if !entry.file_type().is_file() {
        continue;
      }
      let rel = entry
        .path()
        .strip_prefix(&resources_root)
        .expect("walked path is under its root");
      let bytes = fs::read(entry.path()).map_err(|source| BuildError::ReadResource {
        path: entry.path().to_path_buf(),
        source,
      })?;
      planned.insert(paths::path_key(rel), bytes);
    }
  }

  for (id, content) in registry.resources() {
    let key = id.rel_key();
    let bytes = content.to_bytes().map_err(|source| BuildError::Serialize {
      key: key.clone(),
      source,
    })?;
    if planned.insert(key.clone(), bytes).is_some() {
      warn!(path = %key, "generated resource shadows a static resource file");
    }
  }

  if !registry.objectives().is_empty() {
    let mut body = String::new();
    for objective in registry.objectives() {
      body.push_str("objective add ");
      body.push_str(objective);
      body.push('\n');
    }
    let key = format!(
      "{}/{}/functions/{INIT_FUNCTION}.{FUNCTION_EXT}",
      PackTarget::Server.dir_name(),
      config.namespace
    );
    planned.insert(key, body.into_bytes());
  }

  // Descriptors last: a target earns one once anything else lands in it.
  for pack in PackTarget::ALL {
    let prefix = format!("{}/", pack.dir_name());
    if planned.keys().any(|key| key.starts_with(&prefix)) {
      let descriptor = PackDescriptor {
        name: &config.namespace,
        description: config.description.as_deref(),
        version: config.version.as_deref(),
        pack_format: PACK_FORMAT,
      };
      let mut bytes = serde_json::to_vec_pretty(&descriptor).map_err(|source| BuildError::Serialize {
        key: PACK_DESCRIPTOR.to_string(),
        source,
      })?;
      bytes.push(b'\n');
      planned.insert(format!("{prefix}{PACK_DESCRIPTOR}"), bytes);
    }
  }

  Ok(planned)
}

fn apply(
  planned: &BTreeMap<String, Vec<u8>>,
  target: &Path,
  cache: &mut OutputCache,
  dry_run: bool,
) -> Result<SaveStats, BuildError> {
  let mut stats = SaveStats::default();

  for (key, bytes) in planned {
    if !cache.should_write(key, bytes) {
      continue;
    }
    stats.files_written += 1;
    if dry_run {
      continue;
    }
    let path = target.join(Path::new(key));
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).map_err(|source| BuildError::WriteOutput {
        path: parent.to_path_buf(),
        source,
      })?;
    }
    fs::write(&path, bytes).map_err(|source| BuildError::WriteOutput { path, source })?;
  }

  for key in cache.finalize() {
    let path = target.join(Path::new(&key));
    stats.files_deleted += 1;
    if dry_run {
      continue;
    }
    match fs::remove_file(&path) {
      Ok(()) => prune_empty_dirs(target, Path::new(&key)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "stale output already gone");
      }
      Err(e) => {
        warn!(path = %path.display(), error = %e, "failed to delete stale output");
      }
    }
  }

  info!(
    written = stats.files_written,
    deleted = stats.files_deleted,
    total = planned.len(),
    dry_run,
    "outputs saved"
  );
  Ok(stats)
}

/// Remove directories left empty by a deletion, from the file's parent up.
fn prune_empty_dirs(target: &Path, rel: &Path) {
  let mut current = rel.parent();
  while let Some(dir) = current {
    if dir.as_os_str().is_empty() || fs::remove_dir(target.join(dir)).is_err() {
      break;
    }
    current = dir.parent();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::path::PathBuf;

  use crate::pack::{ConflictPolicies, Resource, ResourceContent, ResourceId, ResourceKind, ResourceLocation};

  fn test_config() -> ProjectConfig {
    ProjectConfig {
      namespace: "mypack".to_string(),
      description: Some("demo".to_string()),
      version: None,
      source_dir: PathBuf::from("src"),
      output_dir: PathBuf::from("dist"),
      resources_dir: PathBuf::from("resources"),
      lib_dirs: vec![PathBuf::from("lib")],
      worlds_dir: None,
      policies: ConflictPolicies::default(),
    }
  }

  fn func(path: &str, body: &str) -> Resource {
    Resource {
      id: ResourceId::new(
        ResourceKind::Function,
        ResourceLocation::parse(path, "mypack").unwrap(),
      ),
      content: ResourceContent::Text(body.to_string()),
    }
  }

  fn registry_with(resources: &[Resource]) -> Registry {
    let mut registry = Registry::default();
    for resource in resources {
      registry.add(resource.clone()).unwrap();
    }
    registry
  }

  #[test]
  fn plans_resources_bootstrap_and_statics() {
    let dir = tempfile::tempdir().unwrap();
    let statics = dir.path().join("resources/client/mypack/assets");
    fs::create_dir_all(&statics).unwrap();
    fs::write(statics.join("icon.png"), b"png").unwrap();

    let mut registry = registry_with(&[func("mobs/golem", "summon golem\n")]);
    registry.add_objective("kills");

    let planned = plan_files(&registry, &test_config(), dir.path()).unwrap();
    let keys: Vec<&String> = planned.keys().collect();
    assert_eq!(
      keys,
      vec![
        "client/mypack/assets/icon.png",
        "client/pack.json",
        "server/mypack/functions/__init__.fn",
        "server/mypack/functions/mobs/golem.fn",
        "server/pack.json",
      ]
    );
    assert_eq!(
      planned["server/mypack/functions/__init__.fn"],
      b"objective add kills\n".to_vec()
    );
  }

  #[test]
  fn untouched_targets_get_no_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_with(&[func("mobs/golem", "summon golem\n")]);

    let planned = plan_files(&registry, &test_config(), dir.path()).unwrap();
    assert!(planned.contains_key("server/pack.json"));
    assert!(!planned.contains_key("client/pack.json"));
  }

  #[test]
  fn empty_registry_plans_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let planned = plan_files(&Registry::default(), &test_config(), dir.path()).unwrap();
    assert!(planned.is_empty());
  }

  #[test]
  fn save_writes_deletes_and_reuses() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let target = root.join("dist");
    let config = test_config();
    let mut cache = OutputCache::new(&target);

    let registry = registry_with(&[func("a", "say a\n"), func("b", "say b\n")]);
    let stats = save(&registry, &config, root, &target, &mut cache, false).unwrap();
    assert_eq!(stats.files_written, 3);
    assert_eq!(stats.files_deleted, 0);
    assert!(target.join("server/mypack/functions/a.fn").is_file());
    assert!(root.join(".kiln/cache.json").is_file());

    // Second build drops `b`: only the pruning should touch disk.
    let registry = registry_with(&[func("a", "say a\n")]);
    let stats = save(&registry, &config, root, &target, &mut cache, false).unwrap();
    assert_eq!(stats.files_written, 0);
    assert_eq!(stats.files_deleted, 1);
    assert!(target.join("server/mypack/functions/a.fn").is_file());
    assert!(!target.join("server/mypack/functions/b.fn").exists());
  }

  #[test]
  fn rewriting_a_changed_file_never_deletes_it() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let target = root.join("dist");
    let config = test_config();
    let mut cache = OutputCache::new(&target);

    let registry = registry_with(&[func("a", "say one\n")]);
    save(&registry, &config, root, &target, &mut cache, false).unwrap();

    let registry = registry_with(&[func("a", "say two\n")]);
    let stats = save(&registry, &config, root, &target, &mut cache, false).unwrap();
    assert_eq!(stats.files_written, 1);
    assert_eq!(stats.files_deleted, 0);
    assert_eq!(
      fs::read_to_string(target.join("server/mypack/functions/a.fn")).unwrap(),
      "say two\n"
    );
  }

  #[test]
  fn deleting_the_last_file_prunes_empty_directories() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let target = root.join("dist");
    let config = test_config();
    let mut cache = OutputCache::new(&target);

    let registry = registry_with(&[func("deep/nest/only", "say hi\n")]);
    save(&registry, &config, root, &target, &mut cache, false).unwrap();
    assert!(target.join("server/mypack/functions/deep/nest").is_dir());

    save(&Registry::default(), &config, root, &target, &mut cache, false).unwrap();
    assert!(!target.join("server/mypack/functions/deep").exists());
  }

  #[test]
  fn dry_run_reports_without_touching_anything() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let target = root.join("dist");
    let config = test_config();
    let mut cache = OutputCache::new(&target);

    let registry = registry_with(&[func("a", "say a\n")]);
    let stats = save(&registry, &config, root, &target, &mut cache, true).unwrap();
    assert_eq!(stats.files_written, 2);
    assert!(!target.exists());
    assert!(!root.join(".kiln").exists());

    // The real cache was untouched, so a real save still writes everything.
    let stats = save(&registry, &config, root, &target, &mut cache, false).unwrap();
    assert_eq!(stats.files_written, 2);
  }
}
