//! Resource types for content packs.
//!
//! A resource is one named output artifact registered by a user module. Its
//! identity is a [`ResourceKind`] plus a namespaced [`ResourceLocation`]; the
//! identity alone determines where the artifact lands relative to the output
//! root.
//!
//! # Ordering
//!
//! Identities are `Ord` and stored in [`BTreeMap`]s throughout, so iteration
//! order, emitted file order, and serialization are deterministic.
//!
//! [`BTreeMap`]: std::collections::BTreeMap

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::consts::FUNCTION_EXT;

/// The kind of a registered resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
  /// A command script, emitted as `functions/<path>.fn`.
  Function,
  /// A value list grouping other resources, emitted as `tags/<path>.json`.
  Tag,
  /// A structured data entry, emitted as `data/<path>.json`.
  Data,
  /// An opaque client file, emitted as `assets/<path>` verbatim.
  Asset,
}

impl ResourceKind {
  /// The pack this kind of resource belongs to.
  pub fn target(self) -> PackTarget {
    match self {
      ResourceKind::Asset => PackTarget::Client,
      _ => PackTarget::Server,
    }
  }

  /// Category directory under the namespace directory.
  pub fn category_dir(self) -> &'static str {
    match self {
      ResourceKind::Function => "functions",
      ResourceKind::Tag => "tags",
      ResourceKind::Data => "data",
      ResourceKind::Asset => "assets",
    }
  }

  /// Lowercase label for messages.
  pub fn label(self) -> &'static str {
    match self {
      ResourceKind::Function => "function",
      ResourceKind::Tag => "tag",
      ResourceKind::Data => "data",
      ResourceKind::Asset => "asset",
    }
  }
}

/// Which physical pack a resource is emitted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackTarget {
  /// Server-side pack: functions, tags, data.
  Server,
  /// Client-side pack: assets.
  Client,
}

impl PackTarget {
  /// All targets, in emission order.
  pub const ALL: [PackTarget; 2] = [PackTarget::Server, PackTarget::Client];

  /// Directory of this pack under the output root.
  pub fn dir_name(self) -> &'static str {
    match self {
      PackTarget::Server => "server",
      PackTarget::Client => "client",
    }
  }
}

/// Errors produced while parsing a resource location.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
  /// The location string had no path part.
  #[error("resource location is empty")]
  Empty,

  /// The namespace contains characters outside `a-z 0-9 _ -`.
  #[error("invalid namespace '{0}': expected [a-z0-9_-]")]
  InvalidNamespace(String),

  /// The path contains an invalid or empty segment.
  #[error("invalid resource path '{0}': segments must match [a-z0-9_.-] and must not be empty or '..'")]
  InvalidPath(String),
}

/// Namespaced path of a resource, e.g. `mypack:mobs/golem`.
///
/// Written form is `namespace:path`; registrations without an explicit
/// namespace inherit the project namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceLocation {
  /// Owning namespace, `[a-z0-9_-]+`.
  pub namespace: String,
  /// Slash-separated path below the category directory.
  pub path: String,
}

impl ResourceLocation {
  /// Parse `raw` as `namespace:path` or a bare `path` under `default_namespace`.
  ///
  /// # Arguments
  /// * `raw` - The user-supplied location string
  /// * `default_namespace` - Namespace used when `raw` carries none
  pub fn parse(raw: &str, default_namespace: &str) -> Result<Self, LocationError> {
    let (namespace, path) = match raw.split_once(':') {
      Some((ns, rest)) => (ns, rest),
      None => (default_namespace, raw),
    };

    if path.is_empty() {
      return Err(LocationError::Empty);
    }
    if !valid_namespace(namespace) {
      return Err(LocationError::InvalidNamespace(namespace.to_string()));
    }
    for segment in path.split('/') {
      if segment.is_empty() || segment == ".." || !segment.bytes().all(is_path_byte) {
        return Err(LocationError::InvalidPath(path.to_string()));
      }
    }

    Ok(Self {
      namespace: namespace.to_string(),
      path: path.to_string(),
    })
  }
}

impl std::fmt::Display for ResourceLocation {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}:{}", self.namespace, self.path)
  }
}

/// Whether `namespace` is a legal project or resource namespace.
pub fn valid_namespace(namespace: &str) -> bool {
  !namespace.is_empty() && namespace.bytes().all(is_namespace_byte)
}

fn is_namespace_byte(b: u8) -> bool {
  b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-'
}

fn is_path_byte(b: u8) -> bool {
  is_namespace_byte(b) || b == b'.'
}

/// Unique identity of a resource within a project.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId {
  pub kind: ResourceKind,
  pub location: ResourceLocation,
}

impl ResourceId {
  pub fn new(kind: ResourceKind, location: ResourceLocation) -> Self {
    Self { kind, location }
  }

  /// Path of the emitted file relative to the output root, forward slashes.
  ///
  /// Functions get the `.fn` extension, tags and data entries `.json`, and
  /// assets keep whatever extension their path carries.
  pub fn rel_key(&self) -> String {
    let target = self.kind.target().dir_name();
    let ns = &self.location.namespace;
    let dir = self.kind.category_dir();
    let path = &self.location.path;
    match self.kind {
      ResourceKind::Function => format!("{target}/{ns}/{dir}/{path}.{FUNCTION_EXT}"),
      ResourceKind::Tag | ResourceKind::Data => format!("{target}/{ns}/{dir}/{path}.json"),
      ResourceKind::Asset => format!("{target}/{ns}/{dir}/{path}"),
    }
  }
}

impl std::fmt::Display for ResourceId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} {}", self.kind.label(), self.location)
  }
}

/// Payload of a registered resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResourceContent {
  /// Verbatim text, written as UTF-8.
  Text(String),
  /// Structured value, written as pretty-printed JSON.
  Json(serde_json::Value),
  /// Raw bytes, written verbatim.
  Binary(Vec<u8>),
}

impl ResourceContent {
  /// Serialize the payload into the bytes that land on disk.
  pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
    match self {
      ResourceContent::Text(text) => Ok(text.as_bytes().to_vec()),
      ResourceContent::Json(value) => {
        let mut bytes = serde_json::to_vec_pretty(value)?;
        bytes.push(b'\n');
        Ok(bytes)
      }
      ResourceContent::Binary(bytes) => Ok(bytes.clone()),
    }
  }
}

/// A registered resource: identity plus payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
  pub id: ResourceId,
  pub content: ResourceContent,
}

/// What to do when a registration collides with an existing identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
  /// Fail the registering module.
  Throw,
  /// Log a warning and take the new payload.
  Warn,
  /// Silently take the new payload.
  Replace,
  /// Silently keep the existing payload.
  Ignore,
}

impl ConflictPolicy {
  /// Parse the configuration spelling of a policy.
  pub fn parse(raw: &str) -> Option<Self> {
    match raw {
      "throw" => Some(ConflictPolicy::Throw),
      "warn" => Some(ConflictPolicy::Warn),
      "replace" => Some(ConflictPolicy::Replace),
      "ignore" => Some(ConflictPolicy::Ignore),
      _ => None,
    }
  }
}

/// Per-kind conflict policies with a fallback default.
#[derive(Debug, Clone)]
pub struct ConflictPolicies {
  default: ConflictPolicy,
  per_kind: BTreeMap<ResourceKind, ConflictPolicy>,
}

impl ConflictPolicies {
  pub fn new(default: ConflictPolicy) -> Self {
    Self {
      default,
      per_kind: BTreeMap::new(),
    }
  }

  /// Override the policy for one resource kind.
  pub fn set(&mut self, kind: ResourceKind, policy: ConflictPolicy) {
    self.per_kind.insert(kind, policy);
  }

  /// Effective policy for `kind`.
  pub fn for_kind(&self, kind: ResourceKind) -> ConflictPolicy {
    self.per_kind.get(&kind).copied().unwrap_or(self.default)
  }
}

impl Default for ConflictPolicies {
  fn default() -> Self {
    Self::new(ConflictPolicy::Throw)
  }
}

/// Counts of user-registered resources. Bootstrap outputs synthesized at
/// save time are never part of the registry and therefore never counted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCounts {
  /// Registered functions.
  pub functions: usize,
  /// Everything else: tags, data entries, assets.
  pub other: usize,
}

impl ResourceCounts {
  pub fn total(self) -> usize {
    self.functions + self.other
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  mod locations {
    use super::*;

    #[test]
    fn bare_path_inherits_default_namespace() {
      let loc = ResourceLocation::parse("mobs/golem", "mypack").unwrap();
      assert_eq!(loc.namespace, "mypack");
      assert_eq!(loc.path, "mobs/golem");
      assert_eq!(loc.to_string(), "mypack:mobs/golem");
    }

    #[test]
    fn explicit_namespace_wins() {
      let loc = ResourceLocation::parse("other:mobs/golem", "mypack").unwrap();
      assert_eq!(loc.namespace, "other");
    }

    #[test]
    fn rejects_empty_path() {
      assert_eq!(ResourceLocation::parse("", "ns"), Err(LocationError::Empty));
      assert_eq!(ResourceLocation::parse("ns:", "ns"), Err(LocationError::Empty));
    }

    #[test]
    fn rejects_bad_namespace() {
      assert!(matches!(
        ResourceLocation::parse("My Pack:x", "ns"),
        Err(LocationError::InvalidNamespace(_))
      ));
    }

    #[test]
    fn rejects_traversal_and_empty_segments() {
      assert!(matches!(
        ResourceLocation::parse("a/../b", "ns"),
        Err(LocationError::InvalidPath(_))
      ));
      assert!(matches!(
        ResourceLocation::parse("a//b", "ns"),
        Err(LocationError::InvalidPath(_))
      ));
      assert!(matches!(
        ResourceLocation::parse("a/B", "ns"),
        Err(LocationError::InvalidPath(_))
      ));
    }

    #[test]
    fn dots_allowed_inside_segments() {
      assert!(ResourceLocation::parse("textures/golem.png", "ns").is_ok());
    }
  }

  mod identities {
    use super::*;

    fn id(kind: ResourceKind, raw: &str) -> ResourceId {
      ResourceId::new(kind, ResourceLocation::parse(raw, "mypack").unwrap())
    }

    #[test]
    fn function_key_gets_fn_extension() {
      assert_eq!(
        id(ResourceKind::Function, "mobs/spawn").rel_key(),
        "server/mypack/functions/mobs/spawn.fn"
      );
    }

    #[test]
    fn tag_and_data_keys_get_json_extension() {
      assert_eq!(id(ResourceKind::Tag, "enemies").rel_key(), "server/mypack/tags/enemies.json");
      assert_eq!(id(ResourceKind::Data, "loot/golem").rel_key(), "server/mypack/data/loot/golem.json");
    }

    #[test]
    fn asset_key_is_client_side_and_verbatim() {
      assert_eq!(
        id(ResourceKind::Asset, "textures/golem.png").rel_key(),
        "client/mypack/assets/textures/golem.png"
      );
    }
  }

  mod policies {
    use super::*;

    #[test]
    fn per_kind_overrides_default() {
      let mut policies = ConflictPolicies::default();
      policies.set(ResourceKind::Tag, ConflictPolicy::Replace);
      assert_eq!(policies.for_kind(ResourceKind::Tag), ConflictPolicy::Replace);
      assert_eq!(policies.for_kind(ResourceKind::Function), ConflictPolicy::Throw);
    }

    #[test]
    fn parses_config_spellings() {
      assert_eq!(ConflictPolicy::parse("warn"), Some(ConflictPolicy::Warn));
      assert_eq!(ConflictPolicy::parse("panic"), None);
    }
  }

  #[test]
  fn json_content_is_pretty_with_trailing_newline() {
    let content = ResourceContent::Json(serde_json::json!({ "values": ["a"] }));
    let bytes = content.to_bytes().unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("\n  \"values\""));
    assert!(text.ends_with('\n'));
  }
}
