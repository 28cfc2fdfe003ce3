//! Resource model and registry for content packs.
//!
//! Executing a user module registers resources (functions, tags, data
//! entries, assets) into the shared [`Registry`] as a side effect of being
//! loaded. The registry is the single source of truth the build orchestrator
//! serializes into on-disk packs.
//!
//! # Submodules
//!
//! - [`registry`] - The shared registry and per-execution capture
//! - `types` - Resource identities, payloads, and conflict policies

pub mod registry;
mod types;

pub use registry::{Produced, Registry, RegistryError};
pub use types::*;
