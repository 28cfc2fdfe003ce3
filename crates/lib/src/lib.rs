//! kiln-lib: Core types and logic for Kiln
//!
//! This crate provides the building blocks of the content-pack compiler:
//! - `pack`: the resource model and the shared registry modules write into
//! - `graph`: the module dependency graph driving incremental rebuilds
//! - `cache`: content-addressed output cache with stale-file pruning
//! - `runner`: invalidate-then-execute passes over affected modules
//! - `build`: the orchestrator turning registered resources into packs on disk
//! - `watch`: filesystem watch loop with debounced single-flight rebuilds

pub mod build;
pub mod cache;
pub mod config;
pub mod consts;
pub mod graph;
pub mod lua;
pub mod pack;
pub mod runner;
pub mod util;
pub mod watch;
