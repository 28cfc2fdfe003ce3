//! Lua runtime for project evaluation.
//!
//! This module provides the Lua execution environment user modules run in.
//! It manages the VM lifecycle, registers the `pack` global, and exposes the
//! load/invalidate primitives the execution engine drives.
//!
//! # Submodules
//!
//! - [`globals`] - The `pack` global table (`pack.func()`, `pack.tag()`, etc.)
//! - [`host`] - The Lua-backed [`crate::runner::ModuleHost`] implementation
//! - [`runtime`] - Low-level Lua VM management

pub mod globals;
pub mod host;
pub mod runtime;
