//! Project-wide constants.

/// Build metadata directory under the project root.
pub const META_DIR: &str = ".kiln";

/// Persisted output cache, inside [`META_DIR`].
pub const CACHE_FILE: &str = "cache.json";

/// Project configuration file name.
pub const CONFIG_FILE: &str = "kiln.lua";

/// Default module tree.
pub const DEFAULT_SOURCE_DIR: &str = "src";

/// Default output root.
pub const DEFAULT_OUTPUT_DIR: &str = "dist";

/// Default static-resource tree.
pub const DEFAULT_RESOURCES_DIR: &str = "resources";

/// Default third-party Lua library roots.
pub const DEFAULT_LIB_DIRS: [&str; 1] = ["lib"];

/// Quiet window for coalescing bursts of file events, in milliseconds.
pub const DEBOUNCE_MS: u64 = 200;

/// Extension of emitted function files.
pub const FUNCTION_EXT: &str = "fn";

/// Reserved bootstrap function materializing registered objectives.
pub const INIT_FUNCTION: &str = "__init__";

/// Bootstrap descriptor emitted into each populated pack target.
pub const PACK_DESCRIPTOR: &str = "pack.json";

/// Descriptor format revision.
pub const PACK_FORMAT: u32 = 1;
