//! Config module (modularized).
//! Provides configuration types, default paths, XML loading, and validation.

pub mod paths;
pub mod types;
mod validate;
pub mod xml;

pub use paths::{default_config_path, default_log_path, path_has_symlink_ancestor};
pub use types::{Config, LogLevel};
pub use xml::{create_template_config, ensure_default_config_exists, load_config_from_xml};

/// Defaults shared across submodules.
pub const PRIMARY_BASE_DEFAULT: &str = "/srv/models";
pub const SECONDARY_BASE_DEFAULT: &str = "/media/shelf/models";

/// Free-space cushion kept on the destination store beyond the bytes moved.
pub const FREE_SPACE_MARGIN_DEFAULT: u64 = 100 * 1024 * 1024;

/// Trees at or below this total size are verified by per-file hashing;
/// larger trees fall back to count+size equivalence.
pub const HASH_VERIFY_LIMIT_DEFAULT: u64 = 1024 * 1024 * 1024;
