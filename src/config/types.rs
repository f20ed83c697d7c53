//! Core configuration types.
//! - Config holds runtime settings with sensible defaults.
//! - LogLevel represents verbosity with simple parsing helpers.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::{
    FREE_SPACE_MARGIN_DEFAULT, HASH_VERIFY_LIMIT_DEFAULT, PRIMARY_BASE_DEFAULT,
    SECONDARY_BASE_DEFAULT,
};
use super::paths;

/// Program-defined verbosity levels exposed to users/config.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Only errors
    Quiet,
    /// Informational output (default)
    #[default]
    Normal,
    /// More info (like verbose)
    Info,
    /// Debug/trace
    Debug,
}

impl LogLevel {
    /// Parse common string names into our LogLevel (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "quiet" | "error" | "none" => Some(LogLevel::Quiet),
            "normal" => Some(LogLevel::Normal),
            "info" | "verbose" | "detailed" => Some(LogLevel::Info),
            "debug" | "trace" => Some(LogLevel::Debug),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Quiet => "quiet",
            LogLevel::Normal => "normal",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        f.write_str(s)
    }
}

impl FromStr for LogLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid log level: '{s}'"))
    }
}

/// Runtime configuration used by the mover.
#[derive(Debug, Clone)]
pub struct Config {
    /// Store consumed by the external application (real content or links)
    pub primary_base: PathBuf,
    /// Store receiving shelved content (removable media)
    pub secondary_base: PathBuf,
    /// Console verbosity
    pub log_level: LogLevel,
    /// Optional path to a log file
    pub log_file: Option<PathBuf>,
    /// If true, print actions but do not modify the filesystem
    pub dry_run: bool,
    /// If true, preserve permissions and timestamps on copied files
    pub preserve_metadata: bool,
    /// Free-space cushion required on the destination beyond the bytes moved
    pub free_space_margin: u64,
    /// Hash-verify trees at or below this total size; count+size above it
    pub hash_verify_limit: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            primary_base: PathBuf::from(PRIMARY_BASE_DEFAULT),
            secondary_base: PathBuf::from(SECONDARY_BASE_DEFAULT),
            log_level: LogLevel::Normal,
            log_file: paths::default_log_path().ok(),
            dry_run: false,
            preserve_metadata: false,
            free_space_margin: FREE_SPACE_MARGIN_DEFAULT,
            hash_verify_limit: HASH_VERIFY_LIMIT_DEFAULT,
        }
    }
}

impl Config {
    /// Construct a Config with explicit store roots; other fields use defaults.
    pub fn new(primary_base: impl Into<PathBuf>, secondary_base: impl Into<PathBuf>) -> Self {
        Self {
            primary_base: primary_base.into(),
            secondary_base: secondary_base.into(),
            ..Default::default()
        }
    }

    /// Canonicalize both store roots. Redirection links carry absolute
    /// targets, so relative roots must be resolved before any transfer.
    /// Best-effort: roots that cannot be resolved are left as-is (validate
    /// reports those).
    pub fn normalize(&mut self) {
        if let Ok(p) = std::fs::canonicalize(&self.primary_base) {
            self.primary_base = p;
        }
        if let Ok(p) = std::fs::canonicalize(&self.secondary_base) {
            self.secondary_base = p;
        }
    }

    /// Mirrored path of `identity` under the primary store.
    pub fn primary_path(&self, identity: &str) -> PathBuf {
        self.primary_base.join(identity)
    }

    /// Mirrored path of `identity` under the secondary store.
    pub fn secondary_path(&self, identity: &str) -> PathBuf {
        self.secondary_base.join(identity)
    }
}
