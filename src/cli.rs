//! CLI definition and parsing.
//! Defines Args and provides parse() for command-line handling.
//!
//! Notes:
//! - Without a mode flag the tool lists both stores and shelves the
//!   `--select`-ed entities.
//! - --debug is a shorthand for --log-level debug.

use clap::{Parser, ValueHint};
use std::path::PathBuf;

use crate::config::{Config, LogLevel};

/// CLI wrapper for the shelf_move library.
/// CLI flags override config values (which are loaded from XML if present).
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Shelve model directories onto removable storage, leaving symlinks behind"
)]
pub struct Args {
    /// Entities to operate on: `all`, or a comma-separated list of
    /// identities (e.g. `lab/model-one,standalone.gguf`).
    #[arg(long, value_name = "SELECTION", help = "Entities to move: 'all' or id,id,...")]
    pub select: Option<String>,

    /// Move the selection from the secondary store back to the primary store.
    #[arg(long, help = "Restore the selection from the secondary store")]
    pub restore: bool,

    /// Only list entities on both stores; move nothing.
    #[arg(long, help = "List entities and exit")]
    pub list_only: bool,

    /// List what is stored on the secondary store and exit.
    #[arg(long, help = "List secondary-store contents and exit")]
    pub show_secondary: bool,

    /// Audit redirection links and exit.
    #[arg(long, help = "Check redirection link health and exit")]
    pub check_health: bool,

    /// Remove broken redirection links found by the health check, then exit.
    #[arg(long, help = "Remove broken redirection links and exit")]
    pub repair: bool,

    /// Override the primary store root (normally configured via XML).
    #[arg(long, value_hint = ValueHint::DirPath, help = "Override the primary store root")]
    pub primary_base: Option<PathBuf>,

    /// Override the secondary store root (normally configured via XML).
    #[arg(long, value_hint = ValueHint::DirPath, help = "Override the secondary store root")]
    pub secondary_base: Option<PathBuf>,

    /// Enable debug logging (equivalent to `--log-level debug`).
    #[arg(
        short = 'd',
        long,
        help = "Enable debug logging (shorthand for --log-level debug)"
    )]
    pub debug: bool,

    /// Set log level. One of: quiet, normal, info, debug.
    #[arg(long, help = "Set log level: quiet, normal, info, debug")]
    pub log_level: Option<String>,

    /// Print where shelf_move will look for the config file, then exit.
    #[arg(long, help = "Print the config file location used by shelf_move and exit")]
    pub print_config: bool,

    /// Dry-run: log actions but do not modify the filesystem.
    #[arg(long, help = "Show what would be done, but do not modify files/directories")]
    pub dry_run: bool,

    /// Preserve permissions and timestamps on copied files. Off by default.
    #[arg(long, help = "Preserve permissions and timestamps on copied files; slower")]
    pub preserve_metadata: bool,

    /// Emit logs in structured JSON (includes timestamp, level, and fields).
    #[arg(long, help = "Emit logs in structured JSON")]
    pub json: bool,
}

impl Args {
    /// Effective log level derived from flags.
    /// Precedence: --debug > --log-level value > None (use config default).
    pub fn effective_log_level(&self) -> Option<LogLevel> {
        if self.debug {
            return Some(LogLevel::Debug);
        }
        self.log_level.as_deref().and_then(LogLevel::parse)
    }

    /// Apply CLI overrides to a loaded Config (in-place). No-ops for unset flags.
    pub fn apply_overrides(&self, cfg: &mut Config) {
        if let Some(pb) = &self.primary_base {
            cfg.primary_base = pb.clone();
        }
        if let Some(sb) = &self.secondary_base {
            cfg.secondary_base = sb.clone();
        }
        if let Some(level) = self.effective_log_level() {
            cfg.log_level = level;
        }
        if self.dry_run {
            cfg.dry_run = true;
        }
        if self.preserve_metadata {
            cfg.preserve_metadata = true;
        }
    }

    /// Parse `--select` into identities; None means nothing selected.
    pub fn selection(&self) -> Option<Selection> {
        let raw = self.select.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        if raw.eq_ignore_ascii_case("all") {
            return Some(Selection::All);
        }
        let ids: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if ids.is_empty() {
            None
        } else {
            Some(Selection::Identities(ids))
        }
    }
}

/// What the operator picked on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Identities(Vec<String>),
}

pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_with_select(sel: Option<&str>) -> Args {
        let mut argv = vec!["shelf_move"];
        let owned;
        if let Some(s) = sel {
            owned = format!("--select={s}");
            argv.push(&owned);
        }
        Args::parse_from(argv)
    }

    #[test]
    fn selection_all_is_case_insensitive() {
        assert_eq!(args_with_select(Some("ALL")).selection(), Some(Selection::All));
    }

    #[test]
    fn selection_splits_and_trims() {
        let sel = args_with_select(Some(" a , lab/b ,")).selection();
        assert_eq!(
            sel,
            Some(Selection::Identities(vec!["a".into(), "lab/b".into()]))
        );
    }

    #[test]
    fn empty_selection_is_none() {
        assert_eq!(args_with_select(None).selection(), None);
        assert_eq!(args_with_select(Some("  ")).selection(), None);
    }

    #[test]
    fn debug_flag_wins_over_log_level() {
        let args = Args::parse_from(["shelf_move", "--debug", "--log-level", "quiet"]);
        assert_eq!(args.effective_log_level(), Some(LogLevel::Debug));
    }
}
