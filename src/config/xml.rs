//! XML configuration support.
//! - Loads settings from config.xml (quick_xml).
//! - Creates a secure template if missing (unless SHELF_MOVE_CONFIG is set).
//! - Store roots may additionally be overridden via SHELF_MOVE_PRIMARY /
//!   SHELF_MOVE_SECONDARY; CLI flags outrank both.
//!
//! Notes:
//! - This module only reads/writes the config file; directory validation
//!   happens elsewhere.
//! - Unknown XML fields fail the load with a hard error to surface
//!   misconfigurations early.

use anyhow::{bail, Context, Result};
use quick_xml::de::from_str as from_xml_str;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::paths::{default_config_path, default_log_path, path_has_symlink_ancestor};
use super::types::{Config, LogLevel};
use super::{
    FREE_SPACE_MARGIN_DEFAULT, HASH_VERIFY_LIMIT_DEFAULT, PRIMARY_BASE_DEFAULT,
    SECONDARY_BASE_DEFAULT,
};
use crate::platform::{set_dir_mode_0700, set_file_mode_0600, write_config_secure_new_0600};

/// Struct mirroring the XML config for deserialization.
#[derive(Debug, Deserialize)]
#[serde(rename = "config")]
#[serde(deny_unknown_fields)]
struct XmlConfig {
    primary_base: Option<String>,
    secondary_base: Option<String>,
    log_level: Option<String>,
    log_file: Option<String>,
    preserve_metadata: Option<bool>,
    /// Free-space cushion on the destination store, in MiB
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    free_space_margin_mb: Option<u64>,
    /// Hash-verification size ceiling, in MiB
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    hash_verify_limit_mb: Option<u64>,
}

// Custom deserializer that trims surrounding whitespace for optional u64
fn de_u64_trimmed_opt<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| s.trim().parse::<u64>().ok()))
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|t| !t.is_empty())
}

fn xml_to_config(parsed: XmlConfig) -> Config {
    let mut cfg = Config::default();

    if let Some(s) = non_empty(parsed.primary_base.as_deref()) {
        cfg.primary_base = PathBuf::from(s);
    }
    if let Some(s) = non_empty(parsed.secondary_base.as_deref()) {
        cfg.secondary_base = PathBuf::from(s);
    }
    if let Some(s) = non_empty(parsed.log_level.as_deref()) {
        if let Some(level) = LogLevel::parse(s) {
            cfg.log_level = level;
        }
    }
    if let Some(s) = non_empty(parsed.log_file.as_deref()) {
        cfg.log_file = Some(PathBuf::from(s));
    }
    cfg.preserve_metadata = parsed.preserve_metadata.unwrap_or(false);
    if let Some(mb) = parsed.free_space_margin_mb {
        cfg.free_space_margin = mb * 1024 * 1024;
    }
    if let Some(mb) = parsed.hash_verify_limit_mb {
        cfg.hash_verify_limit = mb * 1024 * 1024;
    }
    cfg
}

/// Load a Config from a specific XML file path.
pub fn load_config_from_xml_path(path: &Path) -> Result<Config> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config xml '{}'", path.display()))?;
    let parsed: XmlConfig = match from_xml_str(&contents) {
        Ok(x) => x,
        Err(e) => {
            let msg = e.to_string();
            if msg.contains("unknown field") {
                bail!(
                    "Unknown field in shelf_move config {}: {}. Refusing to start.",
                    path.display(),
                    msg
                );
            }
            return Err(e).with_context(|| format!("parse config xml '{}'", path.display()));
        }
    };
    Ok(xml_to_config(parsed))
}

/// Read config from the resolved location (env override or default path).
/// Returns None when no file exists or it holds nothing useful; a template is
/// written on first run at the default location.
pub fn load_config_from_xml() -> Option<Config> {
    let env_set = env::var_os("SHELF_MOVE_CONFIG").is_some();
    let cfg_path = default_config_path().ok()?;

    if !cfg_path.exists() {
        if !env_set {
            let _ = create_template_config(&cfg_path);
        }
        return None;
    }

    match load_config_from_xml_path(&cfg_path) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            debug!("Failed to load config at {}: {e}", cfg_path.display());
            None
        }
    }
}

/// Apply SHELF_MOVE_PRIMARY / SHELF_MOVE_SECONDARY overrides to `cfg`.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Some(p) = env::var_os("SHELF_MOVE_PRIMARY") {
        debug!("primary_base overridden from environment");
        cfg.primary_base = PathBuf::from(p);
    }
    if let Some(p) = env::var_os("SHELF_MOVE_SECONDARY") {
        debug!("secondary_base overridden from environment");
        cfg.secondary_base = PathBuf::from(p);
    }
}

/// Create default template config file and parent directory.
/// Uses secure creation to avoid following attacker-controlled symlinks on Unix.
pub fn create_template_config(path: &Path) -> Result<()> {
    if path_has_symlink_ancestor(path)? {
        bail!(
            "Refusing to create config: ancestor of {} is a symlink",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
        let _ = set_dir_mode_0700(parent);
    }

    let suggested_log = default_log_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "/path/to/shelf_move.log".into());

    let content = format!(
        "<!--\n  shelf_move configuration (XML)\n\n  Fields:\n    primary_base           -> store the external application reads (real content or links)\n    secondary_base         -> store receiving shelved content (removable media)\n    log_level              -> quiet | normal | info | debug\n    log_file               -> path to log file (optional; stdout still used)\n    preserve_metadata      -> copy permissions + timestamps onto shelved files (true/false)\n    free_space_margin_mb   -> cushion kept free on the destination store\n    hash_verify_limit_mb   -> hash-verify trees at or below this size; count+size above\n\n  Notes:\n    - CLI flags override XML values.\n    - SHELF_MOVE_PRIMARY / SHELF_MOVE_SECONDARY override the store roots.\n-->\n<config>\n  <primary_base>{}</primary_base>\n  <secondary_base>{}</secondary_base>\n  <log_level>normal</log_level>\n  <log_file>{}</log_file>\n  <preserve_metadata>false</preserve_metadata>\n  <free_space_margin_mb>{}</free_space_margin_mb>\n  <hash_verify_limit_mb>{}</hash_verify_limit_mb>\n</config>\n",
        PRIMARY_BASE_DEFAULT,
        SECONDARY_BASE_DEFAULT,
        suggested_log,
        FREE_SPACE_MARGIN_DEFAULT / (1024 * 1024),
        HASH_VERIFY_LIMIT_DEFAULT / (1024 * 1024),
    );

    write_config_secure_new_0600(path, content.as_bytes())?;
    let _ = set_file_mode_0600(path);

    info!("Created template config at {}", path.display());
    Ok(())
}

/// Create default config if SHELF_MOVE_CONFIG not set; return created path so
/// the CLI can inform the user.
pub fn ensure_default_config_exists() -> Option<PathBuf> {
    if env::var_os("SHELF_MOVE_CONFIG").is_some() {
        return None;
    }
    let cfg_path = default_config_path().ok()?;
    if cfg_path.exists() {
        return None;
    }
    match create_template_config(&cfg_path) {
        Ok(()) => Some(cfg_path),
        Err(e) => {
            eprintln!(
                "Failed to create template config at {}: {}",
                cfg_path.display(),
                e
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_full_config() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.xml");
        fs::write(
            &p,
            "<config>\n  <primary_base>/p</primary_base>\n  <secondary_base>/s</secondary_base>\n  <log_level>debug</log_level>\n  <preserve_metadata>true</preserve_metadata>\n  <free_space_margin_mb>10</free_space_margin_mb>\n</config>\n",
        )
        .unwrap();
        let cfg = load_config_from_xml_path(&p).unwrap();
        assert_eq!(cfg.primary_base, PathBuf::from("/p"));
        assert_eq!(cfg.secondary_base, PathBuf::from("/s"));
        assert_eq!(cfg.log_level, LogLevel::Debug);
        assert!(cfg.preserve_metadata);
        assert_eq!(cfg.free_space_margin, 10 * 1024 * 1024);
        assert_eq!(cfg.hash_verify_limit, HASH_VERIFY_LIMIT_DEFAULT);
    }

    #[test]
    fn whitespace_and_empty_tags_fall_back() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.xml");
        fs::write(
            &p,
            "<config>\n  <primary_base>  /p  </primary_base>\n  <secondary_base></secondary_base>\n  <log_file> </log_file>\n</config>\n",
        )
        .unwrap();
        let cfg = load_config_from_xml_path(&p).unwrap();
        assert_eq!(cfg.primary_base, PathBuf::from("/p"));
        assert_eq!(cfg.secondary_base, PathBuf::from(SECONDARY_BASE_DEFAULT));
    }

    #[test]
    fn unknown_field_is_a_hard_error() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.xml");
        fs::write(&p, "<config><frobnicate>1</frobnicate></config>").unwrap();
        let err = load_config_from_xml_path(&p).unwrap_err();
        assert!(format!("{err}").contains("Unknown field"));
    }
}
