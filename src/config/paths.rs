//! Default path helpers and symlink checks.
//! Determines OS-appropriate config/log paths and detects symlinked ancestors
//! so file logging and template creation can refuse unsafe locations.

use anyhow::{anyhow, Result};
use dirs::{config_dir, data_dir};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// OS-appropriate default config path (`SHELF_MOVE_CONFIG` overrides).
pub fn default_config_path() -> Result<PathBuf> {
    if let Some(p) = std::env::var_os("SHELF_MOVE_CONFIG") {
        return Ok(PathBuf::from(p));
    }
    if let Some(mut base) = config_dir() {
        base.push("shelf_move");
        base.push("config.xml");
        return Ok(base);
    }
    std::env::var("HOME")
        .map(|h| {
            PathBuf::from(h)
                .join(".config")
                .join("shelf_move")
                .join("config.xml")
        })
        .map_err(|_| anyhow!("cannot determine a config directory (no HOME)"))
}

/// OS-appropriate default log file path (data dir).
pub fn default_log_path() -> Result<PathBuf> {
    if let Some(mut base) = data_dir() {
        base.push("shelf_move");
        base.push("shelf_move.log");
        return Ok(base);
    }
    std::env::var("HOME")
        .map(|h| {
            PathBuf::from(h)
                .join(".local")
                .join("share")
                .join("shelf_move")
                .join("shelf_move.log")
        })
        .map_err(|_| anyhow!("cannot determine a data directory (no HOME)"))
}

/// Return true if any existing ancestor of `path` is a symlink.
pub fn path_has_symlink_ancestor(path: &Path) -> io::Result<bool> {
    let mut p = path.parent();
    while let Some(anc) = p {
        if anc.exists() {
            let meta = fs::symlink_metadata(anc)?;
            if meta.file_type().is_symlink() {
                return Ok(true);
            }
        }
        p = anc.parent();
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn no_symlink_ancestor_for_plain_tree() {
        let td = tempdir().unwrap();
        let p = td.path().join("a").join("b").join("file.log");
        assert!(!path_has_symlink_ancestor(&p).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn detects_symlinked_ancestor() {
        let td = tempdir().unwrap();
        let real = td.path().join("real");
        fs::create_dir(&real).unwrap();
        let link = td.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();
        let p = link.join("file.log");
        assert!(path_has_symlink_ancestor(&p).unwrap());
    }
}
