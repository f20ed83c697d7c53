//! Config validation logic.
//! Verifies store existence, readability/writability, disjoint roots, and
//! warns when the secondary root looks like a plain directory rather than
//! mounted media.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::platform::is_distinct_mount;

use super::types::Config;

impl Config {
    /// Validate existence, readability/writability and canonical paths.
    pub fn validate(&self) -> Result<()> {
        let pb = &self.primary_base;
        let sb = &self.secondary_base;

        // 1) Primary store: must exist, be a directory, and be readable.
        ensure_dir_exists_and_is_dir(pb, "primary_base")?;
        ensure_readable(pb, "primary_base")?;

        // 2) Secondary store: must be a directory; create if missing; writable.
        ensure_dir_is_or_create(sb, "secondary_base")?;
        ensure_writable(sb, "secondary_base")?;

        // 3) Resolve symlinks and ensure the roots are disjoint.
        let pb_real = fs::canonicalize(pb).unwrap_or_else(|_| pb.clone());
        let sb_real = fs::canonicalize(sb).unwrap_or_else(|_| sb.clone());

        if pb_real == sb_real {
            bail!(
                "primary_base and secondary_base resolve to the same path: '{}'",
                pb_real.display()
            );
        }
        if pb_real.starts_with(&sb_real) {
            bail!(
                "primary_base '{}' must not be inside secondary_base '{}'",
                pb_real.display(),
                sb_real.display()
            );
        }
        if sb_real.starts_with(&pb_real) {
            bail!(
                "secondary_base '{}' must not be inside primary_base '{}'",
                sb_real.display(),
                pb_real.display()
            );
        }

        // 4) Removable-media sanity: a secondary root on the same device as its
        // parent is usually an unmounted mount point. Warn, don't fail; tests
        // and unusual layouts legitimately use plain directories.
        match is_distinct_mount(sb) {
            Ok(false) => warn!(
                "secondary_base '{}' is not a mount point; shelving onto the same device as its parent",
                sb.display()
            ),
            Ok(true) => debug!("secondary_base is a distinct mount: {}", sb.display()),
            Err(e) => debug!("could not check mount status of {}: {e}", sb.display()),
        }

        info!(
            "Config validated: primary='{}' secondary='{}' log_file='{}'",
            pb.display(),
            sb.display(),
            self.log_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<none>".into())
        );
        Ok(())
    }
}

/// Ensure path exists and is a directory; emit clear errors with path context.
fn ensure_dir_exists_and_is_dir(path: &Path, name: &str) -> Result<()> {
    if !path.exists() {
        bail!("{name} does not exist: {}", path.display());
    }
    if !path.is_dir() {
        bail!("{name} is not a directory: {}", path.display());
    }
    Ok(())
}

/// Ensure directory is readable by attempting to open its entries.
fn ensure_readable(path: &Path, name: &str) -> Result<()> {
    fs::read_dir(path).with_context(|| {
        format!(
            "Cannot read {name} directory '{}'; check permissions",
            path.display()
        )
    })?;
    debug!("{name} readable: {}", path.display());
    Ok(())
}

/// Ensure directory exists (create if missing). If exists, it must be a directory.
fn ensure_dir_is_or_create(path: &Path, name: &str) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            bail!("{name} exists but isn't a directory: {}", path.display());
        }
    } else {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create {name} directory '{}'", path.display()))?;
        info!("Created {name} directory: {}", path.display());
    }
    Ok(())
}

/// Ensure directory is writable using a non-destructive probe file.
fn ensure_writable(path: &Path, name: &str) -> Result<()> {
    let probe = path.join(format!(".shelf_move_probe_{}.tmp", std::process::id()));
    match fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&probe)
    {
        Ok(_) => {
            let _ = fs::remove_file(&probe);
            debug!("{name} writable: {}", path.display());
            Ok(())
        }
        Err(e) => Err(e).with_context(|| {
            format!(
                "Cannot write to {name} '{}'; check permissions",
                path.display()
            )
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn validate_creates_missing_secondary() {
        let td = tempdir().unwrap();
        let primary = td.path().join("primary");
        fs::create_dir(&primary).unwrap();
        let secondary = td.path().join("secondary");
        let cfg = Config::new(&primary, &secondary);
        cfg.validate().unwrap();
        assert!(secondary.is_dir());
    }

    #[test]
    fn validate_rejects_missing_primary() {
        let td = tempdir().unwrap();
        let cfg = Config::new(td.path().join("nope"), td.path().join("secondary"));
        let err = cfg.validate().unwrap_err();
        assert!(format!("{err}").contains("primary_base does not exist"));
    }

    #[test]
    fn validate_rejects_nested_roots() {
        let td = tempdir().unwrap();
        let primary = td.path().join("primary");
        let secondary = primary.join("inner");
        fs::create_dir_all(&secondary).unwrap();
        let cfg = Config::new(&primary, &secondary);
        let err = cfg.validate().unwrap_err();
        assert!(format!("{err}").contains("must not be inside"));
    }

    #[test]
    fn validate_rejects_same_root() {
        let td = tempdir().unwrap();
        let base = td.path().join("store");
        fs::create_dir(&base).unwrap();
        let cfg = Config::new(&base, &base);
        let err = cfg.validate().unwrap_err();
        assert!(format!("{err}").contains("same path"));
    }
}
