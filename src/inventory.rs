//! Inventory scanner: enumerate the entities visible under a store root.
//!
//! Only the immediate children of the root are walked, plus one grouping
//! level for `<publisher>/<name>` layouts; each leaf content unit becomes a
//! single identity. Entries with no usable content (empty directories,
//! redirection links without a target) are reported as anomalies, never as
//! entities. Results are sorted by identity so repeated scans of an
//! unchanged tree are structurally identical.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::errors::ShelfMoveError;
use crate::model::{has_model_payload, Model, Residency, Shape};

/// Which store root a scan walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Store {
    Primary,
    Secondary,
}

impl Store {
    pub fn root<'a>(&self, cfg: &'a Config) -> &'a Path {
        match self {
            Store::Primary => &cfg.primary_base,
            Store::Secondary => &cfg.secondary_base,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Store::Primary => "primary",
            Store::Secondary => "secondary",
        }
    }
}

/// A skipped entry, reported alongside the valid entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anomaly {
    pub identity: String,
    pub kind: AnomalyKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyKind {
    /// Directory with no regular-file content
    EmptyDirectory,
    /// Redirection link whose target is missing, empty, or itself a link
    BrokenLink,
}

/// Result of one store scan.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub models: Vec<Model>,
    pub anomalies: Vec<Anomaly>,
}

/// Scan a store root and classify every leaf entity found under it.
pub fn scan_store(cfg: &Config, store: Store) -> Result<ScanOutcome, ShelfMoveError> {
    let root = store.root(cfg);
    let mut outcome = ScanOutcome::default();

    for (identity, path) in leaf_entries(root)? {
        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.file_type().is_symlink() => {
                // Only links under the primary store are redirections we own.
                match Model::inspect(cfg, &identity) {
                    Ok(m) if store == Store::Primary && m.residency != Residency::Unknown => {
                        outcome.models.push(m)
                    }
                    _ => {
                        warn!(%identity, "skipping broken redirection link");
                        outcome.anomalies.push(Anomaly {
                            identity,
                            kind: AnomalyKind::BrokenLink,
                        });
                    }
                }
            }
            Ok(meta) if meta.is_dir() && !has_any_content(&path) => {
                debug!(%identity, "skipping empty directory");
                outcome.anomalies.push(Anomaly {
                    identity,
                    kind: AnomalyKind::EmptyDirectory,
                });
            }
            Ok(meta) => {
                if meta.is_dir() && !has_model_payload(&path) {
                    debug!(%identity, "directory holds no recognized model files");
                }
                match Model::inspect(cfg, &identity) {
                    Ok(m) => outcome.models.push(m),
                    Err(e) => warn!(%identity, error = %e, "skipping unreadable entry"),
                }
            }
            Err(e) => warn!(%identity, error = %e, "skipping unreadable entry"),
        }
    }

    outcome.models.sort_by(|a, b| a.identity.cmp(&b.identity));
    outcome.anomalies.sort_by(|a, b| a.identity.cmp(&b.identity));
    Ok(outcome)
}

/// Enumerate leaf entities: top-level files and links as-is, directories
/// containing subdirectories flattened one level into `<publisher>/<name>`.
pub(crate) fn leaf_entries(root: &Path) -> Result<Vec<(String, PathBuf)>, ShelfMoveError> {
    let mut leaves = Vec::new();

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let path = entry.path();
        let meta = fs::symlink_metadata(&path)?;

        if meta.is_dir() && !meta.file_type().is_symlink() {
            // A directory with files directly inside it is a content unit of
            // its own, however many subdirectories it also carries; only
            // pure directory-of-directories entries group as publishers.
            let subdirs = grouped_children(&path)?;
            if subdirs.is_empty() || has_direct_files(&path)? {
                leaves.push((name, path));
            } else {
                for (child_name, child_path) in subdirs {
                    leaves.push((format!("{name}/{child_name}"), child_path));
                }
            }
        } else {
            leaves.push((name, path));
        }
    }

    leaves.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(leaves)
}

/// Children of a publisher directory: subdirectories and links, skipping
/// hidden entries. Plain files inside a publisher directory do not group.
fn grouped_children(dir: &Path) -> Result<Vec<(String, PathBuf)>, ShelfMoveError> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let path = entry.path();
        let meta = fs::symlink_metadata(&path)?;
        if meta.is_dir() || meta.file_type().is_symlink() {
            out.push((name, path));
        }
    }
    Ok(out)
}

/// True when `dir` holds at least one regular file as an immediate child.
fn has_direct_files(dir: &Path) -> Result<bool, ShelfMoveError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        if entry.file_type()?.is_file() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Cheap emptiness probe: stops at the first regular file with content
/// instead of summing the whole tree.
fn has_any_content(dir: &Path) -> bool {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .any(|e| e.file_type().is_file() && e.metadata().map(|m| m.len() > 0).unwrap_or(false))
}

/// Convenience filters over a primary-store scan.
impl ScanOutcome {
    /// Entities resident on the primary store (candidates for shelving).
    pub fn resident(&self) -> impl Iterator<Item = &Model> {
        self.models
            .iter()
            .filter(|m| m.residency == Residency::Primary)
    }

    /// Entities already shelved (candidates for restore).
    pub fn shelved(&self) -> impl Iterator<Item = &Model> {
        self.models.iter().filter(|m| m.shape == Shape::Shelved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn cfg_for(td: &Path) -> Config {
        let primary = td.join("primary");
        let secondary = td.join("secondary");
        fs::create_dir_all(&primary).unwrap();
        fs::create_dir_all(&secondary).unwrap();
        Config::new(primary, secondary)
    }

    fn write_model_dir(base: &Path, rel: &str) {
        let dir = base.join(rel);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("weights.gguf"), b"0123").unwrap();
    }

    #[test]
    fn flattens_publisher_layout_into_identities() {
        let td = tempdir().unwrap();
        let cfg = cfg_for(td.path());
        write_model_dir(&cfg.primary_base, "lab-a/model-one");
        write_model_dir(&cfg.primary_base, "lab-a/model-two");
        fs::write(cfg.primary_base.join("standalone.gguf"), b"x").unwrap();

        let outcome = scan_store(&cfg, Store::Primary).unwrap();
        let ids: Vec<_> = outcome.models.iter().map(|m| m.identity.as_str()).collect();
        assert_eq!(ids, vec!["lab-a/model-one", "lab-a/model-two", "standalone.gguf"]);
        assert!(outcome.anomalies.is_empty());
    }

    #[test]
    fn dir_with_files_and_subdirs_is_one_identity() {
        let td = tempdir().unwrap();
        let cfg = cfg_for(td.path());
        let dir = cfg.primary_base.join("chunky");
        fs::create_dir_all(dir.join("shards")).unwrap();
        fs::write(dir.join("weights.gguf"), b"0123").unwrap();
        fs::write(dir.join("shards/part-0.gguf"), b"45").unwrap();

        let outcome = scan_store(&cfg, Store::Primary).unwrap();
        let ids: Vec<_> = outcome.models.iter().map(|m| m.identity.as_str()).collect();
        assert_eq!(ids, vec!["chunky"]);
        assert_eq!(outcome.models[0].resolve_size().unwrap(), 6);
    }

    #[test]
    fn empty_dirs_are_anomalies_not_models() {
        let td = tempdir().unwrap();
        let cfg = cfg_for(td.path());
        fs::create_dir_all(cfg.primary_base.join("hollow")).unwrap();
        write_model_dir(&cfg.primary_base, "full");

        let outcome = scan_store(&cfg, Store::Primary).unwrap();
        assert_eq!(outcome.models.len(), 1);
        assert_eq!(outcome.models[0].identity, "full");
        assert_eq!(
            outcome.anomalies,
            vec![Anomaly {
                identity: "hollow".into(),
                kind: AnomalyKind::EmptyDirectory
            }]
        );
    }

    #[cfg(unix)]
    #[test]
    fn broken_links_are_anomalies() {
        let td = tempdir().unwrap();
        let cfg = cfg_for(td.path());
        std::os::unix::fs::symlink(
            cfg.secondary_path("vanished"),
            cfg.primary_path("dangling"),
        )
        .unwrap();

        let outcome = scan_store(&cfg, Store::Primary).unwrap();
        assert!(outcome.models.is_empty());
        assert_eq!(outcome.anomalies[0].kind, AnomalyKind::BrokenLink);
    }

    #[test]
    fn hidden_entries_are_skipped() {
        let td = tempdir().unwrap();
        let cfg = cfg_for(td.path());
        fs::write(cfg.primary_base.join(".DS_Store"), b"junk").unwrap();
        fs::create_dir_all(cfg.primary_base.join(".shelf_move.1.2.partial")).unwrap();
        write_model_dir(&cfg.primary_base, "kept");

        let outcome = scan_store(&cfg, Store::Primary).unwrap();
        let ids: Vec<_> = outcome.models.iter().map(|m| m.identity.as_str()).collect();
        assert_eq!(ids, vec!["kept"]);
    }

    #[test]
    fn rescan_without_mutation_is_identical() {
        let td = tempdir().unwrap();
        let cfg = cfg_for(td.path());
        write_model_dir(&cfg.primary_base, "lab/alpha");
        write_model_dir(&cfg.primary_base, "beta");
        fs::create_dir_all(cfg.primary_base.join("empty")).unwrap();

        let a = scan_store(&cfg, Store::Primary).unwrap();
        let b = scan_store(&cfg, Store::Primary).unwrap();
        let ids_a: Vec<_> = a.models.iter().map(|m| m.identity.clone()).collect();
        let ids_b: Vec<_> = b.models.iter().map(|m| m.identity.clone()).collect();
        assert_eq!(ids_a, ids_b);
        assert_eq!(a.anomalies, b.anomalies);
    }

    #[test]
    fn secondary_scan_lists_shelved_content() {
        let td = tempdir().unwrap();
        let cfg = cfg_for(td.path());
        write_model_dir(&cfg.secondary_base, "lab/parked");

        let outcome = scan_store(&cfg, Store::Secondary).unwrap();
        assert_eq!(outcome.models.len(), 1);
        assert_eq!(outcome.models[0].identity, "lab/parked");
        assert_eq!(outcome.models[0].residency, Residency::Secondary);
    }
}
