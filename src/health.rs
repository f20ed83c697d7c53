//! Redirection health monitor.
//!
//! Audits every redirection link under the primary store and classifies it:
//! `Healthy` (target holds content at the mirrored secondary identity),
//! `Broken` (target missing, empty, or itself a link), or `Orphaned` (target
//! holds content somewhere this tool never shelves to; informational only).
//! Repair removes broken links and nothing else; it never deletes real
//! content and never invents a replacement target.

use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::errors::ShelfMoveError;
use crate::inventory::leaf_entries;
use crate::model::{path_content_size, read_link_once};

/// Audit result over the whole primary store, identities sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub healthy: Vec<String>,
    pub broken: Vec<String>,
    pub orphaned: Vec<String>,
}

impl HealthReport {
    pub fn is_clean(&self) -> bool {
        self.broken.is_empty()
    }

    pub fn link_count(&self) -> usize {
        self.healthy.len() + self.broken.len() + self.orphaned.len()
    }
}

/// Per-link repair outcome; failures are reported, never silently skipped.
#[derive(Debug, Clone)]
pub struct RepairResult {
    pub identity: String,
    pub removed: bool,
    pub error: Option<String>,
}

/// Inspect all redirection links under the primary store.
pub fn check_health(cfg: &Config) -> Result<HealthReport, ShelfMoveError> {
    let mut report = HealthReport::default();

    for (identity, path) in leaf_entries(&cfg.primary_base)? {
        let meta = match fs::symlink_metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                warn!(%identity, error = %e, "entry disappeared during health check");
                continue;
            }
        };
        if !meta.file_type().is_symlink() {
            continue;
        }

        match classify_link(cfg, &identity, &path) {
            LinkState::Healthy => report.healthy.push(identity),
            LinkState::Broken => report.broken.push(identity),
            LinkState::Orphaned => report.orphaned.push(identity),
        }
    }

    report.healthy.sort();
    report.broken.sort();
    report.orphaned.sort();
    debug!(
        healthy = report.healthy.len(),
        broken = report.broken.len(),
        orphaned = report.orphaned.len(),
        "health check complete"
    );
    Ok(report)
}

enum LinkState {
    Healthy,
    Broken,
    Orphaned,
}

fn classify_link(cfg: &Config, identity: &str, link: &Path) -> LinkState {
    // One-level resolution only: a chain or missing target is broken.
    let target = match read_link_once(link) {
        Ok(t) => t,
        Err(e) => {
            debug!(%identity, error = %e, "link does not resolve");
            return LinkState::Broken;
        }
    };

    let has_content = path_content_size(&target).map(|n| n > 0).unwrap_or(false);
    if !has_content {
        return LinkState::Broken;
    }

    let expected = cfg.secondary_path(identity);
    if target == expected || target.starts_with(&cfg.secondary_base) {
        LinkState::Healthy
    } else {
        LinkState::Orphaned
    }
}

/// Remove the given broken links. Only the link artifact is deleted; the
/// target, whatever its state, is left alone. Iteration continues past
/// individual failures.
pub fn repair(cfg: &Config, identities: &[String]) -> Vec<RepairResult> {
    let mut results = Vec::with_capacity(identities.len());

    for identity in identities {
        let link = cfg.primary_path(identity);
        let is_link = fs::symlink_metadata(&link)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if !is_link {
            results.push(RepairResult {
                identity: identity.clone(),
                removed: false,
                error: Some("not a redirection link; refusing to touch".into()),
            });
            continue;
        }

        match fs::remove_file(&link) {
            Ok(()) => {
                info!(%identity, "removed broken redirection link");
                results.push(RepairResult {
                    identity: identity.clone(),
                    removed: true,
                    error: None,
                });
            }
            Err(e) => {
                warn!(%identity, error = %e, "failed to remove redirection link");
                results.push(RepairResult {
                    identity: identity.clone(),
                    removed: false,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    results
}
