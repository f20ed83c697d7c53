//! Transfer engine: move exactly one entity between stores, leaving the
//! system in a valid state on every exit path.
//!
//! Each attempt walks `Planned -> Copying -> Verifying -> Finalizing ->
//! Committed`; any failure short of `Committed` rolls back that entity's
//! staging artifacts and surfaces a per-entity outcome. A batch processes
//! its entities sequentially and independently; one failure never aborts
//! the rest.

mod atomic;
mod finalize;
mod io_copy;
mod stage;
mod verify;

pub use stage::CopyStats;

use std::fs;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::errors::ShelfMoveError;
use crate::inventory::Store;
use crate::model::{Model, Residency, Shape};
use crate::planner;
use crate::platform;
use crate::shutdown;

/// One relocation request, supplied by the external selection layer.
#[derive(Debug, Clone)]
pub struct MoveRequest {
    pub identity: String,
    pub dest: Store,
}

/// Ordered batch of requests.
#[derive(Debug, Clone, Default)]
pub struct MovePlan {
    pub requests: Vec<MoveRequest>,
}

/// Terminal outcome of one entity's attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Committed,
    RolledBack,
    Conflict,
    VerificationFailed,
    InsufficientSpace,
    PartialFinalization,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Committed => "committed",
            Outcome::RolledBack => "rolled_back",
            Outcome::Conflict => "conflict",
            Outcome::VerificationFailed => "verification_failed",
            Outcome::InsufficientSpace => "insufficient_space",
            Outcome::PartialFinalization => "partial_finalization",
        }
    }

    /// Outcomes other than Committed that still require operator follow-up.
    pub fn needs_followup(&self) -> bool {
        matches!(self, Outcome::PartialFinalization)
    }
}

/// Per-entity result reported to the caller.
#[derive(Debug, Clone)]
pub struct TransferResult {
    pub identity: String,
    pub outcome: Outcome,
    pub bytes_moved: u64,
    pub files_moved: u64,
    pub duration: Duration,
    /// Human-readable reason for every non-Committed outcome.
    pub error: Option<String>,
}

impl TransferResult {
    fn failed(identity: &str, err: ShelfMoveError, duration: Duration) -> Self {
        let outcome = match &err {
            ShelfMoveError::Conflict(_) => Outcome::Conflict,
            ShelfMoveError::InsufficientSpace { .. } => Outcome::InsufficientSpace,
            ShelfMoveError::VerificationFailed { .. } => Outcome::VerificationFailed,
            ShelfMoveError::PartialFinalization { .. } => Outcome::PartialFinalization,
            _ => Outcome::RolledBack,
        };
        TransferResult {
            identity: identity.to_string(),
            outcome,
            bytes_moved: 0,
            files_moved: 0,
            duration,
            error: Some(err.to_string()),
        }
    }
}

/// Relocate one entity from the primary store to the secondary store,
/// leaving a redirection link behind.
pub fn shelve(cfg: &Config, model: &Model) -> TransferResult {
    attempt(cfg, model, Store::Secondary)
}

/// Restore one entity from the secondary store to the primary store,
/// removing the redirection link. No link is created.
pub fn unshelve(cfg: &Config, model: &Model) -> TransferResult {
    attempt(cfg, model, Store::Primary)
}

fn attempt(cfg: &Config, model: &Model, dest: Store) -> TransferResult {
    let start = Instant::now();
    let identity = model.identity.as_str();
    debug!(identity, dest = dest.label(), "attempt planned");

    let run = match dest {
        Store::Secondary => shelve_attempt(cfg, model),
        Store::Primary => unshelve_attempt(cfg, model),
    };

    match run {
        Ok(stats) => {
            info!(
                identity,
                bytes = stats.bytes,
                files = stats.files,
                "attempt committed"
            );
            TransferResult {
                identity: identity.to_string(),
                outcome: Outcome::Committed,
                bytes_moved: stats.bytes,
                files_moved: stats.files,
                duration: start.elapsed(),
                error: None,
            }
        }
        Err(e) => {
            warn!(identity, code = e.code(), error = %e, "attempt failed");
            TransferResult::failed(identity, e, start.elapsed())
        }
    }
}

fn shelve_attempt(cfg: &Config, model: &Model) -> Result<CopyStats, ShelfMoveError> {
    let src = &model.primary_path;
    let dest = &model.secondary_path;

    // Planned: destination must be free and the source must be real content.
    if model.shape == Shape::Shelved || model.residency != Residency::Primary {
        return Err(ShelfMoveError::Conflict(dest.clone()));
    }
    if fs::symlink_metadata(dest).is_ok() {
        return Err(ShelfMoveError::Conflict(dest.clone()));
    }

    if cfg.dry_run {
        let bytes = model.resolve_size()?;
        info!(identity = %model.identity, bytes, "dry-run: would shelve");
        return Ok(CopyStats { bytes, files: 0 });
    }

    // Copying: into a hidden staging sibling of the destination.
    let staging = stage::staging_path(dest);
    debug!(identity = %model.identity, staging = %staging.display(), "copying");
    let stats = match stage::stage_copy(src, &staging, cfg.preserve_metadata) {
        Ok(s) => s,
        Err(e) => {
            stage::remove_staging(&staging);
            return Err(e);
        }
    };

    // Verifying: staged copy against the untouched source.
    debug!(identity = %model.identity, "verifying");
    if let Err(e) = verify::verify_staged(&model.identity, src, &staging, cfg.hash_verify_limit) {
        stage::remove_staging(&staging);
        return Err(e);
    }

    // Finalizing: rename, delete source, create link.
    finalize::finalize_shelve(&model.identity, &staging, dest, src)?;
    Ok(stats)
}

fn unshelve_attempt(cfg: &Config, model: &Model) -> Result<CopyStats, ShelfMoveError> {
    let src = &model.secondary_path;
    let dest = &model.primary_path;

    // Planned: the secondary copy must exist and the primary path may hold
    // nothing but the redirection link.
    if fs::symlink_metadata(src).is_err() {
        return Err(ShelfMoveError::NotFound(src.clone()));
    }
    match fs::symlink_metadata(dest) {
        Ok(meta) if !meta.file_type().is_symlink() => {
            return Err(ShelfMoveError::Conflict(dest.clone()));
        }
        _ => {}
    }

    if cfg.dry_run {
        let bytes = model.resolve_size()?;
        info!(identity = %model.identity, bytes, "dry-run: would restore");
        return Ok(CopyStats { bytes, files: 0 });
    }

    // Copying: stage next to the primary destination.
    let staging = stage::staging_path(dest);
    debug!(identity = %model.identity, staging = %staging.display(), "copying");
    let stats = match stage::stage_copy(src, &staging, cfg.preserve_metadata) {
        Ok(s) => s,
        Err(e) => {
            stage::remove_staging(&staging);
            return Err(e);
        }
    };

    // Verifying.
    debug!(identity = %model.identity, "verifying");
    if let Err(e) = verify::verify_staged(&model.identity, src, &staging, cfg.hash_verify_limit) {
        stage::remove_staging(&staging);
        return Err(e);
    }

    // Finalizing: unlink, rename, delete secondary copy.
    finalize::finalize_restore(&model.identity, &staging, dest, src)?;
    Ok(stats)
}

/// Execute a batch. Pre-flight rejections (unknown identity, occupied
/// destination, insufficient space) are decided before any bytes move;
/// accepted entities then run sequentially with per-entity outcomes.
pub fn run_plan(cfg: &Config, plan: &MovePlan) -> Vec<TransferResult> {
    let mut results = Vec::with_capacity(plan.requests.len());
    let mut jobs: Vec<(Model, Store, u64)> = Vec::new();

    // Pre-flight: resolve entities and reject conflicts up front.
    for req in &plan.requests {
        match Model::inspect(cfg, &req.identity) {
            Ok(model) => {
                let occupied = match req.dest {
                    Store::Secondary => {
                        model.shape == Shape::Shelved
                            || fs::symlink_metadata(&model.secondary_path).is_ok()
                    }
                    Store::Primary => matches!(
                        fs::symlink_metadata(&model.primary_path),
                        Ok(meta) if !meta.file_type().is_symlink()
                    ),
                };
                if occupied {
                    let dest = req.dest.root(cfg).join(&req.identity);
                    results.push(TransferResult::failed(
                        &req.identity,
                        ShelfMoveError::Conflict(dest),
                        Duration::ZERO,
                    ));
                    continue;
                }
                let bytes = match model.resolve_size() {
                    Ok(b) => b,
                    Err(e) => {
                        results.push(TransferResult::failed(&req.identity, e, Duration::ZERO));
                        continue;
                    }
                };
                jobs.push((model, req.dest, bytes));
            }
            Err(e) => {
                results.push(TransferResult::failed(&req.identity, e, Duration::ZERO));
            }
        }
    }

    // Pre-flight: whole-batch space check per destination store.
    for dest in [Store::Primary, Store::Secondary] {
        let required: u64 = jobs
            .iter()
            .filter(|(_, d, _)| *d == dest)
            .map(|(_, _, b)| b)
            .sum();
        if required == 0 {
            continue;
        }
        let root = dest.root(cfg);
        let available = match platform::free_space_bytes(root) {
            Ok(b) => b,
            Err(e) => {
                warn!(store = dest.label(), error = %e, "free-space query failed; skipping batch to this store");
                0
            }
        };
        let space = planner::plan(required, available, cfg.free_space_margin);
        if !space.feasible {
            let err = |identity: &str| {
                TransferResult::failed(
                    identity,
                    ShelfMoveError::InsufficientSpace {
                        required: space.required_bytes,
                        available: space.available_bytes,
                        margin: space.margin_bytes,
                        dest: root.to_path_buf(),
                    },
                    Duration::ZERO,
                )
            };
            for (model, _, _) in jobs.iter().filter(|(_, d, _)| *d == dest) {
                results.push(err(&model.identity));
            }
            jobs.retain(|(_, d, _)| *d != dest);
        }
    }

    // Execute: one entity fully processed before the next begins.
    for (model, dest, _) in jobs {
        if shutdown::is_requested() {
            results.push(TransferResult::failed(
                &model.identity,
                ShelfMoveError::Interrupted,
                Duration::ZERO,
            ));
            continue;
        }
        results.push(attempt(cfg, &model, dest));
    }

    results
}
