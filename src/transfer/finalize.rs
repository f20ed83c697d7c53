//! Finalizing phase: the three ordered sub-steps that commit a verified
//! staged copy. True multi-step atomicity is not achievable across two
//! directory trees with ordinary filesystem primitives, so each sub-step is
//! explicit and each failure maps to a recoverable state:
//!
//! shelve:  rename staging -> secondary; delete primary source; link primary
//!          -> secondary. A link-creation failure after the source is gone is
//!          the one genuinely unsafe window and surfaces as
//!          `PartialFinalization`.
//! restore: unlink primary redirection; rename staging -> primary; delete
//!          secondary copy. A leftover secondary copy after the rename also
//!          surfaces as `PartialFinalization`.

use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::errors::ShelfMoveError;
use crate::failpoint;

use super::atomic::try_atomic_move;
use super::stage::remove_staging;

/// Create the redirection link at `link` pointing at the absolute `target`.
fn make_redirection_link(target: &Path, link: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)
    }
    #[cfg(windows)]
    {
        if target.is_dir() {
            std::os::windows::fs::symlink_dir(target, link)
        } else {
            std::os::windows::fs::symlink_file(target, link)
        }
    }
}

fn remove_path(path: &Path) -> std::io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Commit a shelve: staged copy takes the final secondary name, the primary
/// source is removed, and a redirection link replaces it.
pub(super) fn finalize_shelve(
    identity: &str,
    staging: &Path,
    secondary_dest: &Path,
    primary_src: &Path,
) -> Result<(), ShelfMoveError> {
    // 1) Staged copy takes its final name. Failure here rolls back cleanly:
    //    staging is deleted, both stores are unchanged.
    if let Err(e) = failpoint::hit("finalize-rename")
        .map_err(ShelfMoveError::from)
        .and_then(|()| try_atomic_move(staging, secondary_dest).map_err(io_from_anyhow))
    {
        remove_staging(staging);
        return Err(e);
    }

    // 2) Remove the primary source. Failure here still has the source intact,
    //    so deleting the freshly renamed destination restores the initial
    //    state exactly.
    if let Err(e) = failpoint::hit("finalize-delete")
        .map_err(ShelfMoveError::from)
        .and_then(|()| remove_path(primary_src).map_err(ShelfMoveError::from))
    {
        warn!(identity, error = %e, "source removal failed; rolling back destination copy");
        if let Err(cleanup) = remove_path(secondary_dest) {
            // Destination copy could not be removed either: two real copies
            // remain. This must not masquerade as a clean rollback.
            return Err(ShelfMoveError::PartialFinalization {
                identity: identity.to_string(),
                detail: format!(
                    "source removal failed ({e}) and destination copy at '{}' could not be rolled back ({cleanup})",
                    secondary_dest.display()
                ),
            });
        }
        return Err(e);
    }

    // 3) Leave the redirection link behind. The source is already gone, so a
    //    failure here is the named unsafe window: content is safe on the
    //    secondary store but the primary path shows nothing.
    if let Err(e) = failpoint::hit("finalize-link")
        .and_then(|()| make_redirection_link(secondary_dest, primary_src))
    {
        return Err(ShelfMoveError::PartialFinalization {
            identity: identity.to_string(),
            detail: format!(
                "content moved to '{}' but creating the redirection link failed: {e}; run a health check and re-link or restore manually",
                secondary_dest.display()
            ),
        });
    }

    info!(identity, dest = %secondary_dest.display(), "shelve finalized");
    Ok(())
}

/// Commit a restore: the redirection link is removed first, the staged copy
/// takes the primary name, then the secondary copy is deleted.
pub(super) fn finalize_restore(
    identity: &str,
    staging: &Path,
    primary_dest: &Path,
    secondary_src: &Path,
) -> Result<(), ShelfMoveError> {
    let had_link = fs::symlink_metadata(primary_dest)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false);

    // 1) Remove the redirection link (if one exists). Clean rollback: the
    //    staged copy is discarded and the link is still in place.
    if had_link {
        if let Err(e) = failpoint::hit("restore-unlink")
            .and_then(|()| fs::remove_file(primary_dest))
        {
            remove_staging(staging);
            return Err(e.into());
        }
    }

    // 2) Staged copy takes the primary name. If this fails the primary path
    //    is empty but the secondary copy is untouched (a valid external-only
    //    state); re-linking restores the pre-attempt view.
    if let Err(e) = failpoint::hit("restore-rename")
        .map_err(ShelfMoveError::from)
        .and_then(|()| try_atomic_move(staging, primary_dest).map_err(io_from_anyhow))
    {
        remove_staging(staging);
        if had_link {
            if let Err(relink) = make_redirection_link(secondary_src, primary_dest) {
                return Err(ShelfMoveError::PartialFinalization {
                    identity: identity.to_string(),
                    detail: format!(
                        "restore rename failed ({e}) and the redirection link could not be recreated ({relink}); content remains at '{}'",
                        secondary_src.display()
                    ),
                });
            }
        }
        return Err(e);
    }

    // 3) Drop the secondary copy. Failure leaves two real copies; surface it
    //    rather than pretending the restore settled cleanly.
    if let Err(e) = failpoint::hit("restore-delete")
        .map_err(ShelfMoveError::from)
        .and_then(|()| remove_path(secondary_src).map_err(ShelfMoveError::from))
    {
        return Err(ShelfMoveError::PartialFinalization {
            identity: identity.to_string(),
            detail: format!(
                "restored to primary but the secondary copy at '{}' could not be removed: {e}; delete it manually",
                secondary_src.display()
            ),
        });
    }

    info!(identity, dest = %primary_dest.display(), "restore finalized");
    Ok(())
}

fn io_from_anyhow(e: anyhow::Error) -> ShelfMoveError {
    match e.downcast::<std::io::Error>() {
        Ok(ioe) => ShelfMoveError::Io(ioe),
        Err(other) => ShelfMoveError::Io(std::io::Error::other(other.to_string())),
    }
}
