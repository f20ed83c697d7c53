//! Verifying phase: check the staged copy against its source before anything
//! irreversible happens.
//!
//! File count and per-file sizes must always match exactly. Content hashes
//! are compared only when the total size is at or below the configured
//! threshold; above it, count+size equivalence is accepted to bound the cost
//! of verifying very large trees.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::errors::ShelfMoveError;

use super::io_copy;

/// Map of store-relative file path -> size for every regular file in a tree
/// (or the single entry for a file entity).
fn file_sizes(root: &Path) -> Result<BTreeMap<PathBuf, u64>, ShelfMoveError> {
    let mut out = BTreeMap::new();
    let meta = fs::symlink_metadata(root)?;
    if meta.is_file() {
        out.insert(PathBuf::new(), meta.len());
        return Ok(out);
    }
    for entry in WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| std::io::Error::other("walked path outside verify root"))?
            .to_path_buf();
        out.insert(rel, entry.metadata().map(|m| m.len()).unwrap_or(0));
    }
    Ok(out)
}

/// Compare the staged copy at `staged` against `src` for `identity`.
pub(super) fn verify_staged(
    identity: &str,
    src: &Path,
    staged: &Path,
    hash_limit: u64,
) -> Result<(), ShelfMoveError> {
    let fail = |reason: String| ShelfMoveError::VerificationFailed {
        identity: identity.to_string(),
        reason,
    };

    let src_files = file_sizes(src)?;
    let staged_files = file_sizes(staged)?;

    if src_files.len() != staged_files.len() {
        return Err(fail(format!(
            "file count mismatch: source has {}, staged copy has {}",
            src_files.len(),
            staged_files.len()
        )));
    }

    let mut total: u64 = 0;
    for (rel, src_len) in &src_files {
        match staged_files.get(rel) {
            Some(staged_len) if staged_len == src_len => total += src_len,
            Some(staged_len) => {
                return Err(fail(format!(
                    "size mismatch for '{}': source {} bytes, staged {} bytes",
                    rel.display(),
                    src_len,
                    staged_len
                )));
            }
            None => {
                return Err(fail(format!("'{}' missing from staged copy", rel.display())));
            }
        }
    }

    if total > hash_limit {
        debug!(identity, total, hash_limit, "count+size verification accepted (above hash threshold)");
        return Ok(());
    }

    for rel in src_files.keys() {
        let a = io_copy::hash_file(&join_rel(src, rel))?;
        let b = io_copy::hash_file(&join_rel(staged, rel))?;
        if a != b {
            return Err(fail(format!("content hash mismatch for '{}'", rel.display())));
        }
    }
    debug!(identity, total, "hash verification passed");
    Ok(())
}

fn join_rel(root: &Path, rel: &Path) -> PathBuf {
    if rel.as_os_str().is_empty() {
        root.to_path_buf()
    } else {
        root.join(rel)
    }
}
