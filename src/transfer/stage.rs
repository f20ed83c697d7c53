//! Copying phase: duplicate an entity into a hidden staging location next to
//! its final destination. The staged tree only takes the final name during
//! finalization, so an interrupted copy leaves nothing the scanner or the
//! external application can see.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use walkdir::WalkDir;

use crate::errors::ShelfMoveError;
use crate::failpoint;
use crate::shutdown;

use super::io_copy;

/// Bytes and file count moved by one staging copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyStats {
    pub bytes: u64,
    pub files: u64,
}

/// Hidden unique sibling of the final destination used for staging.
pub(super) fn staging_path(final_dest: &Path) -> PathBuf {
    let pid = std::process::id();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let name = format!(".shelf_move.{pid}.{nanos}.partial");
    final_dest.with_file_name(name)
}

/// Copy `src` (file or directory tree) into `staging`, sequentially,
/// preserving relative structure. Polls the shutdown flag between files.
/// On any failure the caller removes the staging artifacts.
pub(super) fn stage_copy(
    src: &Path,
    staging: &Path,
    preserve_metadata: bool,
) -> Result<CopyStats, ShelfMoveError> {
    if let Some(parent) = staging.parent() {
        fs::create_dir_all(parent)?;
    }

    let meta = fs::symlink_metadata(src)?;
    let mut stats = CopyStats::default();

    if meta.is_file() {
        failpoint::hit("copy")?;
        stats.bytes = io_copy::copy_file(src, staging)?;
        stats.files = 1;
        if preserve_metadata {
            io_copy::preserve_metadata(src, staging);
        }
        return Ok(stats);
    }

    // Directory tree: create the directory skeleton first, then stream the
    // files one at a time.
    for entry in WalkDir::new(src)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_dir())
    {
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| std::io::Error::other("walked path outside source root"))?;
        fs::create_dir_all(staging.join(rel))?;
    }

    for entry in WalkDir::new(src)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        if shutdown::is_requested() {
            return Err(ShelfMoveError::Interrupted);
        }
        failpoint::hit("copy")?;

        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| std::io::Error::other("walked path outside source root"))?;
        let dst = staging.join(rel);
        stats.bytes += io_copy::copy_file(entry.path(), &dst)?;
        stats.files += 1;
        if preserve_metadata {
            io_copy::preserve_metadata(entry.path(), &dst);
        }
    }

    debug!(bytes = stats.bytes, files = stats.files, staging = %staging.display(), "staged copy complete");
    Ok(stats)
}

/// Remove staging artifacts, best-effort. Called on every rollback path.
pub(super) fn remove_staging(staging: &Path) {
    match fs::symlink_metadata(staging) {
        Ok(meta) if meta.is_dir() => {
            let _ = fs::remove_dir_all(staging);
        }
        Ok(_) => {
            let _ = fs::remove_file(staging);
        }
        Err(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn staging_path_is_hidden_sibling() {
        let dest = Path::new("/store/lab/model");
        let s = staging_path(dest);
        assert_eq!(s.parent(), dest.parent());
        let name = s.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".shelf_move."));
        assert!(name.ends_with(".partial"));
    }

    #[test]
    fn stage_copy_preserves_tree_structure() {
        let td = tempdir().unwrap();
        let src = td.path().join("src");
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::write(src.join("a.gguf"), b"aaaa").unwrap();
        fs::write(src.join("sub/b.gguf"), b"bb").unwrap();

        let staging = td.path().join(".stage.partial");
        let stats = stage_copy(&src, &staging, false).unwrap();
        assert_eq!(stats.files, 2);
        assert_eq!(stats.bytes, 6);
        assert_eq!(fs::read(staging.join("a.gguf")).unwrap(), b"aaaa");
        assert_eq!(fs::read(staging.join("sub/b.gguf")).unwrap(), b"bb");
    }

    #[test]
    fn remove_staging_handles_files_and_dirs() {
        let td = tempdir().unwrap();
        let f = td.path().join("f.partial");
        fs::write(&f, b"x").unwrap();
        remove_staging(&f);
        assert!(!f.exists());

        let d = td.path().join("d.partial");
        fs::create_dir_all(d.join("inner")).unwrap();
        remove_staging(&d);
        assert!(!d.exists());

        // Missing path is a no-op.
        remove_staging(&td.path().join("absent"));
    }
}
