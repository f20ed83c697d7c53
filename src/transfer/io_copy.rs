//! Streaming single-file copy with durability.
//!
//! - Writes to a newly created destination file (create_new; never clobbers).
//! - Buffered I/O with large (1 MiB) buffers to reduce syscall count.
//! - Fsyncs the destination before returning so a later rename is the only
//!   volatile step.
//!
//! Snapshot semantics: the source is read once from start to EOF; concurrent
//! growth is not included and shrinks surface as early EOF, which the verify
//! phase catches.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use filetime::{set_file_times, FileTime};

const BUF_SIZE: usize = 1024 * 1024;

/// Copy `src` -> `dst`, returning the number of bytes written.
pub(super) fn copy_file(src: &Path, dst: &Path) -> io::Result<u64> {
    let src_f = File::open(src)?;
    let dst_f = OpenOptions::new().write(true).create_new(true).open(dst)?;

    let mut reader = BufReader::with_capacity(BUF_SIZE, src_f);
    let mut writer = BufWriter::with_capacity(BUF_SIZE, dst_f);
    let bytes = io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(bytes)
}

/// Copy permissions (Unix mode bits) and timestamps from `src` onto `dst`.
/// Best-effort: refusal to set times/modes never fails the transfer.
pub(super) fn preserve_metadata(src: &Path, dst: &Path) {
    let Ok(meta) = std::fs::metadata(src) else {
        return;
    };

    let at = meta.accessed().ok().map(FileTime::from_system_time);
    let mt = meta.modified().ok().map(FileTime::from_system_time);
    if let (Some(at), Some(mt)) = (at, mt) {
        let _ = set_file_times(dst, at, mt);
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = meta.permissions().mode() & 0o777;
        if let Ok(dst_meta) = std::fs::metadata(dst) {
            let mut perms = dst_meta.permissions();
            perms.set_mode(mode);
            let _ = std::fs::set_permissions(dst, perms);
        }
    }
}

/// SHA-256 of a file's contents, streamed with the same buffer size as the
/// copy path.
pub(super) fn hash_file(path: &Path) -> io::Result<[u8; 32]> {
    use sha2::{Digest, Sha256};

    let mut reader = BufReader::with_capacity(BUF_SIZE, File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().into())
}
