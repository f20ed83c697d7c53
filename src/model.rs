//! Entity model: one relocatable content unit (a model file or directory)
//! tracked by identity, with its storage state derived entirely from the
//! filesystem at inspection time. Nothing here mutates storage.

use std::cell::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::errors::ShelfMoveError;

/// File extensions that mark a directory as holding nested model payload.
pub const MODEL_EXTENSIONS: &[&str] = &["gguf", "safetensors", "mlx"];

/// Content shape of an entity at its primary-store path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// A standalone model file
    SingleFile,
    /// A directory tree of model files
    ContentDir,
    /// The primary path is a redirection link into the secondary store
    Shelved,
}

impl Shape {
    pub fn label(&self) -> &'static str {
        match self {
            Shape::SingleFile => "file",
            Shape::ContentDir => "dir",
            Shape::Shelved => "shelved",
        }
    }
}

/// Which store currently holds the real bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residency {
    Primary,
    Secondary,
    /// Redirection link present but its target is missing or unusable
    Unknown,
}

/// One relocatable unit. Rebuilt fresh on every scan; never cached across
/// engine operations.
#[derive(Debug, Clone)]
pub struct Model {
    /// Store-relative name, `<name>` or `<publisher>/<name>`
    pub identity: String,
    pub shape: Shape,
    pub residency: Residency,
    pub primary_path: PathBuf,
    pub secondary_path: PathBuf,
    size: OnceCell<u64>,
}

impl Model {
    /// Build a Model for `identity` by inspecting both store paths.
    /// Fails with `NotFound` when neither path exists.
    pub fn inspect(cfg: &Config, identity: &str) -> Result<Self, ShelfMoveError> {
        let primary_path = cfg.primary_path(identity);
        let secondary_path = cfg.secondary_path(identity);

        let (shape, residency) = match fs::symlink_metadata(&primary_path) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let residency = match read_link_once(&primary_path) {
                    Ok(target) if path_content_size(&target).unwrap_or(0) > 0 => {
                        Residency::Secondary
                    }
                    _ => Residency::Unknown,
                };
                (Shape::Shelved, residency)
            }
            Ok(meta) if meta.is_file() => (Shape::SingleFile, Residency::Primary),
            Ok(_) => (Shape::ContentDir, Residency::Primary),
            Err(_) => {
                // Primary absent: the entity may live only on the secondary
                // store (valid settled state).
                let meta = fs::symlink_metadata(&secondary_path)
                    .map_err(|_| ShelfMoveError::NotFound(primary_path.clone()))?;
                let shape = if meta.is_file() {
                    Shape::SingleFile
                } else {
                    Shape::ContentDir
                };
                (shape, Residency::Secondary)
            }
        };

        Ok(Model {
            identity: identity.to_string(),
            shape,
            residency,
            primary_path,
            secondary_path,
            size: OnceCell::new(),
        })
    }

    /// Total content size in bytes, computed on first use and cached.
    /// For a shelved entity this is the size of the link's resolved target,
    /// not the link itself.
    pub fn resolve_size(&self) -> Result<u64, ShelfMoveError> {
        if let Some(n) = self.size.get() {
            return Ok(*n);
        }
        let n = match self.shape {
            Shape::Shelved => {
                let target = read_link_once(&self.primary_path)?;
                path_content_size(&target)?
            }
            _ => {
                let resident = match self.residency {
                    Residency::Primary => &self.primary_path,
                    _ => &self.secondary_path,
                };
                path_content_size(resident)?
            }
        };
        let _ = self.size.set(n);
        Ok(n)
    }

    /// User-facing name: `publisher/Model Name` with separators softened.
    pub fn display_name(&self) -> String {
        match self.identity.split_once('/') {
            Some((publisher, name)) => {
                format!("{}/{}", publisher, name.replace(['_', '-'], " "))
            }
            None => self.identity.replace(['_', '-'], " "),
        }
    }
}

/// Read a redirection link exactly one level deep. A target that is itself a
/// link is treated as a chain and rejected rather than followed.
pub fn read_link_once(link: &Path) -> Result<PathBuf, ShelfMoveError> {
    let target = fs::read_link(link)?;
    let target = if target.is_absolute() {
        target
    } else {
        link.parent().map(|p| p.join(&target)).unwrap_or(target)
    };
    match fs::symlink_metadata(&target) {
        Ok(meta) if meta.file_type().is_symlink() => Err(ShelfMoveError::LinkChain(target)),
        Ok(_) => Ok(target),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ShelfMoveError::NotFound(target))
        }
        Err(e) => Err(e.into()),
    }
}

/// Size of the real content at `path`: file length for files, recursive sum
/// of regular-file sizes for directories. Symlinked entries inside a tree are
/// not followed and contribute nothing.
pub fn path_content_size(path: &Path) -> Result<u64, ShelfMoveError> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_file() {
        return Ok(meta.len());
    }
    if !meta.is_dir() {
        return Ok(0);
    }
    let mut total: u64 = 0;
    for entry in WalkDir::new(path).into_iter().filter_map(Result::ok) {
        if entry.file_type().is_file() {
            if let Ok(m) = entry.metadata() {
                total += m.len();
            }
        }
    }
    Ok(total)
}

/// True when the directory holds at least one regular file with a known
/// nested-model extension.
pub fn has_model_payload(dir: &Path) -> bool {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .any(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|ext| MODEL_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
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

    #[test]
    fn inspect_classifies_file_and_dir() {
        let td = tempdir().unwrap();
        let cfg = cfg_for(td.path());
        fs::write(cfg.primary_path("solo.gguf"), b"weights").unwrap();
        let dir = cfg.primary_path("lab/big-model");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("part-1.gguf"), b"0123456789").unwrap();

        let file = Model::inspect(&cfg, "solo.gguf").unwrap();
        assert_eq!(file.shape, Shape::SingleFile);
        assert_eq!(file.residency, Residency::Primary);
        assert_eq!(file.resolve_size().unwrap(), 7);

        let tree = Model::inspect(&cfg, "lab/big-model").unwrap();
        assert_eq!(tree.shape, Shape::ContentDir);
        assert_eq!(tree.resolve_size().unwrap(), 10);
    }

    #[test]
    fn inspect_missing_everywhere_is_not_found() {
        let td = tempdir().unwrap();
        let cfg = cfg_for(td.path());
        let err = Model::inspect(&cfg, "ghost").unwrap_err();
        assert!(matches!(err, ShelfMoveError::NotFound(_)));
    }

    #[test]
    fn secondary_only_entity_is_valid() {
        let td = tempdir().unwrap();
        let cfg = cfg_for(td.path());
        let dir = cfg.secondary_path("external-only");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("m.gguf"), b"abc").unwrap();

        let m = Model::inspect(&cfg, "external-only").unwrap();
        assert_eq!(m.residency, Residency::Secondary);
        assert_eq!(m.resolve_size().unwrap(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn shelved_size_is_target_size() {
        let td = tempdir().unwrap();
        let cfg = cfg_for(td.path());
        let target = cfg.secondary_path("m");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("w.gguf"), vec![0u8; 64]).unwrap();
        std::os::unix::fs::symlink(&target, cfg.primary_path("m")).unwrap();

        let m = Model::inspect(&cfg, "m").unwrap();
        assert_eq!(m.shape, Shape::Shelved);
        assert_eq!(m.residency, Residency::Secondary);
        assert_eq!(m.resolve_size().unwrap(), 64);
    }

    #[cfg(unix)]
    #[test]
    fn link_chain_is_rejected() {
        let td = tempdir().unwrap();
        let cfg = cfg_for(td.path());
        let real = cfg.secondary_path("real");
        fs::create_dir_all(&real).unwrap();
        fs::write(real.join("w.gguf"), b"x").unwrap();
        let middle = cfg.secondary_path("middle");
        std::os::unix::fs::symlink(&real, &middle).unwrap();
        std::os::unix::fs::symlink(&middle, cfg.primary_path("chained")).unwrap();

        let m = Model::inspect(&cfg, "chained").unwrap();
        assert_eq!(m.residency, Residency::Unknown);
        let err = m.resolve_size().unwrap_err();
        assert!(matches!(err, ShelfMoveError::LinkChain(_)));
    }

    #[cfg(unix)]
    #[test]
    fn broken_link_residency_is_unknown() {
        let td = tempdir().unwrap();
        let cfg = cfg_for(td.path());
        std::os::unix::fs::symlink(cfg.secondary_path("gone"), cfg.primary_path("b")).unwrap();
        let m = Model::inspect(&cfg, "b").unwrap();
        assert_eq!(m.shape, Shape::Shelved);
        assert_eq!(m.residency, Residency::Unknown);
    }

    #[test]
    fn model_payload_detection() {
        let td = tempdir().unwrap();
        let with = td.path().join("with");
        fs::create_dir(&with).unwrap();
        fs::write(with.join("a.GGUF"), b"x").unwrap();
        assert!(has_model_payload(&with));

        let without = td.path().join("without");
        fs::create_dir(&without).unwrap();
        fs::write(without.join("README.md"), b"x").unwrap();
        assert!(!has_model_payload(&without));
    }

    #[test]
    fn display_name_softens_separators() {
        let td = tempdir().unwrap();
        let cfg = cfg_for(td.path());
        let dir = cfg.primary_path("lab/my_big-model");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("w.gguf"), b"x").unwrap();
        let m = Model::inspect(&cfg, "lab/my_big-model").unwrap();
        assert_eq!(m.display_name(), "lab/my big model");
    }
}
