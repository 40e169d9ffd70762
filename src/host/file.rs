//! RB-041: Filesystem capability and a directory-rooted implementation.
//!
//! Every path handed to a [`Filesystem`] is an absolute path inside the
//! image (`/etc/hostname`). [`DirFs`] maps those onto a host directory.

use crate::core::error::{Error, Result};
use std::cell::Cell;
use std::fs;
use std::io;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};

/// What `stat`/`lstat` report about one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
    pub is_symlink: bool,
    /// Raw `st_mode`, file type bits included.
    pub mode: u32,
}

/// Operations a script may perform on a mounted image filesystem.
pub trait Filesystem {
    fn stat(&self, path: &str) -> Result<FileStat>;
    fn lstat(&self, path: &str) -> Result<FileStat>;
    fn read(&self, path: &str) -> Result<Vec<u8>>;
    fn write(&self, path: &str, data: &[u8], mode: u32) -> Result<()>;
    /// Create a single directory with mode 0755.
    fn mkdir(&self, path: &str) -> Result<()>;
    fn remove(&self, path: &str) -> Result<()>;
    fn remove_all(&self, path: &str) -> Result<()>;
    fn chmod(&self, path: &str, mode: u32) -> Result<()>;
    fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<()>;
    /// Create `link` pointing at `target`. The target is stored verbatim.
    fn symlink(&self, target: &str, link: &str) -> Result<()>;
    /// Copy a file from the host into the filesystem.
    fn copy_into(&self, host_path: &Path, path: &str) -> Result<()>;
    /// Host directory the filesystem is reachable at.
    fn mountpoint(&self) -> &Path;
    /// Release the filesystem. Calling it again is a no-op.
    fn close(&self) -> Result<()>;
}

/// A [`Filesystem`] whose root is a host directory.
#[derive(Debug)]
pub struct DirFs {
    root: PathBuf,
    closed: Cell<bool>,
}

impl DirFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            closed: Cell::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// Map an image path onto the host, refusing to leave the root.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        if self.closed.get() {
            return Err(Error::resource(
                path,
                io::Error::other("filesystem is closed"),
            ));
        }
        let mut out = self.root.clone();
        for comp in Path::new(path).components() {
            match comp {
                Component::Normal(part) => out.push(part),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(Error::resource(
                        path,
                        io::Error::new(io::ErrorKind::InvalidInput, "path escapes filesystem root"),
                    ));
                }
            }
        }
        Ok(out)
    }
}

/// Stat result for `path` from host metadata.
pub fn describe(path: &str, meta: &fs::Metadata) -> FileStat {
    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "/".into());
    FileStat {
        name,
        size: meta.len(),
        is_dir: meta.is_dir(),
        is_symlink: meta.file_type().is_symlink(),
        mode: meta.mode(),
    }
}

impl Filesystem for DirFs {
    fn stat(&self, path: &str) -> Result<FileStat> {
        let full = self.resolve(path)?;
        let meta = fs::metadata(&full).map_err(|e| Error::resource(format!("stat {}", path), e))?;
        Ok(describe(path, &meta))
    }

    fn lstat(&self, path: &str) -> Result<FileStat> {
        let full = self.resolve(path)?;
        let meta =
            fs::symlink_metadata(&full).map_err(|e| Error::resource(format!("lstat {}", path), e))?;
        Ok(describe(path, &meta))
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        fs::read(&full).map_err(|e| Error::resource(format!("read {}", path), e))
    }

    fn write(&self, path: &str, data: &[u8], mode: u32) -> Result<()> {
        let full = self.resolve(path)?;
        let ctx = || format!("write {}", path);
        fs::write(&full, data).map_err(|e| Error::resource(ctx(), e))?;
        fs::set_permissions(&full, fs::Permissions::from_mode(mode))
            .map_err(|e| Error::resource(ctx(), e))
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        let ctx = || format!("mkdir {}", path);
        fs::create_dir(&full).map_err(|e| Error::resource(ctx(), e))?;
        fs::set_permissions(&full, fs::Permissions::from_mode(0o755))
            .map_err(|e| Error::resource(ctx(), e))
    }

    fn remove(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        let meta =
            fs::symlink_metadata(&full).map_err(|e| Error::resource(format!("remove {}", path), e))?;
        let res = if meta.is_dir() {
            fs::remove_dir(&full)
        } else {
            fs::remove_file(&full)
        };
        res.map_err(|e| Error::resource(format!("remove {}", path), e))
    }

    fn remove_all(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        let res = match fs::symlink_metadata(&full) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&full),
            Ok(_) => fs::remove_file(&full),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        };
        res.map_err(|e| Error::resource(format!("remove_all {}", path), e))
    }

    fn chmod(&self, path: &str, mode: u32) -> Result<()> {
        let full = self.resolve(path)?;
        fs::set_permissions(&full, fs::Permissions::from_mode(mode))
            .map_err(|e| Error::resource(format!("chmod {}", path), e))
    }

    fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<()> {
        let full = self.resolve(path)?;
        std::os::unix::fs::chown(&full, Some(uid), Some(gid))
            .map_err(|e| Error::resource(format!("chown {}", path), e))
    }

    fn symlink(&self, target: &str, link: &str) -> Result<()> {
        let full = self.resolve(link)?;
        std::os::unix::fs::symlink(target, &full)
            .map_err(|e| Error::resource(format!("symlink {} -> {}", link, target), e))
    }

    fn copy_into(&self, host_path: &Path, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        fs::copy(host_path, &full)
            .map(|_| ())
            .map_err(|e| Error::resource(format!("copy {} into {}", host_path.display(), path), e))
    }

    fn mountpoint(&self) -> &Path {
        &self.root
    }

    fn close(&self) -> Result<()> {
        self.closed.set(true);
        Ok(())
    }
}
