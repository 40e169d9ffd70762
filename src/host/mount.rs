//! RB-042: Mounting image partitions as filesystems.

use super::file::{DirFs, Filesystem};
use crate::core::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::info;

/// Sector size used for LBA offsets.
pub const SECTOR_SIZE: u64 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsKind {
    Ext4,
    Vfat,
}

impl FsKind {
    /// Name used in proxy type names (`fs.Ext4Mount`).
    pub fn name(self) -> &'static str {
        match self {
            FsKind::Ext4 => "Ext4",
            FsKind::Vfat => "VFAT",
        }
    }
}

/// One partition of an image to mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRequest {
    pub image: PathBuf,
    pub kind: FsKind,
    pub start_sector: u64,
    pub sector_count: u64,
    /// Grow the filesystem to fill the partition after mounting.
    pub resize: bool,
}

impl MountRequest {
    pub fn offset(&self) -> u64 {
        self.start_sector * SECTOR_SIZE
    }

    pub fn length(&self) -> u64 {
        self.sector_count * SECTOR_SIZE
    }
}

/// Turns a partition of an image into a usable [`Filesystem`].
pub trait Mounter {
    fn mount(&self, req: &MountRequest) -> Result<Rc<dyn Filesystem>>;
}

/// Serves each partition from a directory under a staging root.
///
/// The partition at sector `S` of `disk.img` is `<staging>/disk.img.p<S>`;
/// it is created empty on first use.
#[derive(Debug, Clone)]
pub struct DirMounter {
    staging: PathBuf,
}

impl DirMounter {
    pub fn new(staging: impl Into<PathBuf>) -> Self {
        Self {
            staging: staging.into(),
        }
    }

    pub fn partition_dir(&self, req: &MountRequest) -> PathBuf {
        let image = req
            .image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".into());
        self.staging
            .join(format!("{}.p{}", image, req.start_sector))
    }

    pub fn staging(&self) -> &Path {
        &self.staging
    }
}

impl Mounter for DirMounter {
    fn mount(&self, req: &MountRequest) -> Result<Rc<dyn Filesystem>> {
        if req.sector_count == 0 {
            return Err(Error::eval(format!(
                "cannot mount empty partition at sector {} of {}",
                req.start_sector,
                req.image.display()
            )));
        }
        let dir = self.partition_dir(req);
        fs::create_dir_all(&dir)
            .map_err(|e| Error::resource(format!("mount {}", dir.display()), e))?;
        info!(
            image = %req.image.display(),
            kind = req.kind.name(),
            offset = req.offset(),
            length = req.length(),
            resize = req.resize,
            at = %dir.display(),
            "mounted partition"
        );
        Ok(Rc::new(DirFs::new(dir)))
    }
}
