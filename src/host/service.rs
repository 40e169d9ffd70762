//! RB-044: Init-system capability: installing and enabling systemd units
//! inside an image filesystem.

use super::file::Filesystem;
use crate::conf::systemd::Unit;
use crate::core::error::{Error, Result};
use std::io;
use tracing::info;

pub const SYSTEM_UNIT_DIR: &str = "/lib/systemd/system";
pub const ADMIN_UNIT_DIR: &str = "/etc/systemd/system";

pub trait InitSystem {
    fn exists(&self, fs: &dyn Filesystem, unit: &str) -> Result<bool>;
    fn install(&self, fs: &dyn Filesystem, unit: &str, conf: &Unit, overwrite: bool) -> Result<()>;
    fn is_enabled_on_target(&self, fs: &dyn Filesystem, unit: &str, target: &str) -> Result<bool>;
    fn enable_on_target(&self, fs: &dyn Filesystem, unit: &str, target: &str) -> Result<()>;
}

/// systemd's on-disk layout: unit files under `/lib/systemd/system`,
/// enablement as `<target>.wants/` symlinks.
#[derive(Debug, Default, Clone, Copy)]
pub struct Systemd;

fn unit_path(unit: &str) -> String {
    format!("{}/{}", SYSTEM_UNIT_DIR, unit)
}

fn wants_dir(base: &str, target: &str) -> String {
    format!("{}/{}.wants", base, target)
}

impl InitSystem for Systemd {
    fn exists(&self, fs: &dyn Filesystem, unit: &str) -> Result<bool> {
        match fs.stat(&unit_path(unit)) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn install(&self, fs: &dyn Filesystem, unit: &str, conf: &Unit, overwrite: bool) -> Result<()> {
        if self.exists(fs, unit)? && !overwrite {
            return Err(Error::resource(
                format!("install {}", unit),
                io::Error::new(io::ErrorKind::AlreadyExists, "file already exists"),
            ));
        }
        fs.write(&unit_path(unit), conf.render().as_bytes(), 0o644)?;
        info!(unit, overwrite, "installed unit");
        Ok(())
    }

    fn is_enabled_on_target(&self, fs: &dyn Filesystem, unit: &str, target: &str) -> Result<bool> {
        for base in [ADMIN_UNIT_DIR, SYSTEM_UNIT_DIR] {
            let dir = wants_dir(base, target);
            match fs.lstat(&format!("{}/{}", dir, unit)) {
                Ok(st) if st.is_symlink => return Ok(true),
                Ok(_) => return Err(Error::eval(format!("expected symlink on {}", dir))),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }

    fn enable_on_target(&self, fs: &dyn Filesystem, unit: &str, target: &str) -> Result<()> {
        if self.is_enabled_on_target(fs, unit, target)? {
            return Ok(());
        }
        if !self.exists(fs, unit)? {
            return Err(Error::eval(format!(
                "{}: cannot perform action on uninstalled unit",
                unit
            )));
        }
        let dir = wants_dir(ADMIN_UNIT_DIR, target);
        match fs.stat(&dir) {
            Ok(_) => {}
            Err(e) if e.is_not_found() => mkdir_all(fs, &dir)?,
            Err(e) => return Err(e),
        }
        fs.symlink(&unit_path(unit), &format!("{}/{}", dir, unit))?;
        info!(unit, target, "enabled unit");
        Ok(())
    }
}

fn mkdir_all(fs: &dyn Filesystem, path: &str) -> Result<()> {
    let mut current = String::new();
    for part in path.split('/').filter(|p| !p.is_empty()) {
        current.push('/');
        current.push_str(part);
        match fs.stat(&current) {
            Ok(_) => {}
            Err(e) if e.is_not_found() => fs.mkdir(&current)?,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
