//! Host capabilities injected into a script run.
//!
//! Builtins never touch the OS directly; they go through these traits so a
//! run can be pointed at a staging directory in tests.

pub mod file;
pub mod mount;
pub mod partition;
pub mod service;

pub use file::{DirFs, FileStat, Filesystem};
pub use mount::{DirMounter, FsKind, MountRequest, Mounter};
pub use partition::{MbrReader, PartitionEntry, PartitionReader};
pub use service::{InitSystem, Systemd};
