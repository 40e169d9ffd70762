//! rbox: scriptable image customization.
//!
//! Scripts written in a small Python-like dialect describe systemd units,
//! network profiles and file edits; the runtime executes them against
//! mounted disk-image partitions and releases every mount when done.

pub mod cli;
pub mod conf;
pub mod core;
pub mod host;
pub mod lang;
pub mod proxy;

pub use crate::core::error::{Error, Result};
pub use crate::core::script::{Script, ScriptOptions};
