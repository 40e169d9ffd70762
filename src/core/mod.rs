//! Core runtime: environment, module loading, resource lifetime and script lifecycle.

pub mod env;
pub mod error;
pub mod hasher;
pub mod loader;
pub mod registry;
pub mod script;
pub mod stdlib;
