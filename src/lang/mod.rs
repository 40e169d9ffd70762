//! Embedded script dialect: a small, deterministic, Python-like language.
//!
//! Source is tokenized, parsed into an [`ast::Program`], and executed by a
//! [`eval::Thread`] against a [`value::Module`]. Host objects are exposed as
//! [`value::NativeObject`]s.

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod methods;
pub mod parser;
pub mod universe;
pub mod value;

pub use eval::{ModuleLoader, Thread};
pub use value::{Arguments, Builtin, Module, Namespace, NativeObject, Struct, Value};
