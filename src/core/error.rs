//! RB-007: Error taxonomy shared by the interpreter, proxies and host driver.

use thiserror::Error;

/// Every failure a script run can surface to the host.
#[derive(Debug, Error)]
pub enum Error {
    /// Source text could not be tokenized or parsed.
    #[error("{file}:{line}:{col}: syntax error: {msg}")]
    Syntax {
        file: String,
        line: usize,
        col: usize,
        msg: String,
    },

    /// A `load()` named a module no resolver knows, or the resolver failed.
    #[error("cannot load {module}: {reason}")]
    Import { module: String, reason: String },

    /// A module was referenced again while its own body was still executing.
    #[error("cycle in dependency graph when loading {module}")]
    Cycle { module: String },

    /// A value of the wrong kind crossed a typed boundary.
    #[error("{context}: expected {expected}, got {actual}")]
    TypeMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    #[error("{type_name} has no .{name} attribute")]
    NoSuchAttribute { type_name: String, name: String },

    #[error("{type_name} has no assignable field .{name}")]
    NoSuchAssignableField { type_name: String, name: String },

    /// A required entrypoint (`build`, or a named call) is not defined.
    #[error("{name}() function not present")]
    EntrypointMissing { name: String },

    /// An entrypoint ran and failed.
    #[error("{name}() failed: {source}")]
    Entrypoint {
        name: String,
        #[source]
        source: Box<Error>,
    },

    /// A host capability (filesystem, mount, init system) failed.
    #[error("{context}: {source}")]
    Resource {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The script called `crash()` or `fail()`.
    #[error("soft crash: {0}")]
    Crash(String),

    /// Host argument vector contained an undeclared flag.
    #[error("{0}")]
    Flag(String),

    /// Any other runtime failure raised while evaluating script code.
    #[error("{0}")]
    Eval(String),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn type_mismatch(
        context: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Error::TypeMismatch {
            context: context.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn resource(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Resource {
            context: context.into(),
            source,
        }
    }

    pub fn eval(msg: impl Into<String>) -> Self {
        Error::Eval(msg.into())
    }

    /// True for errors a resource capability reported as "not found".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Resource { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}
