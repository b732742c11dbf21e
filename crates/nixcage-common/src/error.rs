//! Unified error types for the nixcage workspace.
//!
//! Leaf functions return these variants without deciding severity; the
//! bootstrap decides per step whether a failure is fatal or merely logged.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum NixcageError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A system call failed.
    #[error("{op}: {source}")]
    Syscall {
        /// Description of the failing operation, e.g. `mount tmpfs -> /x`.
        op: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// A linker-configuration file could not be parsed.
    #[error("parse error in {path}: {message}")]
    Parse {
        /// File being parsed when the failure occurred.
        path: PathBuf,
        /// Description of the parse failure.
        message: String,
    },

    /// The bundle directory tree does not match the expected layout.
    #[error("invalid bundle layout: {message}")]
    Layout {
        /// Description of the layout violation.
        message: String,
    },

    /// Library search-path resolution could not gather its inputs.
    #[error("library path resolution failed: {message}")]
    Resolve {
        /// Description of the failed resolution step.
        message: String,
    },
}

impl NixcageError {
    /// Builds a [`NixcageError::Syscall`] from an operation description and
    /// a raw OS error number.
    pub fn syscall(op: impl Into<String>, errno: i32) -> Self {
        Self::Syscall {
            op: op.into(),
            source: std::io::Error::from_raw_os_error(errno),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, NixcageError>;
