//! Bundle-layout context.
//!
//! The launcher, the `entrypoint` symlink, the embedded `nix` store, and the
//! pre-existing `mountroot` directory all live inside one bundle directory.
//! That layout is resolved once at startup into an immutable [`Bundle`]
//! value and passed into every subsequent operation.

use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{ENTRYPOINT_NAME, MOUNTROOT_NAME, STORE_DIR_NAME};
use crate::error::{NixcageError, Result};

/// Immutable startup context describing the bundle directory tree.
#[derive(Debug, Clone)]
pub struct Bundle {
    /// Program name for diagnostics (`argv[0]`).
    pub argv0: String,
    /// Real, symlink-resolved directory containing the running executable.
    pub appdir: PathBuf,
    /// Pre-existing empty directory used as the tmpfs mount point.
    ///
    /// Because it already exists inside the bundle, no cleanup-on-exit logic
    /// is needed for it.
    pub mountroot: PathBuf,
}

impl Bundle {
    /// Builds the context from an explicit application directory.
    #[must_use]
    pub fn new(argv0: impl Into<String>, appdir: impl Into<PathBuf>) -> Self {
        let appdir = appdir.into();
        let mountroot = appdir.join(MOUNTROOT_NAME);
        Self {
            argv0: argv0.into(),
            appdir,
            mountroot,
        }
    }

    /// Resolves the context from the running executable's location.
    ///
    /// `/proc/self/exe` is canonicalized so the bundle is found even when
    /// the launcher was invoked through a symlink.
    ///
    /// # Errors
    ///
    /// Returns an error if `/proc/self/exe` cannot be resolved or has no
    /// parent directory.
    pub fn from_current_exe(argv0: impl Into<String>) -> Result<Self> {
        let exe_link = Path::new("/proc/self/exe");
        let exe = fs::canonicalize(exe_link).map_err(|source| NixcageError::Io {
            path: exe_link.to_path_buf(),
            source,
        })?;
        let appdir = exe
            .parent()
            .ok_or_else(|| NixcageError::Layout {
                message: format!("executable path {} has no parent directory", exe.display()),
            })?
            .to_path_buf();
        Ok(Self::new(argv0, appdir))
    }

    /// Path of the `entrypoint` symlink inside the bundle.
    #[must_use]
    pub fn entrypoint(&self) -> PathBuf {
        self.appdir.join(ENTRYPOINT_NAME)
    }

    /// Path of the embedded store tree inside the bundle.
    #[must_use]
    pub fn store_dir(&self) -> PathBuf {
        self.appdir.join(STORE_DIR_NAME)
    }

    /// Resolves the `entrypoint` symlink to the real binary's path.
    ///
    /// The target is returned verbatim (it may point inside or outside the
    /// bundle); it is not canonicalized because introspection callers need
    /// the literal target for the bundle-internal fallback.
    ///
    /// # Errors
    ///
    /// Returns an error if the symlink cannot be read.
    pub fn entrypoint_target(&self) -> Result<PathBuf> {
        let entrypoint = self.entrypoint();
        fs::read_link(&entrypoint).map_err(|source| NixcageError::Io {
            path: entrypoint,
            source,
        })
    }
}
