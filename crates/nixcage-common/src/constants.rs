//! Workspace-wide constants and well-known paths.

/// Exit status used when launching the bundled application fails.
///
/// Applications that assign meanings to exit status codes (e.g. rsync) keep
/// their own codes unambiguous because 127 already aliases "command not
/// executable/not found", see SYSTEM(3POSIX).
pub const EXIT_EXECERROR: i32 = 127;

/// Hard upper bound on a single input line, for both linker-configuration
/// files and `ldconfig -p` output. Longer lines fail the whole parse.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Name of the embedded store directory inside the bundle, and of the one
/// top-level root entry that is never mirrored from the host.
pub const STORE_DIR_NAME: &str = "nix";

/// Name of the entrypoint symlink inside the bundle.
pub const ENTRYPOINT_NAME: &str = "entrypoint";

/// Name of the pre-existing tmpfs mount point inside the bundle.
pub const MOUNTROOT_NAME: &str = "mountroot";

/// The dynamic-linker search path variable consumed and extended.
pub const ENV_LD_LIBRARY_PATH: &str = "LD_LIBRARY_PATH";

/// When set to a non-empty value, every search-path resolution decision is
/// logged to the error stream.
pub const ENV_DEBUG_LD: &str = "NIXCAGE_DEBUG_LD";

/// Selects the search-path resolution strategy (`cache`, `conf`, or `both`).
pub const ENV_LD_STRATEGY: &str = "NIXCAGE_LD_STRATEGY";

/// Top-level linker configuration file consumed by the `conf` strategy.
pub const LD_SO_CONF: &str = "/etc/ld.so.conf";

/// Application name used in diagnostics.
pub const APP_NAME: &str = "nixcage";
