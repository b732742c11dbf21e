//! The launch state machine.
//!
//! Strict sequence, attempted exactly once, no rollback:
//!
//! 1. capture the caller's real uid/gid,
//! 2. resolve and publish the library search path (soft),
//! 3. unshare mount (+ user, for non-root callers) namespaces,
//! 4. map the caller's identity,
//! 5. mount an unbindable tmpfs at `mountroot`,
//! 6. mirror the real root's top-level entries (best-effort per entry),
//! 7. bind the bundle's store tree at `<mountroot>/nix` (fatal),
//! 8. chroot into `mountroot` and chdir back to the recorded cwd,
//! 9. exec the entrypoint's target with the original argument vector.
//!
//! The severity of each step is decided here; the leaf modules only report
//! what failed.

use std::convert::Infallible;
use std::ffi::{CString, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use nix::unistd::{chdir, chroot, execv, getcwd};
use nixcage_common::bundle::Bundle;
use nixcage_common::error::{NixcageError, Result};

use crate::namespace;
use crate::rootfs;

/// Converts the original argument vector for `execv`.
///
/// The arguments are forwarded verbatim; nothing is parsed or reordered.
///
/// # Errors
///
/// Returns an error if an argument contains an interior NUL byte.
pub fn exec_argv(args: impl IntoIterator<Item = OsString>) -> Result<Vec<CString>> {
    args.into_iter()
        .map(|arg| {
            CString::new(arg.as_bytes()).map_err(|_| NixcageError::Layout {
                message: "argument contains an interior NUL byte".to_owned(),
            })
        })
        .collect()
}

/// Runs the bootstrap to completion. On success this never returns — the
/// process image is replaced by the bundled application.
///
/// # Errors
///
/// Returns an error on any fatal step: namespace creation, identity
/// mapping, tmpfs or store mount, chroot, chdir-back, entrypoint
/// resolution, or exec itself.
pub fn run(bundle: &Bundle, argv: &[CString]) -> Result<Infallible> {
    // Identity must be read before unshare changes what getuid() reports.
    let ids = namespace::capture();

    nixcage_ldpath::resolve_and_publish(bundle);

    let in_user_ns = namespace::unshare_namespaces(&ids)?;
    if in_user_ns {
        namespace::map_caller_ids(&ids)?;
    }

    rootfs::mount_tmpfs(&bundle.mountroot)?;
    let plan = rootfs::plan_root_entries(Path::new("/"))?;
    rootfs::populate_root(&plan, &bundle.mountroot);
    rootfs::mount_store(bundle)?;

    // Record where we were so relative paths keep meaning after the chroot.
    let cwd = getcwd().map_err(|errno| NixcageError::syscall("getcwd", errno as i32))?;
    chroot(&bundle.mountroot).map_err(|errno| {
        NixcageError::syscall(format!("chroot {}", bundle.mountroot.display()), errno as i32)
    })?;
    chdir(&cwd).map_err(|errno| {
        NixcageError::syscall(format!("chdir {}", cwd.display()), errno as i32)
    })?;

    // Resolved here rather than taken from argv so the diagnostic names the
    // real binary.
    let exe = bundle.entrypoint_target()?;
    let exe_c = CString::new(exe.as_os_str().as_bytes()).map_err(|_| NixcageError::Layout {
        message: format!("entrypoint target {} contains a NUL byte", exe.display()),
    })?;
    tracing::debug!(exe = %exe.display(), "handing over");
    execv(&exe_c, argv)
        .map_err(|errno| NixcageError::syscall(format!("exec {}", exe.display()), errno as i32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argv_is_forwarded_verbatim() {
        let argv = exec_argv([
            OsString::from("/bundle/app/launcher"),
            OsString::from("--flag=value with spaces"),
            OsString::from("-x"),
        ])
        .expect("should convert");
        assert_eq!(argv.len(), 3);
        assert_eq!(argv[0].to_bytes(), b"/bundle/app/launcher");
        assert_eq!(argv[1].to_bytes(), b"--flag=value with spaces");
        assert_eq!(argv[2].to_bytes(), b"-x");
    }

    #[test]
    fn interior_nul_in_argument_is_rejected() {
        use std::os::unix::ffi::OsStringExt;
        let arg = OsString::from_vec(b"bad\0arg".to_vec());
        assert!(exec_argv([arg]).is_err());
    }
}
