//! Namespace creation and caller-identity mapping.
//!
//! A non-root caller gets a user namespace in addition to the mount
//! namespace, so it can mount inside its own namespace; root already holds
//! full mount privilege and skips user-namespace creation.

use std::fs;

use nix::sched::{CloneFlags, unshare};
use nix::unistd::{Gid, Uid, getgid, getuid};
use nixcage_common::error::{NixcageError, Result};

/// The caller's real user and group ids, captured before any namespace
/// change.
#[derive(Debug, Clone, Copy)]
pub struct CallerIds {
    /// Real user id.
    pub uid: Uid,
    /// Real group id.
    pub gid: Gid,
}

/// Records the caller's identity. Must run before [`unshare_namespaces`].
#[must_use]
pub fn capture() -> CallerIds {
    CallerIds {
        uid: getuid(),
        gid: getgid(),
    }
}

/// Unshares a new mount namespace, plus a new user namespace when the
/// caller is not root.
///
/// Returns `true` if a user namespace was created (the caller must then map
/// its identity with [`map_caller_ids`]).
///
/// # Errors
///
/// Returns an error if the `unshare(2)` syscall fails.
pub fn unshare_namespaces(ids: &CallerIds) -> Result<bool> {
    let mut flags = CloneFlags::CLONE_NEWNS;
    let user_ns = !ids.uid.is_root();
    if user_ns {
        flags |= CloneFlags::CLONE_NEWUSER;
    }
    unshare(flags).map_err(|errno| NixcageError::syscall("unshare", errno as i32))?;
    tracing::debug!(user_ns, "namespaces unshared");
    Ok(user_ns)
}

/// The `/proc/self` writes that map the caller's identity, in the order
/// they must be performed.
///
/// Per user_namespaces(7), each map file takes a single line mapping the
/// writing process's id in the parent namespace, and `setgroups` must be
/// denied before `gid_map` can be written.
fn map_writes(ids: &CallerIds) -> [(&'static str, String); 3] {
    [
        ("/proc/self/uid_map", id_map_line(ids.uid.as_raw())),
        ("/proc/self/setgroups", "deny".to_owned()),
        ("/proc/self/gid_map", id_map_line(ids.gid.as_raw())),
    ]
}

fn id_map_line(id: u32) -> String {
    format!("{id} {id} 1\n")
}

/// Maps the caller's uid/gid to themselves inside the new user namespace.
///
/// # Errors
///
/// Returns an error if any of the `/proc/self/{uid_map,setgroups,gid_map}`
/// writes fails.
pub fn map_caller_ids(ids: &CallerIds) -> Result<()> {
    for (path, content) in map_writes(ids) {
        fs::write(path, &content).map_err(|source| NixcageError::Io {
            path: path.into(),
            source,
        })?;
    }
    tracing::debug!(uid = ids.uid.as_raw(), gid = ids.gid.as_raw(), "caller identity mapped");
    Ok(())
}
