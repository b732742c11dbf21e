//! # nixcage-core
//!
//! The namespace/mount bootstrap: the privileged half of the launcher.
//!
//! [`bootstrap::run`] drives a strict, single-shot state machine — capture
//! caller identity, publish the resolved library search path, unshare mount
//! (and, for non-root callers, user) namespaces, map the caller's identity,
//! assemble a synthetic root under the bundle's `mountroot`, chroot into it,
//! and exec the real binary. Nothing is ever rolled back: the tmpfs and the
//! namespaces are reclaimed by the kernel when the process exits.

pub mod bootstrap;
pub mod namespace;
pub mod rootfs;
