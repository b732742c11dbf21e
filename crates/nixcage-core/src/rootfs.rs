//! Synthetic root assembly.
//!
//! A tmpfs is mounted over the bundle's pre-existing `mountroot`, every
//! top-level entry of the real root is mirrored into it as an empty
//! placeholder with a recursive bind mount over it, and the bundle's
//! embedded store tree is bound at `<mountroot>/nix`.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use nix::mount::{MsFlags, mount};
use nix::sys::stat::Mode;
use nixcage_common::bundle::Bundle;
use nixcage_common::constants::STORE_DIR_NAME;
use nixcage_common::error::{NixcageError, Result};

/// Placeholder kind for one mirrored root entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Mirror as an empty directory.
    Directory,
    /// Mirror as an empty file.
    File,
}

/// One top-level root entry to mirror into the synthetic root.
#[derive(Debug, Clone)]
pub struct MountEntry {
    /// Entry name under `/`.
    pub name: OsString,
    /// Source path on the real root.
    pub source: PathBuf,
    /// Placeholder kind.
    pub kind: EntryKind,
    /// Permission bits for the placeholder (file-type bits stripped).
    pub mode: u32,
}

/// Permission-bit mask: everything but the file-type bits.
const MODE_MASK: u32 = 0o7777;

/// Computes the mirror plan for the top-level entries of `root`.
///
/// Every entry except `.`, `..`, and the store directory name is included.
/// A stat failure on an individual entry (e.g. a dangling symlink) is
/// logged and that entry skipped; it never blocks its siblings.
///
/// # Errors
///
/// Returns an error only if `root` itself cannot be listed.
pub fn plan_root_entries(root: &Path) -> Result<Vec<MountEntry>> {
    let entries = fs::read_dir(root).map_err(|source| NixcageError::Io {
        path: root.to_path_buf(),
        source,
    })?;

    let mut plan = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| NixcageError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        let name = entry.file_name();
        if name == STORE_DIR_NAME {
            continue;
        }
        let source = root.join(&name);
        // Follows symlinks, like the stat it replaces; a symlinked directory
        // is mirrored as a directory.
        let metadata = match fs::metadata(&source) {
            Ok(metadata) => metadata,
            Err(error) => {
                tracing::warn!(source = %source.display(), %error, "stat failed, entry skipped");
                continue;
            }
        };
        let kind = if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        plan.push(MountEntry {
            name,
            source,
            kind,
            mode: metadata.permissions().mode() & MODE_MASK,
        });
    }
    Ok(plan)
}

/// Mounts a fresh tmpfs at `mountroot` and remounts it over itself as
/// unbindable, preventing host mount events from propagating in and the
/// recursive binds that follow from exploding.
///
/// # Errors
///
/// Returns an error if either `mount(2)` call fails.
pub fn mount_tmpfs(mountroot: &Path) -> Result<()> {
    mount(
        Some("tmpfs"),
        mountroot,
        Some("tmpfs"),
        MsFlags::empty(),
        None::<&str>,
    )
    .map_err(|errno| {
        NixcageError::syscall(format!("mount tmpfs -> {}", mountroot.display()), errno as i32)
    })?;
    mount(
        Some(mountroot),
        mountroot,
        None::<&str>,
        MsFlags::MS_UNBINDABLE,
        None::<&str>,
    )
    .map_err(|errno| {
        NixcageError::syscall(
            format!("mount unbindable -> {}", mountroot.display()),
            errno as i32,
        )
    })?;
    tracing::debug!(mountroot = %mountroot.display(), "tmpfs mounted");
    Ok(())
}

/// Mirrors the planned root entries into `mountroot`, best-effort.
///
/// Each entry gets an empty placeholder with the source's permission bits
/// and a recursive bind mount over it. A failing entry is logged and
/// skipped; the mirror logic is not robust enough for every filesystem
/// oddity, and one uncooperative entry must not abort the bootstrap.
pub fn populate_root(plan: &[MountEntry], mountroot: &Path) {
    for entry in plan {
        if let Err(error) = mirror_entry(entry, mountroot) {
            tracing::warn!(source = %entry.source.display(), %error, "entry not mirrored");
        }
    }
}

fn mirror_entry(entry: &MountEntry, mountroot: &Path) -> Result<()> {
    let target = mountroot.join(&entry.name);
    match entry.kind {
        EntryKind::Directory => {
            nix::unistd::mkdir(&target, Mode::from_bits_truncate(entry.mode)).map_err(|errno| {
                NixcageError::syscall(format!("mkdir {}", target.display()), errno as i32)
            })?;
        }
        EntryKind::File => {
            let file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .mode(entry.mode)
                .open(&target)
                .map_err(|source| NixcageError::Io {
                    path: target.clone(),
                    source,
                })?;
            drop(file);
        }
    }
    bind_recursive(&entry.source, &target)
}

/// Recursively bind-mounts `source` onto `target`.
///
/// # Errors
///
/// Returns an error if the `mount(2)` syscall fails.
pub fn bind_recursive(source: &Path, target: &Path) -> Result<()> {
    mount(
        Some(source),
        target,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|errno| {
        NixcageError::syscall(
            format!("mount {} -> {}", source.display(), target.display()),
            errno as i32,
        )
    })
}

/// Binds the bundle's embedded store tree at `<mountroot>/nix`.
///
/// Unlike [`populate_root`] this is fatal on failure: without the store the
/// application's runtime dependencies are unreachable.
///
/// # Errors
///
/// Returns an error if the mount point cannot be created or the bind mount
/// fails.
pub fn mount_store(bundle: &Bundle) -> Result<()> {
    let from = bundle.store_dir();
    let to = bundle.mountroot.join(STORE_DIR_NAME);
    nix::unistd::mkdir(&to, Mode::from_bits_truncate(0o777)).map_err(|errno| {
        NixcageError::syscall(format!("mkdir {}", to.display()), errno as i32)
    })?;
    bind_recursive(&from, &to)?;
    tracing::debug!(from = %from.display(), to = %to.display(), "store tree mounted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::symlink;

    use super::*;

    #[test]
    fn plan_skips_store_dir_and_keeps_everything_else() {
        let root = tempfile::tempdir().expect("tempdir");
        fs::create_dir(root.path().join("etc")).expect("mkdir");
        fs::create_dir(root.path().join("usr")).expect("mkdir");
        fs::create_dir(root.path().join("nix")).expect("mkdir");
        fs::write(root.path().join("vmlinuz"), b"").expect("write");

        let plan = plan_root_entries(root.path()).expect("should plan");
        let mut names: Vec<String> = plan
            .iter()
            .map(|entry| entry.name.to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["etc", "usr", "vmlinuz"]);
    }

    #[test]
    fn plan_records_kind_and_permission_bits() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = root.path().join("opt");
        fs::create_dir(&dir).expect("mkdir");
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o750)).expect("chmod");
        let file = root.path().join("flag");
        fs::write(&file, b"").expect("write");
        fs::set_permissions(&file, fs::Permissions::from_mode(0o604)).expect("chmod");

        let plan = plan_root_entries(root.path()).expect("should plan");
        let opt = plan
            .iter()
            .find(|entry| entry.name == "opt")
            .expect("opt planned");
        assert_eq!(opt.kind, EntryKind::Directory);
        assert_eq!(opt.mode, 0o750);
        let flag = plan
            .iter()
            .find(|entry| entry.name == "flag")
            .expect("flag planned");
        assert_eq!(flag.kind, EntryKind::File);
        assert_eq!(flag.mode, 0o604);
    }

    #[test]
    fn dangling_symlink_is_skipped_without_blocking_siblings() {
        let root = tempfile::tempdir().expect("tempdir");
        fs::create_dir(root.path().join("etc")).expect("mkdir");
        symlink("/nonexistent/target", root.path().join("broken")).expect("symlink");
        fs::create_dir(root.path().join("usr")).expect("mkdir");

        let plan = plan_root_entries(root.path()).expect("should plan");
        let mut names: Vec<String> = plan
            .iter()
            .map(|entry| entry.name.to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["etc", "usr"]);
    }

    #[test]
    fn symlinked_directory_is_planned_as_directory() {
        let root = tempfile::tempdir().expect("tempdir");
        fs::create_dir(root.path().join("real")).expect("mkdir");
        symlink(root.path().join("real"), root.path().join("alias")).expect("symlink");

        let plan = plan_root_entries(root.path()).expect("should plan");
        let alias = plan
            .iter()
            .find(|entry| entry.name == "alias")
            .expect("alias planned");
        assert_eq!(alias.kind, EntryKind::Directory);
    }

    #[test]
    fn plan_fails_when_root_is_unlistable() {
        assert!(plan_root_entries(Path::new("/nonexistent/root")).is_err());
    }
}
