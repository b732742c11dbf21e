//! # nixcage-ldpath
//!
//! Dynamic-library search-path resolution for the launcher.
//!
//! A bundled binary execs inside a synthetic root, but the shared libraries
//! it needs may exist only on the host. This crate computes the
//! `LD_LIBRARY_PATH` the child should inherit, from three sources:
//!
//! - the directory of the dynamic loader named by the entrypoint binary's
//!   `PT_INTERP` segment ([`elf`]),
//! - the host's linker configuration, parsed recursively ([`conf`]), and/or
//!   the shared-library cache, enumerated via `ldconfig -p` ([`cache`]),
//! - the existing `LD_LIBRARY_PATH`, which is preserved and extended.
//!
//! Every failure in here is soft: the bootstrap proceeds with whatever
//! contribution could be gathered, since a missing library is a downstream
//! runtime concern rather than a launcher-correctness concern.

pub mod cache;
pub mod conf;
pub mod elf;
pub mod merge;

use std::env;
use std::path::{Path, PathBuf};

use nixcage_common::bundle::Bundle;
use nixcage_common::constants::{ENV_LD_LIBRARY_PATH, ENV_LD_STRATEGY, LD_SO_CONF, STORE_DIR_NAME};
use nixcage_common::strset::OrderedStringSet;

/// Which source feeds the resolved-directory portion of the merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LdPathStrategy {
    /// Enumerate the shared-library cache via `ldconfig -p`.
    #[default]
    Cache,
    /// Recursively parse the linker configuration (`/etc/ld.so.conf`).
    Conf,
    /// Run both, cache directories first.
    Both,
}

impl LdPathStrategy {
    /// Reads the strategy from `NIXCAGE_LD_STRATEGY`, defaulting to
    /// [`Self::Cache`] and warning on unrecognized values.
    #[must_use]
    pub fn from_env() -> Self {
        match env::var(ENV_LD_STRATEGY) {
            Ok(value) => Self::parse(&value).unwrap_or_else(|| {
                tracing::warn!(value, "unknown strategy in {}, using cache", ENV_LD_STRATEGY);
                Self::Cache
            }),
            Err(_) => Self::Cache,
        }
    }

    /// Parses a strategy name (`cache`, `conf`, `both`).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "cache" => Some(Self::Cache),
            "conf" => Some(Self::Conf),
            "both" => Some(Self::Both),
            _ => None,
        }
    }

    const fn uses_cache(self) -> bool {
        matches!(self, Self::Cache | Self::Both)
    }

    const fn uses_conf(self) -> bool {
        matches!(self, Self::Conf | Self::Both)
    }
}

/// Finds the interpreter directory of the bundle's entrypoint binary.
///
/// The `entrypoint` symlink is resolved first; when its target points into
/// the store (`/nix/...`) but cannot be introspected directly — the store is
/// not mounted yet — the bundle-internal copy `<appdir><target>` is tried
/// before giving up.
#[must_use]
pub fn entrypoint_interp_dir(bundle: &Bundle) -> Option<PathBuf> {
    let target = match bundle.entrypoint_target() {
        Ok(target) => target,
        Err(error) => {
            tracing::debug!(%error, "entrypoint readlink failed");
            return None;
        }
    };
    tracing::debug!(target = %target.display(), "entrypoint target");

    if let Some(dir) = elf::read_interp_dir(&target) {
        return Some(dir);
    }

    let store_prefix = Path::new("/").join(STORE_DIR_NAME);
    if target.starts_with(&store_prefix) {
        let mut joined = bundle.appdir.as_os_str().to_os_string();
        joined.push(target.as_os_str());
        let fallback = PathBuf::from(joined);
        tracing::debug!(fallback = %fallback.display(), "trying bundle-internal loader");
        if let Some(dir) = elf::read_interp_dir(&fallback) {
            return Some(dir);
        }
    }

    tracing::debug!("entrypoint interp dir not found");
    None
}

/// Computes the merged search path for the child environment.
///
/// Resolver failures degrade to an empty contribution; `None` means there is
/// nothing to publish.
#[must_use]
pub fn resolve(bundle: &Bundle, strategy: LdPathStrategy) -> Option<String> {
    let interp_dir = entrypoint_interp_dir(bundle);
    if let Some(dir) = &interp_dir {
        tracing::debug!(dir = %dir.display(), "entrypoint interp dir");
    }

    let mut resolved = OrderedStringSet::new();
    if strategy.uses_cache() {
        match cache::collect_dirs() {
            Ok(dirs) => resolved.extend_from(&dirs),
            Err(error) => tracing::debug!(%error, "library cache enumeration failed"),
        }
    }
    if strategy.uses_conf() {
        match conf::parse(Path::new(LD_SO_CONF)) {
            Ok(dirs) => resolved.extend_from(&dirs),
            Err(error) => tracing::debug!(%error, "linker configuration parse failed"),
        }
    }

    let interp_dir = interp_dir.map(|dir| dir.to_string_lossy().into_owned());
    let existing = env::var(ENV_LD_LIBRARY_PATH).ok();
    merge::merge(interp_dir.as_deref(), existing.as_deref(), &resolved)
}

/// Resolves the search path and publishes it into the process environment,
/// to be inherited across the exec. An empty merge leaves the environment
/// untouched.
#[allow(unsafe_code)]
pub fn resolve_and_publish(bundle: &Bundle) {
    let strategy = LdPathStrategy::from_env();
    tracing::debug!(?strategy, "resolving library search path");
    if let Some(joined) = resolve(bundle, strategy) {
        tracing::debug!(ld_library_path = %joined, "publishing search path");
        // SAFETY: the launcher is single-threaded and this runs before any
        // namespace or exec work, so no other thread can observe the
        // environment mid-update.
        unsafe { env::set_var(ENV_LD_LIBRARY_PATH, &joined) };
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::os::unix::fs::symlink;

    use super::*;
    use crate::elf::ElfClass;
    use crate::elf::testutil::build_elf;

    #[test]
    fn strategy_names_parse() {
        assert_eq!(LdPathStrategy::parse("cache"), Some(LdPathStrategy::Cache));
        assert_eq!(LdPathStrategy::parse("conf"), Some(LdPathStrategy::Conf));
        assert_eq!(LdPathStrategy::parse("both"), Some(LdPathStrategy::Both));
        assert_eq!(LdPathStrategy::parse("ldconfig"), None);
        assert_eq!(LdPathStrategy::default(), LdPathStrategy::Cache);
    }

    #[test]
    fn strategy_source_selection() {
        assert!(LdPathStrategy::Cache.uses_cache());
        assert!(!LdPathStrategy::Cache.uses_conf());
        assert!(LdPathStrategy::Conf.uses_conf());
        assert!(!LdPathStrategy::Conf.uses_cache());
        assert!(LdPathStrategy::Both.uses_cache());
        assert!(LdPathStrategy::Both.uses_conf());
    }

    #[test]
    fn interp_dir_from_direct_entrypoint_target() {
        let dir = tempfile::tempdir().expect("tempdir");
        let binary = dir.path().join("app");
        fs::write(
            &binary,
            build_elf(ElfClass::Elf64, 62, Some("/lib64/ld-linux-x86-64.so.2")),
        )
        .expect("write binary");
        symlink(&binary, dir.path().join("entrypoint")).expect("symlink");

        let bundle = Bundle::new("nixcage", dir.path());
        let found = entrypoint_interp_dir(&bundle).expect("should find interp dir");
        assert_eq!(found, PathBuf::from("/lib64"));
    }

    #[test]
    fn interp_dir_falls_back_to_bundled_store_copy() {
        let dir = tempfile::tempdir().expect("tempdir");
        // Entrypoint claims /nix/..., which does not exist on this host; the
        // bundled copy under <appdir>/nix/... does.
        let target = "/nix/store/abc/bin/app";
        symlink(target, dir.path().join("entrypoint")).expect("symlink");
        let bundled = dir.path().join("nix/store/abc/bin");
        fs::create_dir_all(&bundled).expect("mkdir");
        fs::write(
            bundled.join("app"),
            build_elf(ElfClass::Elf64, 62, Some("/nix/store/glibc/lib/ld-linux.so.2")),
        )
        .expect("write binary");

        let bundle = Bundle::new("nixcage", dir.path());
        let found = entrypoint_interp_dir(&bundle).expect("should find interp dir");
        assert_eq!(found, PathBuf::from("/nix/store/glibc/lib"));
    }

    #[test]
    fn interp_dir_absent_without_entrypoint() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bundle = Bundle::new("nixcage", dir.path());
        assert!(entrypoint_interp_dir(&bundle).is_none());
    }

    #[test]
    fn interp_dir_absent_for_non_store_missing_target() {
        let dir = tempfile::tempdir().expect("tempdir");
        symlink("/definitely/not/here", dir.path().join("entrypoint")).expect("symlink");
        let bundle = Bundle::new("nixcage", dir.path());
        assert!(entrypoint_interp_dir(&bundle).is_none());
    }
}
