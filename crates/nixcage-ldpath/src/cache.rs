//! Shared-library cache enumeration via `ldconfig -p`.
//!
//! Every cache entry is ABI-checked against the running executable before
//! its containing directory is accepted; a 64-bit launcher must not hand a
//! 32-bit library directory to its child.

use std::io::BufReader;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use nixcage_common::error::{NixcageError, Result};
use nixcage_common::strset::OrderedStringSet;

use crate::conf::read_capped_line;
use crate::elf::{self, ElfIdentity};

/// Known install locations for the cache lister, tried in order.
const LDCONFIG_CANDIDATES: [&str; 3] = ["ldconfig", "/sbin/ldconfig", "/usr/sbin/ldconfig"];

/// Enumerates the shared-library cache and returns the unique containing
/// directories of every entry ABI-compatible with the running executable,
/// in discovery order.
///
/// # Errors
///
/// Returns an error if the running executable cannot be identified, no
/// cache lister launches, or an output line exceeds the fixed maximum.
pub fn collect_dirs() -> Result<OrderedStringSet> {
    let self_exe = Path::new("/proc/self/exe");
    let self_id = elf::read_identity(self_exe).ok_or_else(|| NixcageError::Resolve {
        message: "cannot read ELF identity of /proc/self/exe".to_owned(),
    })?;

    let mut child = spawn_lister()?;
    let result = drain_lister(&mut child, &self_id);
    // The lister's exit status carries no extra signal; the pipe is drained.
    let _ = child.wait();
    result
}

/// Launches `ldconfig -p` from the first candidate location that starts.
fn spawn_lister() -> Result<Child> {
    for candidate in LDCONFIG_CANDIDATES {
        let spawned = Command::new(candidate)
            .arg("-p")
            .env("LC_ALL", "C")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .stdin(Stdio::null())
            .spawn();
        match spawned {
            Ok(child) => {
                tracing::debug!(candidate, "ldconfig launched");
                return Ok(child);
            }
            Err(error) => {
                tracing::debug!(candidate, %error, "ldconfig candidate failed to launch");
            }
        }
    }
    Err(NixcageError::Resolve {
        message: "no ldconfig candidate could be launched".to_owned(),
    })
}

fn drain_lister(child: &mut Child, self_id: &ElfIdentity) -> Result<OrderedStringSet> {
    let stdout = child.stdout.take().ok_or_else(|| NixcageError::Resolve {
        message: "ldconfig child has no stdout pipe".to_owned(),
    })?;
    let mut reader = BufReader::new(stdout);
    let pseudo_path = Path::new("ldconfig -p");

    let mut dirs = OrderedStringSet::new();
    while let Some(line) = read_capped_line(&mut reader, pseudo_path)? {
        collect_line(&line, self_id, &mut dirs);
    }
    Ok(dirs)
}

/// Processes one `ldconfig -p` output line, e.g.
/// `\tlibm.so.6 (libc6,x86-64) => /usr/lib/libm.so.6`.
fn collect_line(line: &str, self_id: &ElfIdentity, dirs: &mut OrderedStringSet) {
    let Some((_, after)) = line.split_once("=>") else {
        return;
    };
    let candidate = after.trim();
    if candidate.is_empty() {
        return;
    }

    let Some(lib_id) = elf::read_identity(Path::new(candidate)) else {
        tracing::debug!(candidate, "skip non-ELF cache entry");
        return;
    };
    if !self_id.is_compatible(&lib_id) {
        tracing::debug!(
            candidate,
            lib_word_size = lib_id.class.word_size(),
            lib_machine = lib_id.machine,
            "skip ABI-incompatible cache entry"
        );
        return;
    }

    if let Some(dir) = Path::new(candidate).parent() {
        let dir = dir.to_string_lossy();
        if !dir.is_empty() && dirs.insert(dir.as_ref()) {
            tracing::debug!(dir = %dir, "ldconfig add dir");
        }
    }
}
