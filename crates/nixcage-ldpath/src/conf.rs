//! Recursive `ld.so.conf`-style configuration parsing.
//!
//! Grammar: one directive per line; `#` starts a comment extending to end of
//! line; surrounding whitespace is stripped; blank lines are skipped; a line
//! of the form `include <pattern>` recurses (with glob expansion), and every
//! other non-empty line is a literal search-directory entry.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use nixcage_common::constants::MAX_LINE_BYTES;
use nixcage_common::error::{NixcageError, Result};
use nixcage_common::strset::OrderedStringSet;
use nom::Parser;
use nom::bytes::complete::tag;
use nom::character::complete::multispace1;
use nom::combinator::rest;
use nom::sequence::preceded;

/// Accumulated state for one top-level parse invocation.
///
/// `seen` holds canonicalized file paths and guards against include cycles;
/// `collected` accumulates search directories in discovery order
/// (depth-first, directive order within a file, sorted glob matches within
/// an `include` wildcard).
#[derive(Debug, Default)]
struct ConfigParseState {
    seen: OrderedStringSet,
    collected: OrderedStringSet,
}

/// Parses the configuration file at `path` and every file it includes,
/// returning the collected search directories in discovery order.
///
/// # Errors
///
/// Returns an error if any file or directory in the include recursion fails
/// to read, or if a line exceeds the fixed maximum length. Partial results
/// are discarded on error.
pub fn parse(path: &Path) -> Result<OrderedStringSet> {
    let mut state = ConfigParseState::default();
    parse_file(&mut state, path)?;
    Ok(state.collected)
}

fn parse_file(state: &mut ConfigParseState, path: &Path) -> Result<()> {
    // Resolve symlinks and relative components so a cycle is recognized no
    // matter which spelling of the path reaches us again. If canonicalization
    // fails, the literal path stands in.
    let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    if !state.seen.insert(canonical.to_string_lossy()) {
        tracing::debug!(path = %canonical.display(), "include cycle, skipping");
        return Ok(());
    }

    let file = File::open(&canonical).map_err(|source| NixcageError::Io {
        path: canonical.clone(),
        source,
    })?;
    let mut reader = BufReader::new(file);

    while let Some(line) = read_capped_line(&mut reader, &canonical)? {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        if let Some(pattern) = include_pattern(line) {
            include(state, &canonical, pattern)?;
        } else if state.collected.insert(line) {
            tracing::debug!(dir = line, from = %canonical.display(), "search dir");
        }
    }
    Ok(())
}

/// Reads one line, enforcing the hard 1 MiB cap.
///
/// Shared with the `ldconfig -p` enumerator. Returns `Ok(None)` at EOF.
pub(crate) fn read_capped_line<R: BufRead>(reader: &mut R, path: &Path) -> Result<Option<String>> {
    let mut line = String::new();
    let n = reader
        .by_ref()
        .take(MAX_LINE_BYTES as u64 + 1)
        .read_line(&mut line)
        .map_err(|source| NixcageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    if n == 0 {
        return Ok(None);
    }
    if n > MAX_LINE_BYTES {
        return Err(NixcageError::Parse {
            path: path.to_path_buf(),
            message: format!("line exceeds {MAX_LINE_BYTES} bytes"),
        });
    }
    Ok(Some(line))
}

/// Recognizes `include <pattern>` and returns the pattern.
///
/// The `include` token must be followed by whitespace; `includexyz` is a
/// literal directory entry.
fn include_pattern(line: &str) -> Option<&str> {
    fn directive(input: &str) -> nom::IResult<&str, &str> {
        preceded(tag("include"), preceded(multispace1, rest)).parse(input)
    }
    match directive(line) {
        Ok((_, pattern)) => {
            let pattern = pattern.trim();
            (!pattern.is_empty()).then_some(pattern)
        }
        Err(_) => None,
    }
}

/// Processes one include directive from `including`, expanding globs.
fn include(state: &mut ConfigParseState, including: &Path, pattern: &str) -> Result<()> {
    // Relative patterns resolve against the including file's directory, not
    // the process's working directory.
    let resolved = if Path::new(pattern).is_absolute() {
        PathBuf::from(pattern)
    } else {
        including
            .parent()
            .map_or_else(|| PathBuf::from(pattern), |dir| dir.join(pattern))
    };

    let Some((dir, prefix, suffix)) = split_wildcard(&resolved) else {
        return parse_file(state, &resolved);
    };

    let entries = fs::read_dir(&dir).map_err(|source| NixcageError::Io {
        path: dir.clone(),
        source,
    })?;

    let mut matches: Vec<String> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| NixcageError::Io {
            path: dir.clone(),
            source,
        })?;
        if !is_regular_file(&entry) {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if matches_wildcard(name, &prefix, &suffix) {
            matches.push(name.to_owned());
        }
    }
    matches.sort();

    for name in matches {
        parse_file(state, &dir.join(name))?;
    }
    Ok(())
}

/// Splits a pattern whose basename contains `*` into
/// `(directory, prefix, suffix)`. Returns `None` for literal patterns.
fn split_wildcard(pattern: &Path) -> Option<(PathBuf, String, String)> {
    let basename = pattern.file_name()?.to_str()?;
    let (prefix, suffix) = basename.split_once('*')?;
    let dir = pattern
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    Some((dir, prefix.to_owned(), suffix.to_owned()))
}

/// `prefix*suffix` matching: the candidate must be at least as long as both
/// fragments combined and start/end with them respectively.
fn matches_wildcard(name: &str, prefix: &str, suffix: &str) -> bool {
    name.len() >= prefix.len() + suffix.len()
        && name.starts_with(prefix)
        && name.ends_with(suffix)
}

/// Directory-entry type check with a stat fallback for filesystems that
/// report unknown types.
fn is_regular_file(entry: &fs::DirEntry) -> bool {
    match entry.file_type() {
        Ok(file_type) => file_type.is_file(),
        Err(_) => fs::metadata(entry.path()).is_ok_and(|meta| meta.is_file()),
    }
}
