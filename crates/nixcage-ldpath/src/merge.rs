//! Search-path merging.
//!
//! Combines the interpreter directory, the existing environment value, and
//! the resolved directories into one colon-joined string, de-duplicated by
//! exact string equality with first occurrence winning.

use nixcage_common::strset::OrderedStringSet;

/// Merges the three search-path sources in precedence order: interpreter
/// directory first, then each non-empty segment of the existing
/// colon-separated environment value, then every resolved directory not
/// already present.
///
/// Returns `None` when the merge is empty, so callers leave the environment
/// untouched rather than setting an empty string.
#[must_use]
pub fn merge(
    interp_dir: Option<&str>,
    existing: Option<&str>,
    resolved: &OrderedStringSet,
) -> Option<String> {
    let mut entries = OrderedStringSet::new();

    if let Some(dir) = interp_dir {
        let _ = entries.insert(dir);
    }
    if let Some(existing) = existing {
        for segment in existing.split(':').filter(|segment| !segment.is_empty()) {
            let _ = entries.insert(segment);
        }
    }
    entries.extend_from(resolved);

    if entries.is_empty() {
        None
    } else {
        Some(entries.join(":"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(dirs: &[&str]) -> OrderedStringSet {
        dirs.iter().copied().collect()
    }

    #[test]
    fn interp_then_env_then_resolved() {
        let merged = merge(
            Some("/lib64"),
            Some("/opt/x:/opt/y"),
            &resolved(&["/opt/y", "/opt/z"]),
        );
        assert_eq!(merged.as_deref(), Some("/lib64:/opt/x:/opt/y:/opt/z"));
    }

    #[test]
    fn empty_env_segments_are_ignored() {
        let merged = merge(None, Some("::/opt/x::"), &resolved(&["/opt/y"]));
        assert_eq!(merged.as_deref(), Some("/opt/x:/opt/y"));
    }

    #[test]
    fn first_occurrence_wins_across_sources() {
        let merged = merge(
            Some("/shared"),
            Some("/shared:/env"),
            &resolved(&["/env", "/shared", "/new"]),
        );
        assert_eq!(merged.as_deref(), Some("/shared:/env:/new"));
    }

    #[test]
    fn empty_merge_yields_none() {
        assert_eq!(merge(None, None, &OrderedStringSet::new()), None);
        assert_eq!(merge(None, Some(""), &OrderedStringSet::new()), None);
        assert_eq!(merge(None, Some(":::"), &OrderedStringSet::new()), None);
    }

    #[test]
    fn resolved_only() {
        let merged = merge(None, None, &resolved(&["/usr/lib", "/lib"]));
        assert_eq!(merged.as_deref(), Some("/usr/lib:/lib"));
    }

    #[test]
    fn interp_only() {
        let merged = merge(Some("/lib64"), None, &OrderedStringSet::new());
        assert_eq!(merged.as_deref(), Some("/lib64"));
    }
}
