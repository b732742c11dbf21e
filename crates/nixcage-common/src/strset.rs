//! Insertion-ordered set of unique strings.
//!
//! Used wherever "seen" tracking or de-duplicated accumulation is required:
//! include-cycle guards, collected search directories, and the final
//! search-path merge. Sets stay small, so membership is a linear scan.

/// An insertion-ordered collection of unique strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedStringSet {
    items: Vec<String>,
}

impl OrderedStringSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Inserts `value` unless it is already present.
    ///
    /// Returns `true` if the value was newly inserted; duplicate insertion
    /// is a no-op returning `false`. Insertion order is preserved.
    pub fn insert(&mut self, value: impl Into<String>) -> bool {
        let value = value.into();
        if self.contains(&value) {
            return false;
        }
        self.items.push(value);
        true
    }

    /// Returns `true` if `value` is present (exact string equality).
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        self.items.iter().any(|item| item == value)
    }

    /// Iterates the values in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }

    /// Number of unique values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the set holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Joins the values with `separator`, in insertion order.
    #[must_use]
    pub fn join(&self, separator: &str) -> String {
        self.items.join(separator)
    }

    /// Appends every value of `other` not already present, preserving
    /// `other`'s order.
    pub fn extend_from(&mut self, other: &Self) {
        for value in other.iter() {
            let _ = self.insert(value);
        }
    }
}

impl<S: Into<String>> FromIterator<S> for OrderedStringSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        let mut set = Self::new();
        for value in iter {
            let _ = set.insert(value);
        }
        set
    }
}
