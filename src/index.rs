//! Ordered, deduplicated value indexes.
//!
//! A [`ValueIndex`] keeps the first occurrence of each value and drops missing
//! entries (`None`, empty or whitespace-only strings). Every set operation keeps
//! the order of the left-hand index, so results are deterministic for a given input.

use std::collections::HashSet;

use serde::{Serialize, Serializer};

use crate::synonyms::SynonymMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueIndex {
    values: Vec<String>,
    seen: HashSet<String>,
}

impl ValueIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from values that may be missing.
    pub fn from_optional<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        let mut index = Self::new();
        for value in values.into_iter().flatten() {
            index.push(value.into());
        }
        index
    }

    /// Appends `value` unless it is missing or already present. Returns whether it was added.
    pub fn push(&mut self, value: String) -> bool {
        if value.trim().is_empty() || self.seen.contains(&value) {
            return false;
        }
        self.seen.insert(value.clone());
        self.values.push(value);
        true
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, value: &str) -> bool {
        self.seen.contains(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.values
    }

    pub fn into_vec(self) -> Vec<String> {
        self.values
    }

    /// Values of `self` that are present in `other`.
    pub fn intersection<'a, I>(&self, other: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let other = other.into_iter().collect::<HashSet<_>>();
        self.iter()
            .filter(|value| other.contains(value))
            .map(str::to_string)
            .collect()
    }

    /// Values of `self` that are absent from `other`.
    pub fn difference<'a, I>(&self, other: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let other = other.into_iter().collect::<HashSet<_>>();
        self.iter()
            .filter(|value| !other.contains(value))
            .map(str::to_string)
            .collect()
    }

    /// Values of `self` followed by the values of `other` not already present.
    pub fn union(&self, other: &ValueIndex) -> Self {
        self.iter().chain(other.iter()).map(str::to_string).collect()
    }

    /// Replaces every value that has a synonym mapping with its canonical form.
    /// A canonical value that is already present keeps its earlier position.
    pub fn rename(&self, mapping: &SynonymMap) -> Self {
        if mapping.is_empty() {
            return self.clone();
        }
        self.iter()
            .map(|value| mapping.get(value).unwrap_or(value).to_string())
            .collect()
    }
}

impl<S: Into<String>> FromIterator<S> for ValueIndex {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::from_optional(iter.into_iter().map(Some))
    }
}

impl Serialize for ValueIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.values)
    }
}

impl<'a> IntoIterator for &'a ValueIndex {
    type Item = &'a str;
    type IntoIter = std::iter::Map<std::slice::Iter<'a, String>, fn(&'a String) -> &'a str>;

    fn into_iter(self) -> Self::IntoIter {
        self.values
            .iter()
            .map(String::as_str as fn(&'a String) -> &'a str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_missing_and_duplicate_values() {
        let index = ValueIndex::from_optional(vec![
            Some("A"),
            None,
            Some(""),
            Some("B"),
            Some("A"),
            Some("  "),
        ]);
        assert_eq!(index.as_slice(), ["A", "B"]);
    }

    #[test]
    fn indexing_is_idempotent() {
        let index: ValueIndex = ["b", "a", "b", "c", "a"].into_iter().collect();
        let again: ValueIndex = index.iter().collect();
        assert_eq!(index, again);
    }

    #[test]
    fn set_operations_keep_left_order() {
        let index: ValueIndex = ["c", "a", "b"].into_iter().collect();
        assert_eq!(index.intersection(["b", "c"]).as_slice(), ["c", "b"]);
        assert_eq!(index.difference(["a"]).as_slice(), ["c", "b"]);

        let other: ValueIndex = ["b", "d"].into_iter().collect();
        assert_eq!(index.union(&other).as_slice(), ["c", "a", "b", "d"]);
    }

    #[test]
    fn rename_collapses_onto_existing_canonical() {
        let index: ValueIndex = ["T cell", "T-cell", "B cell"].into_iter().collect();
        let mapping = SynonymMap::from_pairs([("T-cell", "T cell")]);
        assert_eq!(index.rename(&mapping).as_slice(), ["T cell", "B cell"]);
    }
}
