//! Synonym tables and the mappings they produce.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::domain::{FieldValue, Record, split_synonyms, value_key};
use crate::index::ValueIndex;

/// Alternate name -> canonical name, restricted to the values that were looked up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SynonymMap(BTreeMap<String, String>);

impl SynonymMap {
    pub fn from_pairs<I, A, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, C)>,
        A: Into<String>,
        C: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(alt, canonical)| (alt.into(), canonical.into()))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, alt: &str) -> Option<&str> {
        self.0.get(alt).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(alt, canonical)| (alt.as_str(), canonical.as_str()))
    }

    /// Canonical names that are targeted by at least one alternate name.
    pub fn canonical_values(&self) -> HashSet<&str> {
        self.0.values().map(String::as_str).collect()
    }

    /// Rewrites `values` through this mapping. A no-op for an empty mapping.
    pub fn apply(&self, values: &ValueIndex) -> ValueIndex {
        values.rename(self)
    }
}

/// Lookup table built from the synonyms of a set of records or catalog rows.
///
/// Alternate names match case-insensitively. Canonical names also match their own
/// case variants ("t cell" -> "T cell"). When an alternate name belongs to several
/// canonical names the first one registered wins.
#[derive(Debug, Clone, Default)]
pub struct SynonymTable {
    by_alt: HashMap<String, String>,
    canonical: HashSet<String>,
}

impl SynonymTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<I, S>(&mut self, canonical: &str, synonyms: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if canonical.trim().is_empty() {
            return;
        }
        self.canonical.insert(canonical.to_string());
        self.by_alt
            .entry(canonical.to_lowercase())
            .or_insert_with(|| canonical.to_string());
        for synonym in synonyms {
            self.by_alt
                .entry(synonym.as_ref().to_lowercase())
                .or_insert_with(|| canonical.to_string());
        }
    }

    /// Table over `target_field` of `records`, reading synonyms from `synonyms_field`.
    pub fn from_records(records: &[Record], target_field: &str, synonyms_field: &str) -> Self {
        let mut table = Self::new();
        for record in records {
            if let Some(canonical) = record.key(target_field) {
                let synonyms = record.get(synonyms_field).map(split_synonyms);
                table.insert(&canonical, synonyms.unwrap_or_default());
            }
        }
        table
    }

    /// Table over catalog rows, same semantics as [`SynonymTable::from_records`].
    pub fn from_rows<'a, I>(rows: I, target_field: &str, synonyms_field: &str) -> Self
    where
        I: IntoIterator<Item = &'a BTreeMap<String, FieldValue>>,
    {
        let mut table = Self::new();
        for row in rows {
            if let Some(canonical) = row.get(target_field).and_then(value_key) {
                let synonyms = row.get(synonyms_field).map(split_synonyms);
                table.insert(&canonical, synonyms.unwrap_or_default());
            }
        }
        table
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }

    /// Mapping for the values of `values` whose canonical form differs from themselves.
    /// Values that are already canonical never appear in the mapping.
    pub fn map_synonyms(&self, values: &ValueIndex) -> SynonymMap {
        let pairs = values.iter().filter_map(|value| {
            if self.canonical.contains(value) {
                return None;
            }
            self.by_alt
                .get(&value.to_lowercase())
                .filter(|canonical| canonical.as_str() != value)
                .map(|canonical| (value.to_string(), canonical.clone()))
        });
        SynonymMap::from_pairs(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SynonymTable {
        let mut table = SynonymTable::new();
        table.insert("T cell", ["T-cell", "T lymphocyte"]);
        table.insert("hepatocyte", ["liver cell"]);
        table
    }

    #[test]
    fn maps_alternate_names_case_insensitively() {
        let values: ValueIndex = ["t-CELL", "liver cell", "neuron"].into_iter().collect();
        let mapping = table().map_synonyms(&values);
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.get("t-CELL"), Some("T cell"));
        assert_eq!(mapping.get("liver cell"), Some("hepatocyte"));
    }

    #[test]
    fn canonical_values_map_to_nothing() {
        let values: ValueIndex = ["T cell", "hepatocyte"].into_iter().collect();
        assert!(table().map_synonyms(&values).is_empty());
    }

    #[test]
    fn case_variant_of_canonical_is_mapped() {
        let values: ValueIndex = ["t cell"].into_iter().collect();
        assert_eq!(table().map_synonyms(&values).get("t cell"), Some("T cell"));
    }

    #[test]
    fn first_canonical_wins_for_shared_synonym() {
        let mut table = SynonymTable::new();
        table.insert("A", ["shared"]);
        table.insert("B", ["shared"]);
        let values: ValueIndex = ["shared"].into_iter().collect();
        assert_eq!(table.map_synonyms(&values).get("shared"), Some("A"));
    }

    #[test]
    fn empty_mapping_leaves_values_untouched() {
        let values: ValueIndex = ["x", "y"].into_iter().collect();
        let mapping = SynonymMap::default();
        assert_eq!(mapping.apply(&values), values);
    }
}
