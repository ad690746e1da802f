use std::collections::HashSet;
use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{FieldValue, Record, TypeRegistry, split_synonyms};
use crate::error::RegistryError;

/// One condition of a [`Filter`].
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// `field__in=[...]`
    In { field: String, values: Vec<String> },
    /// `field__iexact__in=[...]`, values lowercased.
    InIgnoreCase { field: String, values: Vec<String> },
    /// `field=value`
    Eq { field: String, value: FieldValue },
    /// Field holds at least one synonym.
    HasSynonyms(String),
    /// Record belongs to the named scope (organism).
    Scope(String),
}

impl Lookup {
    fn matches(&self, record: &Record) -> bool {
        match self {
            Lookup::In { field, values } => record
                .key(field)
                .map(|key| values.iter().any(|value| *value == key))
                .unwrap_or(false),
            Lookup::InIgnoreCase { field, values } => record
                .key(field)
                .map(|key| values.contains(&key.to_lowercase()))
                .unwrap_or(false),
            Lookup::Eq { field, value } => record.get(field) == Some(value),
            Lookup::HasSynonyms(field) => record
                .get(field)
                .is_some_and(|value| !split_synonyms(value).is_empty()),
            Lookup::Scope(scope) => record.scope.as_deref() == Some(scope.as_str()),
        }
    }
}

/// Conjunction of lookups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    lookups: Vec<Lookup>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field_in<I, S>(mut self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lookups.push(Lookup::In {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn field_in_ignore_case<I, S>(mut self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.lookups.push(Lookup::InIgnoreCase {
            field: field.to_string(),
            values: values
                .into_iter()
                .map(|value| value.as_ref().to_lowercase())
                .collect(),
        });
        self
    }

    pub fn has_synonyms(mut self, field: &str) -> Self {
        self.lookups.push(Lookup::HasSynonyms(field.to_string()));
        self
    }

    pub fn field_eq(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.lookups.push(Lookup::Eq {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn scope(mut self, scope: Option<&str>) -> Self {
        if let Some(scope) = scope {
            self.lookups.push(Lookup::Scope(scope.to_string()));
        }
        self
    }

    pub fn lookups(&self) -> &[Lookup] {
        &self.lookups
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.lookups.iter().all(|lookup| lookup.matches(record))
    }
}

/// Result of a store query, in store order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    records: Vec<Record>,
}

impl RecordSet {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn list(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Values of `field` actually present in the set, flattened.
    pub fn values(&self, field: &str) -> Vec<String> {
        self.records
            .iter()
            .filter_map(|record| record.key(field))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Persistent registry of records.
///
/// Implementations must reject a second persisted record carrying the same value
/// in a unique field.
pub trait RecordStore {
    fn filter(&self, record_type: &str, filter: &Filter) -> Result<RecordSet, RegistryError>;

    /// Records matching any of `filters`, each record at most once.
    fn filter_any(&self, record_type: &str, filters: &[Filter]) -> Result<RecordSet, RegistryError> {
        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for filter in filters {
            for record in self.filter(record_type, filter)?.into_records() {
                match record.id {
                    Some(id) if !seen.insert(id) => {}
                    _ => records.push(record),
                }
            }
        }
        Ok(RecordSet::new(records))
    }

    /// Persists transient records, returning them with ids assigned.
    fn insert(
        &mut self,
        types: &TypeRegistry,
        records: Vec<Record>,
    ) -> Result<Vec<Record>, RegistryError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    #[serde(default)]
    records: Vec<Record>,
    #[serde(default)]
    next_id: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn check_unique(&self, types: &TypeRegistry, batch: &[Record]) -> Result<(), RegistryError> {
        let mut taken = HashSet::new();
        for record in &self.records {
            let Ok(record_type) = types.get(&record.record_type) else {
                continue;
            };
            for field in record_type.unique_fields() {
                if let Some(key) = record.key(&field.name) {
                    taken.insert((record.record_type.clone(), field.name.clone(), key));
                }
            }
        }
        for record in batch {
            let record_type = types.get(&record.record_type)?;
            for field in record_type.unique_fields() {
                let Some(key) = record.key(&field.name) else {
                    continue;
                };
                if !taken.insert((record.record_type.clone(), field.name.clone(), key.clone())) {
                    return Err(RegistryError::StoreConflict {
                        record_type: record.record_type.clone(),
                        field: field.name.clone(),
                        value: key,
                    });
                }
            }
        }
        Ok(())
    }
}

impl RecordStore for MemoryStore {
    fn filter(&self, record_type: &str, filter: &Filter) -> Result<RecordSet, RegistryError> {
        debug!(record_type, lookups = filter.lookups().len(), "querying record store");
        let records = self
            .records
            .iter()
            .filter(|record| record.record_type == record_type && filter.matches(record))
            .cloned()
            .collect();
        Ok(RecordSet::new(records))
    }

    fn insert(
        &mut self,
        types: &TypeRegistry,
        records: Vec<Record>,
    ) -> Result<Vec<Record>, RegistryError> {
        self.check_unique(types, &records)?;
        let created_at = Utc::now().to_rfc3339();
        let mut saved = Vec::with_capacity(records.len());
        for mut record in records {
            self.next_id += 1;
            record.id = Some(self.next_id);
            record.created_at = Some(created_at.clone());
            self.records.push(record.clone());
            saved.push(record);
        }
        Ok(saved)
    }
}

/// [`MemoryStore`] persisted to a JSON file after every insert. Queries read the
/// state loaded at open or at the last insert.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: Utf8PathBuf,
    inner: MemoryStore,
}

impl JsonStore {
    /// Opens the store at `path`; a missing file is an empty store.
    pub fn open(path: &Utf8Path) -> Result<Self, RegistryError> {
        Ok(Self {
            path: path.to_path_buf(),
            inner: Self::load(path)?,
        })
    }

    fn load(path: &Utf8Path) -> Result<MemoryStore, RegistryError> {
        if !path.as_std_path().exists() {
            return Ok(MemoryStore::new());
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| RegistryError::Filesystem(err.to_string()))?;
        serde_json::from_str(&content)
            .map_err(|err| RegistryError::StoreQuery(format!("{path}: {err}")))
    }

    pub fn default_path() -> Result<Utf8PathBuf, RegistryError> {
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(
                    dirs.home_dir()
                        .join(".cache")
                        .join("bionty-registry")
                        .join("store.json"),
                )
                .ok()
            })
            .ok_or_else(|| RegistryError::Filesystem("unable to resolve cache directory".to_string()))
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn records(&self) -> &[Record] {
        self.inner.records()
    }

    fn persist(&self, snapshot: &MemoryStore) -> Result<(), RegistryError> {
        let content = serde_json::to_vec_pretty(snapshot)
            .map_err(|err| RegistryError::Filesystem(err.to_string()))?;
        write_bytes_atomic(&self.path, &content)
    }
}

impl RecordStore for JsonStore {
    fn filter(&self, record_type: &str, filter: &Filter) -> Result<RecordSet, RegistryError> {
        self.inner.filter(record_type, filter)
    }

    fn insert(
        &mut self,
        types: &TypeRegistry,
        records: Vec<Record>,
    ) -> Result<Vec<Record>, RegistryError> {
        // Re-read so that records written by other handles count for uniqueness.
        let mut next = Self::load(&self.path)?;
        let saved = next.insert(types, records)?;
        self.persist(&next)?;
        self.inner = next;
        Ok(saved)
    }
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), RegistryError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or(Utf8Path::new("."));
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| RegistryError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix("bionty-store")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| RegistryError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| RegistryError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| RegistryError::Filesystem(err.to_string()))?;
    Ok(())
}
