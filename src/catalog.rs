//! Reference catalogs: versioned, read-only ontology tables.
//!
//! A catalog file is a JSON document `{"source": {...}, "rows": [...]}` stored as
//! `<entity>.json` or `<entity>-<organism>.json`, optionally gzip-compressed with a
//! `.gz` suffix. Rows are ordered by preference; when a key occurs twice the later
//! row wins.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io::Read;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{CatalogSource, FieldValue, RecordType, SYNONYMS_FIELD, value_key};
use crate::error::RegistryError;
use crate::synonyms::SynonymTable;

pub type CatalogRow = BTreeMap<String, FieldValue>;

/// Columns kept on projection even though they are relationships, not declared fields.
pub const STRUCTURAL_FIELDS: &[&str] = &["parents"];

/// Catalog column names that differ from record field names.
pub const COLUMN_RENAMES: &[(&str, &str)] = &[("definition", "description")];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub source: CatalogSource,
    #[serde(default)]
    pub rows: Vec<CatalogRow>,
}

impl CatalogSnapshot {
    pub fn new(source: CatalogSource, rows: Vec<CatalogRow>) -> Self {
        Self { source, rows }
    }

    pub fn columns(&self) -> BTreeSet<&str> {
        self.rows
            .iter()
            .flat_map(|row| row.keys().map(String::as_str))
            .collect()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.rows.iter().any(|row| row.contains_key(column))
    }

    /// Keeps only the columns `record_type` declares plus [`STRUCTURAL_FIELDS`],
    /// after applying [`COLUMN_RENAMES`].
    pub fn project(&self, record_type: &RecordType) -> CatalogSnapshot {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|(column, value)| (renamed(column), value))
                    .filter(|(column, _)| {
                        record_type.has_field(column) || STRUCTURAL_FIELDS.contains(column)
                    })
                    .map(|(column, value)| (column.to_string(), value.clone()))
                    .collect()
            })
            .collect();
        CatalogSnapshot::new(self.source.clone(), rows)
    }

    /// Values of `column` in row order.
    pub fn column_values(&self, column: &str) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.get(column).and_then(value_key))
            .collect()
    }

    /// Rows keyed by `column`; for duplicate keys the last row is kept.
    pub fn rows_by_key(&self, column: &str) -> HashMap<String, &CatalogRow> {
        let mut keyed = HashMap::new();
        for row in &self.rows {
            if let Some(key) = row.get(column).and_then(value_key) {
                keyed.insert(key, row);
            }
        }
        keyed
    }

    /// The catalog's own synonym table over `target_field`, or `None` when the
    /// catalog carries no synonyms column.
    pub fn synonym_table(&self, target_field: &str) -> Option<SynonymTable> {
        if !self.has_column(SYNONYMS_FIELD) {
            return None;
        }
        Some(SynonymTable::from_rows(
            &self.rows,
            target_field,
            SYNONYMS_FIELD,
        ))
    }
}

fn renamed(column: &str) -> &str {
    COLUMN_RENAMES
        .iter()
        .find(|(from, _)| *from == column)
        .map(|(_, to)| *to)
        .unwrap_or(column)
}

pub trait CatalogProvider {
    /// Snapshot of `entity`, sliced by `organism` when given. `Ok(None)` means the
    /// catalog has no data for this entity/organism.
    fn snapshot(
        &self,
        entity: &str,
        organism: Option<&str>,
    ) -> Result<Option<CatalogSnapshot>, RegistryError>;
}

/// Provider without any catalog data.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCatalog;

impl CatalogProvider for NoCatalog {
    fn snapshot(
        &self,
        _entity: &str,
        _organism: Option<&str>,
    ) -> Result<Option<CatalogSnapshot>, RegistryError> {
        Ok(None)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    snapshots: HashMap<(String, Option<String>), CatalogSnapshot>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `snapshot` under its source entity and organism.
    pub fn insert(&mut self, snapshot: CatalogSnapshot) {
        let key = (
            snapshot.source.entity.clone(),
            snapshot.source.organism.clone(),
        );
        self.snapshots.insert(key, snapshot);
    }

    pub fn with(mut self, snapshot: CatalogSnapshot) -> Self {
        self.insert(snapshot);
        self
    }
}

impl CatalogProvider for MemoryCatalog {
    fn snapshot(
        &self,
        entity: &str,
        organism: Option<&str>,
    ) -> Result<Option<CatalogSnapshot>, RegistryError> {
        let key = (entity.to_string(), organism.map(str::to_string));
        Ok(self.snapshots.get(&key).cloned())
    }
}

/// Catalog files in a directory.
#[derive(Debug, Clone)]
pub struct FileCatalog {
    root: Utf8PathBuf,
}

impl FileCatalog {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn file_stem(entity: &str, organism: Option<&str>) -> String {
        match organism {
            Some(organism) => format!("{entity}-{organism}"),
            None => entity.to_string(),
        }
    }

    fn locate(&self, entity: &str, organism: Option<&str>) -> Option<Utf8PathBuf> {
        let stem = Self::file_stem(entity, organism);
        [format!("{stem}.json"), format!("{stem}.json.gz")]
            .into_iter()
            .map(|name| self.root.join(name))
            .find(|path| path.as_std_path().is_file())
    }
}

impl CatalogProvider for FileCatalog {
    fn snapshot(
        &self,
        entity: &str,
        organism: Option<&str>,
    ) -> Result<Option<CatalogSnapshot>, RegistryError> {
        let Some(path) = self.locate(entity, organism) else {
            debug!(entity, ?organism, root = %self.root, "no catalog file");
            return Ok(None);
        };
        debug!(%path, "reading catalog");
        let content = read_catalog_file(&path)?;
        let snapshot = serde_json::from_str(&content)
            .map_err(|err| RegistryError::CatalogParse(format!("{path}: {err}")))?;
        Ok(Some(snapshot))
    }
}

fn read_catalog_file(path: &Utf8Path) -> Result<String, RegistryError> {
    let bytes = fs::read(path.as_std_path())
        .map_err(|err| RegistryError::CatalogRead(format!("{path}: {err}")))?;
    if path.extension() != Some("gz") {
        return String::from_utf8(bytes)
            .map_err(|err| RegistryError::CatalogRead(format!("{path}: {err}")));
    }
    let mut content = String::new();
    GzDecoder::new(bytes.as_slice())
        .read_to_string(&mut content)
        .map_err(|err| RegistryError::CatalogRead(format!("{path}: {err}")))?;
    Ok(content)
}
