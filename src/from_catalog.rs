//! Materialization of new records from the reference catalog.

use std::collections::BTreeMap;

use tracing::debug;

use crate::catalog::CatalogProvider;
use crate::domain::{CatalogSource, FieldRef, FieldValue, Record};
use crate::error::RegistryError;
use crate::existing::synonym_only_values;
use crate::index::ValueIndex;
use crate::synonyms::SynonymMap;

#[derive(Debug, Clone, Default)]
pub struct CatalogPartition {
    /// New, unsaved records in input order.
    pub records: Vec<Record>,
    /// Values the catalog did not know, after catalog synonyms were applied.
    pub unmapped: ValueIndex,
    pub synonyms: SynonymMap,
    pub source: Option<CatalogSource>,
    pub field_matches: usize,
    pub synonym_matches: usize,
}

impl CatalogPartition {
    fn passthrough(values: &ValueIndex) -> Self {
        Self {
            unmapped: values.clone(),
            ..Self::default()
        }
    }
}

/// Builds records for the values the catalog of the field's type knows about.
///
/// Types without a catalog and catalogs without data for `scope` leave every value
/// unmapped. `extra` is applied to every created record after the catalog columns.
pub fn resolve_from_catalog<C: CatalogProvider>(
    catalog: &C,
    field: &FieldRef,
    values: &ValueIndex,
    scope: Option<&str>,
    extra: &BTreeMap<String, FieldValue>,
) -> Result<CatalogPartition, RegistryError> {
    let record_type = field.record_type();
    let field_name = field.field_name();
    let Some(entity) = record_type.catalog.as_deref() else {
        return Ok(CatalogPartition::passthrough(values));
    };
    if values.is_empty() {
        return Ok(CatalogPartition::passthrough(values));
    }
    let Some(snapshot) = catalog.snapshot(entity, scope)? else {
        debug!(entity, ?scope, "catalog has no data");
        return Ok(CatalogPartition::passthrough(values));
    };

    let synonyms = snapshot
        .synonym_table(field_name)
        .filter(|_| record_type.resolves_synonyms_for(field_name))
        .map(|table| table.map_synonyms(values))
        .unwrap_or_default();
    let resolved = synonyms.apply(values);

    let projected = snapshot.project(record_type);
    let keyed = projected.rows_by_key(field_name);
    let mapped = resolved.intersection(keyed.keys().map(String::as_str));

    let mut records = Vec::with_capacity(mapped.len());
    for key in mapped.iter() {
        let Some(row) = keyed.get(key) else {
            continue;
        };
        let mut record = Record::new(&record_type.name).with_scope(scope);
        record.fields = (*row).clone();
        for (name, value) in extra {
            record.set(name, value.clone());
        }
        record.source = Some(snapshot.source.clone());
        records.push(record);
    }

    let synonym_only = synonym_only_values(values, &synonyms);
    let synonym_matches = mapped
        .iter()
        .filter(|key| synonym_only.contains(key))
        .count();

    Ok(CatalogPartition {
        field_matches: records.len() - synonym_matches,
        synonym_matches,
        unmapped: resolved.difference(mapped.iter()),
        records,
        synonyms,
        source: Some(snapshot.source),
    })
}
