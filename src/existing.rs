//! Lookup of values that already exist in the record store.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::domain::{FieldRef, FieldValue, Record, RecordType, SCOPE_RECORD_TYPE};
use crate::error::RegistryError;
use crate::index::ValueIndex;
use crate::store::{Filter, RecordStore};
use crate::synonyms::{SynonymMap, SynonymTable};

/// Split of input values into records found in the store and values still unresolved.
#[derive(Debug, Clone, Default)]
pub struct ExistingPartition {
    pub records: Vec<Record>,
    /// Resolved values that matched no stored record.
    pub remaining: ValueIndex,
    /// Input values after store synonyms were applied.
    pub resolved: ValueIndex,
    pub synonyms: SynonymMap,
    pub field_matches: usize,
    pub synonym_matches: usize,
}

/// Resolves a scope name to exactly one scope record.
pub fn resolve_scope<S: RecordStore>(store: &S, scope: &str) -> Result<Record, RegistryError> {
    let matches = store
        .filter(SCOPE_RECORD_TYPE, &Filter::new().field_eq("name", scope))?
        .into_records();
    match <[Record; 1]>::try_from(matches) {
        Ok([record]) => Ok(record),
        Err(matches) => Err(RegistryError::AmbiguousScope {
            scope: scope.to_string(),
            matches: matches.len(),
        }),
    }
}

/// Synonym mapping of `values` against the synonyms of stored records of the field's type.
///
/// Empty unless `field` is the type's name field. Only records that carry synonyms
/// or whose name equals one of `values` ignoring case are read.
pub fn resolve_store_synonyms<S: RecordStore>(
    store: &S,
    field: &FieldRef,
    values: &ValueIndex,
    scope: Option<&str>,
) -> Result<SynonymMap, RegistryError> {
    let record_type = field.record_type();
    let field_name = field.field_name();
    let Some(synonyms_field) = record_type.synonyms_field.as_deref() else {
        return Ok(SynonymMap::default());
    };
    if !record_type.resolves_synonyms_for(field_name) || values.is_empty() {
        return Ok(SynonymMap::default());
    }
    let filters = [
        Filter::new().has_synonyms(synonyms_field).scope(scope),
        Filter::new()
            .field_in_ignore_case(field_name, values.iter())
            .scope(scope),
    ];
    let mut candidates = store.filter_any(&record_type.name, &filters)?.into_records();
    // Store order decides which canonical name owns a shared synonym.
    candidates.sort_by_key(|record| record.id);
    let table = SynonymTable::from_records(&candidates, field_name, synonyms_field);
    Ok(table.map_synonyms(values))
}

/// Stored records whose `field` equals one of `values`, without synonym mapping.
pub fn records_with_values<S: RecordStore>(
    store: &S,
    field: &FieldRef,
    values: &ValueIndex,
    scope: Option<&str>,
) -> Result<Vec<Record>, RegistryError> {
    if values.is_empty() {
        return Ok(Vec::new());
    }
    let filter = Filter::new()
        .field_in(field.field_name(), values.iter())
        .scope(scope);
    Ok(store
        .filter(&field.record_type().name, &filter)?
        .into_records())
}

/// Partitions `values` into stored records and remaining values.
///
/// `scope` must already be resolved to an existing scope record name.
pub fn partition_existing<S: RecordStore>(
    store: &S,
    field: &FieldRef,
    values: &ValueIndex,
    scope: Option<&str>,
) -> Result<ExistingPartition, RegistryError> {
    if values.is_empty() {
        return Ok(ExistingPartition::default());
    }
    let record_type = field.record_type();
    let field_name = field.field_name();

    let synonyms = resolve_store_synonyms(store, field, values, scope)?;
    let resolved = synonyms.apply(values);

    let filter = Filter::new()
        .field_in(field_name, resolved.iter())
        .scope(scope);
    debug!(
        record_type = %record_type.name,
        field = field_name,
        values = resolved.len(),
        "looking up existing records"
    );
    let found = store.filter(&record_type.name, &filter)?;

    let found_values = found.values(field_name);
    let existing = resolved.intersection(found_values.iter().map(String::as_str));
    let remaining = resolved.difference(existing.iter());

    let synonym_only = synonym_only_values(values, &synonyms);
    let records = found.into_records();
    let synonym_matches = records
        .iter()
        .filter(|record| {
            record
                .key(field_name)
                .is_some_and(|key| synonym_only.contains(key.as_str()))
        })
        .count();

    Ok(ExistingPartition {
        field_matches: records.len() - synonym_matches,
        synonym_matches,
        records,
        remaining,
        resolved,
        synonyms,
    })
}

/// Canonical values reached only through a synonym, not given directly.
pub(crate) fn synonym_only_values<'a>(
    values: &ValueIndex,
    synonyms: &'a SynonymMap,
) -> HashSet<&'a str> {
    synonyms
        .canonical_values()
        .into_iter()
        .filter(|canonical| !values.contains(canonical))
        .collect()
}

/// Stored records matching any of `rows`, where each row is a set of field equalities.
pub fn existing_by_fields<S: RecordStore>(
    store: &S,
    record_type: &RecordType,
    rows: &[BTreeMap<String, FieldValue>],
    scope: Option<&str>,
) -> Result<Vec<Record>, RegistryError> {
    let mut filters = Vec::with_capacity(rows.len());
    for row in rows {
        let mut filter = Filter::new();
        for (field, value) in row {
            if !record_type.has_field(field) {
                return Err(RegistryError::Validation(format!(
                    "{} has no field {field:?}",
                    record_type.display_name
                )));
            }
            filter = filter.field_eq(field, value.clone());
        }
        filters.push(filter.scope(scope));
    }
    if filters.is_empty() {
        return Ok(Vec::new());
    }
    Ok(store.filter_any(&record_type.name, &filters)?.into_records())
}
