use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::CatalogProvider;
use crate::domain::{FieldRef, FieldValue, Record, RecordType, TypeRegistry};
use crate::error::RegistryError;
use crate::existing::{
    existing_by_fields, partition_existing, records_with_values, resolve_scope,
};
use crate::features::FeatureInput;
use crate::from_catalog::{CatalogPartition, resolve_from_catalog};
use crate::index::ValueIndex;
use crate::report::{Report, StageCounts};
use crate::settings::{Settings, SettingsCell};
use crate::store::{Filter, RecordStore};

#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Look up values unknown to the store in the reference catalog.
    pub from_catalog: bool,
    /// Organism name; falls back to the registry default for scoped types.
    pub scope: Option<String>,
    /// Fields set on every newly created record.
    pub extra: BTreeMap<String, FieldValue>,
}

impl ResolveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_catalog(mut self) -> Self {
        self.from_catalog = true;
        self
    }

    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = Some(scope.to_string());
        self
    }

    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.extra.insert(name.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolveOutcome {
    /// Existing records first, then catalog-derived records, then bare records.
    pub records: Vec<Record>,
    pub report: Report,
}

impl ResolveOutcome {
    pub fn existing(&self) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(|record| record.is_persisted())
    }

    pub fn created(&self) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(|record| !record.is_persisted())
    }
}

pub struct Registry<S: RecordStore, C: CatalogProvider> {
    store: S,
    catalog: C,
    types: TypeRegistry,
    default_scope: Option<String>,
    settings: SettingsCell,
}

impl<S: RecordStore, C: CatalogProvider> Registry<S, C> {
    pub fn new(store: S, catalog: C) -> Self {
        Self {
            store,
            catalog,
            types: TypeRegistry::builtin(),
            default_scope: None,
            settings: SettingsCell::default(),
        }
    }

    pub fn with_types(mut self, types: TypeRegistry) -> Self {
        self.types = types;
        self
    }

    pub fn with_default_scope(mut self, scope: Option<String>) -> Self {
        self.default_scope = scope;
        self
    }

    pub fn with_settings(self, settings: Settings) -> Self {
        self.settings.set(settings);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn settings(&self) -> Settings {
        self.settings.get()
    }

    pub fn field(&self, record_type: &str, field: &str) -> Result<FieldRef, RegistryError> {
        self.types.field_ref(record_type, field)
    }

    /// Returns a record for every distinct value: stored records where they exist,
    /// otherwise new unsaved records, populated from the catalog when requested.
    ///
    /// Nothing is persisted; pass the created records to [`Registry::save`].
    pub fn get_or_create_records<I, V>(
        &self,
        values: I,
        field: &FieldRef,
        options: &ResolveOptions,
    ) -> Result<ResolveOutcome, RegistryError>
    where
        I: IntoIterator<Item = Option<V>>,
        V: Into<String>,
    {
        let _guard = self.settings.override_search_names(false);

        let record_type = field.record_type();
        let field_name = field.field_name();
        let scope = self.resolve_options_scope(record_type, field_name, options)?;

        let index = ValueIndex::from_optional(values);
        if index.is_empty() {
            return Ok(ResolveOutcome::default());
        }

        let scope = match scope {
            Some(name) => Some(
                resolve_scope(&self.store, &name)?
                    .key("name")
                    .unwrap_or(name),
            ),
            None => None,
        };
        let scope = scope.as_deref();

        let existing = partition_existing(&self.store, field, &index, scope)?;
        let mut counts = StageCounts {
            store_field: existing.field_matches,
            store_synonym: existing.synonym_matches,
            ..StageCounts::default()
        };
        let mut records = existing.records;
        let mut catalog_source = None;

        if !existing.remaining.is_empty() {
            let unmapped = if options.from_catalog {
                let from_catalog = resolve_from_catalog(
                    &self.catalog,
                    field,
                    &existing.remaining,
                    scope,
                    &options.extra,
                )?;
                let (stored, created) = self.relink_catalog_synonyms(
                    field,
                    &existing.resolved,
                    &records,
                    &from_catalog,
                    scope,
                )?;
                let dropped = from_catalog.records.len() - created.len();
                counts.store_synonym += stored.len();
                counts.catalog_field = from_catalog.field_matches;
                counts.catalog_synonym = from_catalog.synonym_matches.saturating_sub(dropped);
                catalog_source = from_catalog.source.map(|source| source.to_string());
                records.extend(stored);
                records.extend(created);
                from_catalog.unmapped
            } else {
                existing.remaining
            };

            let bare = self.create_bare(field, &unmapped, scope, &options.extra);
            counts.bare = bare.len();
            records.extend(bare);
        }

        let report = Report::from_counts(
            counts,
            &record_type.display_name,
            field_name,
            catalog_source,
        );
        report.log();
        Ok(ResolveOutcome { records, report })
    }

    /// Splits catalog records into stored records and records still to create.
    ///
    /// A catalog synonym can rewrite a value to a canonical name the store already
    /// holds. Canonical names the store stage never saw are looked up once more; names
    /// it already returned are dropped.
    fn relink_catalog_synonyms(
        &self,
        field: &FieldRef,
        checked: &ValueIndex,
        returned: &[Record],
        from_catalog: &CatalogPartition,
        scope: Option<&str>,
    ) -> Result<(Vec<Record>, Vec<Record>), RegistryError> {
        let field_name = field.field_name();
        let unchecked: ValueIndex = from_catalog
            .synonyms
            .iter()
            .map(|(_, canonical)| canonical)
            .filter(|canonical| !checked.contains(canonical))
            .collect();
        let stored = records_with_values(&self.store, field, &unchecked, scope)?;

        let known = returned
            .iter()
            .chain(&stored)
            .filter_map(|record| record.key(field_name))
            .collect::<HashSet<_>>();
        let created = from_catalog
            .records
            .iter()
            .filter(|record| {
                record
                    .key(field_name)
                    .is_none_or(|key| !known.contains(&key))
            })
            .cloned()
            .collect();
        if !stored.is_empty() {
            debug!(
                record_type = %field.record_type().name,
                relinked = stored.len(),
                "catalog synonyms matched stored records"
            );
        }
        Ok((stored, created))
    }

    fn resolve_options_scope(
        &self,
        record_type: &RecordType,
        field_name: &str,
        options: &ResolveOptions,
    ) -> Result<Option<String>, RegistryError> {
        for name in options.extra.keys() {
            if name == field_name {
                return Err(RegistryError::Validation(format!(
                    "{name:?} is the lookup field and cannot be passed as an extra field"
                )));
            }
            if !record_type.has_field(name) {
                return Err(RegistryError::Validation(format!(
                    "{} has no field {name:?}",
                    record_type.display_name
                )));
            }
        }
        if !record_type.scoped {
            if options.scope.is_some() {
                return Err(RegistryError::Validation(format!(
                    "{} records are not organism-specific, organism cannot be passed",
                    record_type.display_name
                )));
            }
            return Ok(None);
        }
        options
            .scope
            .clone()
            .or_else(|| self.default_scope.clone())
            .map(Some)
            .ok_or_else(|| {
                RegistryError::Validation(format!(
                    "{} records are organism-specific, pass an organism or set a default",
                    record_type.display_name
                ))
            })
    }

    /// One new record per value carrying only the lookup field, `scope` and `extra`.
    pub fn create_bare(
        &self,
        field: &FieldRef,
        values: &ValueIndex,
        scope: Option<&str>,
        extra: &BTreeMap<String, FieldValue>,
    ) -> Vec<Record> {
        values
            .iter()
            .map(|value| {
                let mut record = Record::new(&field.record_type().name)
                    .with_field(field.field_name(), value)
                    .with_scope(scope);
                for (name, extra_value) in extra {
                    record.set(name, extra_value.clone());
                }
                self.instantiate(field.record_type(), record)
            })
            .collect()
    }

    /// Creates one unsaved record, warning about similarly named stored records when
    /// `upon_create_search_names` is on.
    pub fn create_record(
        &self,
        record_type: &str,
        fields: BTreeMap<String, FieldValue>,
    ) -> Result<Record, RegistryError> {
        let record_type = self.types.get(record_type)?;
        if let Some(name) = fields.keys().find(|name| !record_type.has_field(name)) {
            return Err(RegistryError::Validation(format!(
                "{} has no field {name:?}",
                record_type.display_name
            )));
        }
        let mut record = Record::new(&record_type.name);
        record.fields = fields;
        Ok(self.instantiate(record_type, record))
    }

    fn instantiate(&self, record_type: &RecordType, record: Record) -> Record {
        if !self.settings.get().upon_create_search_names {
            return record;
        }
        let Some(name) = record_type
            .name_field()
            .and_then(|field| record.get_str(field))
        else {
            return record;
        };
        match self.similar_names(record_type, name) {
            Ok(similar) if !similar.is_empty() => {
                warn!(
                    record_type = %record_type.display_name,
                    name,
                    similar = ?similar,
                    "records with similar names exist, consider reusing one"
                );
            }
            Ok(_) => {}
            Err(err) => debug!(%err, "similar name search failed"),
        }
        record
    }

    /// Names of stored records whose name contains, or is contained in, `name`
    /// (case-insensitive).
    pub fn similar_names(
        &self,
        record_type: &RecordType,
        name: &str,
    ) -> Result<Vec<String>, RegistryError> {
        let Some(name_field) = record_type.name_field() else {
            return Ok(Vec::new());
        };
        let needle = name.to_lowercase();
        let stored = self.store.filter(&record_type.name, &Filter::new())?;
        let mut seen = HashSet::new();
        Ok(stored
            .values(name_field)
            .into_iter()
            .filter(|candidate| {
                let candidate = candidate.to_lowercase();
                candidate.contains(&needle) || needle.contains(&candidate)
            })
            .filter(|candidate| seen.insert(candidate.clone()))
            .collect())
    }

    /// Stored records matching any of `rows` (each a set of field equalities).
    pub fn existing_by_fields(
        &self,
        record_type: &str,
        rows: &[BTreeMap<String, FieldValue>],
        scope: Option<&str>,
    ) -> Result<Vec<Record>, RegistryError> {
        let record_type = self.types.get(record_type)?;
        let scope = match scope {
            Some(name) => {
                resolve_scope(&self.store, name)?;
                Some(name)
            }
            None => None,
        };
        existing_by_fields(&self.store, record_type, rows, scope)
    }

    /// Feature records for the names in `input`; new features from a table get their
    /// column type.
    pub fn features_from(
        &self,
        input: &FeatureInput,
        options: &ResolveOptions,
    ) -> Result<ResolveOutcome, RegistryError> {
        let field = self.field("feature", "name")?;
        let mut outcome = self.get_or_create_records(input.names(), &field, options)?;
        for record in outcome.records.iter_mut().filter(|record| !record.is_persisted()) {
            if record.get("type").is_some() {
                continue;
            }
            let dtype = record.get_str("name").and_then(|name| input.dtype(name));
            if let Some(dtype) = dtype.map(str::to_string) {
                record.set("type", dtype);
            }
        }
        Ok(outcome)
    }

    /// Persists the unsaved records among `records`. Already persisted records are
    /// returned unchanged. On a unique-field conflict nothing is persisted.
    pub fn save(&mut self, records: Vec<Record>) -> Result<Vec<Record>, RegistryError> {
        let (persisted, transient): (Vec<_>, Vec<_>) =
            records.into_iter().partition(Record::is_persisted);
        debug!(count = transient.len(), "saving records");
        let saved = self.store.insert(&self.types, transient)?;
        Ok(persisted.into_iter().chain(saved).collect())
    }
}
