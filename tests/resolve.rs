use std::cell::Cell;
use std::collections::{BTreeMap, HashSet};

use assert_matches::assert_matches;
use serde_json::json;

use bionty_registry::catalog::{CatalogProvider, CatalogRow, CatalogSnapshot, MemoryCatalog};
use bionty_registry::domain::{CatalogSource, Record, TypeRegistry};
use bionty_registry::error::RegistryError;
use bionty_registry::registry::{Registry, ResolveOptions};
use bionty_registry::store::{Filter, MemoryStore, RecordSet, RecordStore};

fn rows(values: Vec<serde_json::Value>) -> Vec<CatalogRow> {
    values
        .into_iter()
        .map(|value| serde_json::from_value(value).unwrap())
        .collect()
}

fn source(entity: &str, organism: Option<&str>) -> CatalogSource {
    CatalogSource {
        entity: entity.to_string(),
        organism: organism.map(str::to_string),
        source: "cl".to_string(),
        version: "2023-04-20".to_string(),
    }
}

fn cell_type_catalog() -> MemoryCatalog {
    MemoryCatalog::new().with(CatalogSnapshot::new(
        source("CellType", None),
        rows(vec![
            json!({
                "name": "T cell",
                "ontology_id": "CL:0000084",
                "synonyms": "T-cell|T lymphocyte",
                "definition": "A type of lymphocyte whose defining characteristic is the expression of a T cell receptor complex.",
                "parents": ["CL:0000542"],
            }),
            json!({
                "name": "hepatocyte",
                "ontology_id": "CL:0000182",
                "synonyms": "",
                "definition": "The main structural component of the liver.",
                "parents": ["CL:0000066"],
            }),
        ]),
    ))
}

fn store_with(records: Vec<Record>) -> MemoryStore {
    let mut store = MemoryStore::new();
    store.insert(&TypeRegistry::builtin(), records).unwrap();
    store
}

#[derive(Default)]
struct CountingStore {
    inner: MemoryStore,
    queries: Cell<usize>,
    /// Queries without any lookup, i.e. full scans of a record type.
    scans: Cell<usize>,
}

impl RecordStore for CountingStore {
    fn filter(&self, record_type: &str, filter: &Filter) -> Result<RecordSet, RegistryError> {
        self.queries.set(self.queries.get() + 1);
        if filter.lookups().is_empty() {
            self.scans.set(self.scans.get() + 1);
        }
        self.inner.filter(record_type, filter)
    }

    fn insert(
        &mut self,
        types: &TypeRegistry,
        records: Vec<Record>,
    ) -> Result<Vec<Record>, RegistryError> {
        self.inner.insert(types, records)
    }
}

#[derive(Default)]
struct CountingCatalog {
    inner: MemoryCatalog,
    lookups: Cell<usize>,
}

impl CatalogProvider for CountingCatalog {
    fn snapshot(
        &self,
        entity: &str,
        organism: Option<&str>,
    ) -> Result<Option<CatalogSnapshot>, RegistryError> {
        self.lookups.set(self.lookups.get() + 1);
        self.inner.snapshot(entity, organism)
    }
}

#[test]
fn catalog_records_and_bare_record_for_unknown_label() {
    let registry = Registry::new(MemoryStore::new(), cell_type_catalog());
    let field = registry.field("cell_type", "name").unwrap();
    let outcome = registry
        .get_or_create_records(
            ["T cell", "hepatocyte", "my new cell type"].map(Some),
            &field,
            &ResolveOptions::new().from_catalog(),
        )
        .unwrap();

    let ids = outcome
        .records
        .iter()
        .map(|record| record.get_str("ontology_id"))
        .collect::<Vec<_>>();
    assert_eq!(ids, vec![Some("CL:0000084"), Some("CL:0000182"), None]);
    assert_eq!(
        outcome.records[0].source.as_ref().map(|source| source.entity.as_str()),
        Some("CellType")
    );
    assert!(outcome.records[2].source.is_none());
    assert_eq!(outcome.records[2].get_str("name"), Some("my new cell type"));
    assert_eq!(
        outcome.records[1].get_str("description"),
        Some("The main structural component of the liver.")
    );
    assert_eq!(outcome.records[0].get("parents"), Some(&json!(["CL:0000542"])));
    assert_eq!(outcome.report.counts.catalog_field, 2);
    assert_eq!(outcome.report.counts.bare, 1);
    assert_eq!(outcome.created().count(), 3);
}

#[test]
fn lookup_by_ontology_id_skips_empty_values() {
    let registry = Registry::new(MemoryStore::new(), cell_type_catalog());
    let field = registry.field("cell_type", "ontology_id").unwrap();
    let outcome = registry
        .get_or_create_records(
            ["CL:0000084", "CL:0000182", ""].map(Some),
            &field,
            &ResolveOptions::new().from_catalog(),
        )
        .unwrap();
    let names = outcome
        .records
        .iter()
        .map(|record| record.get_str("name"))
        .collect::<Vec<_>>();
    assert_eq!(names, vec![Some("T cell"), Some("hepatocyte")]);
}

#[test]
fn store_synonym_returns_existing_record() {
    let store = store_with(vec![
        Record::new("cell_type")
            .with_field("name", "T cell")
            .with_field("ontology_id", "CL:0000084")
            .with_field("synonyms", "T-cell|T lymphocyte"),
    ]);
    let registry = Registry::new(store, cell_type_catalog());
    let field = registry.field("cell_type", "name").unwrap();
    let outcome = registry
        .get_or_create_records(
            [Some("T-cell")],
            &field,
            &ResolveOptions::new().from_catalog(),
        )
        .unwrap();

    assert_eq!(outcome.records.len(), 1);
    assert!(outcome.records[0].is_persisted());
    assert_eq!(outcome.created().count(), 0);
    assert_eq!(outcome.report.counts.store_synonym, 1);
    assert_eq!(outcome.report.counts.store_field, 0);
    assert_eq!(
        outcome.report.messages(),
        vec!["Returned 1 existing CellType records that matched synonyms"]
    );
}

#[test]
fn duplicates_produce_one_record_per_value() {
    let registry = Registry::new(MemoryStore::new(), MemoryCatalog::new());
    let field = registry.field("ulabel", "name").unwrap();
    let outcome = registry
        .get_or_create_records(["A", "A", "B"].map(Some), &field, &ResolveOptions::new())
        .unwrap();

    let names = outcome
        .records
        .iter()
        .filter_map(|record| record.get_str("name"))
        .collect::<Vec<_>>();
    assert_eq!(names.len(), 2);
    assert_eq!(names.iter().collect::<HashSet<_>>().len(), 2);
}

#[test]
fn synonym_and_canonical_in_one_batch_collapse() {
    let registry = Registry::new(MemoryStore::new(), cell_type_catalog());
    let field = registry.field("cell_type", "name").unwrap();
    let outcome = registry
        .get_or_create_records(
            ["T-cell", "T cell"].map(Some),
            &field,
            &ResolveOptions::new().from_catalog(),
        )
        .unwrap();
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].get_str("name"), Some("T cell"));
    assert_eq!(outcome.report.counts.catalog_field, 1);
    assert_eq!(outcome.report.counts.catalog_synonym, 0);
}

#[test]
fn catalog_synonym_is_reported_after_field_matches() {
    let registry = Registry::new(MemoryStore::new(), cell_type_catalog());
    let field = registry.field("cell_type", "name").unwrap();
    let outcome = registry
        .get_or_create_records(
            ["hepatocyte", "T lymphocyte"].map(Some),
            &field,
            &ResolveOptions::new().from_catalog(),
        )
        .unwrap();
    assert_eq!(
        outcome.report.messages(),
        vec![
            "Created 1 CellType records from catalog that matched name field, linked to cl 2023-04-20 (CellType)",
            "Created 1 CellType records from catalog that matched synonyms, linked to cl 2023-04-20 (CellType)",
        ]
    );
}

#[test]
fn duplicate_catalog_rows_resolve_to_the_last_row() {
    let catalog = MemoryCatalog::new().with(CatalogSnapshot::new(
        source("CellType", None),
        rows(vec![
            json!({"name": "T cell", "ontology_id": "CL:9999999", "definition": "outdated"}),
            json!({"name": "T cell", "ontology_id": "CL:0000084", "definition": "current"}),
        ]),
    ));
    let registry = Registry::new(MemoryStore::new(), catalog);
    let field = registry.field("cell_type", "name").unwrap();
    let outcome = registry
        .get_or_create_records(
            [Some("T cell")],
            &field,
            &ResolveOptions::new().from_catalog(),
        )
        .unwrap();

    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].get_str("ontology_id"), Some("CL:0000084"));
    assert_eq!(outcome.records[0].get_str("description"), Some("current"));
}

#[test]
fn empty_input_issues_no_queries() {
    let registry = Registry::new(CountingStore::default(), CountingCatalog::default());
    let field = registry.field("cell_type", "name").unwrap();
    let options = ResolveOptions::new().from_catalog();

    let outcome = registry
        .get_or_create_records(Vec::<Option<String>>::new(), &field, &options)
        .unwrap();
    assert!(outcome.records.is_empty());
    assert!(outcome.report.lines.is_empty());

    let outcome = registry
        .get_or_create_records([None, Some(""), Some("  ")], &field, &options)
        .unwrap();
    assert!(outcome.records.is_empty());

    assert_eq!(registry.store().queries.get(), 0);
    assert_eq!(registry.catalog().lookups.get(), 0);
}

#[test]
fn unknown_organism_is_an_error_not_an_empty_match() {
    let store = store_with(vec![
        Record::new("organism").with_field("name", "human"),
        Record::new("gene")
            .with_field("symbol", "ABC1")
            .with_field("ensembl_gene_id", "ENSG00000068097")
            .with_scope(Some("human")),
    ]);
    let registry = Registry::new(store, MemoryCatalog::new());
    let field = registry.field("gene", "symbol").unwrap();
    let err = registry
        .get_or_create_records(
            [Some("ABC1")],
            &field,
            &ResolveOptions::new().with_scope("zebrafish"),
        )
        .unwrap_err();
    assert_matches!(err, RegistryError::AmbiguousScope { ref scope, matches: 0 } if scope == "zebrafish");
    assert!(registry.settings().upon_create_search_names);
}

#[test]
fn organism_selects_the_matching_catalog_slice() {
    let catalog = MemoryCatalog::new()
        .with(CatalogSnapshot::new(
            source("Gene", Some("human")),
            rows(vec![json!({"symbol": "ABC1", "ensembl_gene_id": "ENSG00000068097"})]),
        ))
        .with(CatalogSnapshot::new(
            source("Gene", Some("mouse")),
            rows(vec![json!({"symbol": "ABC1", "ensembl_gene_id": "ENSMUSG00000015243"})]),
        ));
    let store = store_with(vec![
        Record::new("organism").with_field("name", "human"),
        Record::new("organism").with_field("name", "mouse"),
    ]);
    let registry =
        Registry::new(store, catalog).with_default_scope(Some("human".to_string()));
    let field = registry.field("gene", "symbol").unwrap();

    let human = registry
        .get_or_create_records([Some("ABC1")], &field, &ResolveOptions::new().from_catalog())
        .unwrap();
    assert_eq!(
        human.records[0].get_str("ensembl_gene_id"),
        Some("ENSG00000068097")
    );
    assert_eq!(human.records[0].scope.as_deref(), Some("human"));

    let mouse = registry
        .get_or_create_records(
            [Some("ABC1")],
            &field,
            &ResolveOptions::new().from_catalog().with_scope("mouse"),
        )
        .unwrap();
    assert_eq!(
        mouse.records[0].get_str("ensembl_gene_id"),
        Some("ENSMUSG00000015243")
    );
}

#[test]
fn stored_records_of_another_organism_are_not_matched() {
    let store = store_with(vec![
        Record::new("organism").with_field("name", "human"),
        Record::new("organism").with_field("name", "mouse"),
        Record::new("gene")
            .with_field("symbol", "ABC1")
            .with_field("ensembl_gene_id", "ENSMUSG00000015243")
            .with_scope(Some("mouse")),
    ]);
    let registry = Registry::new(store, MemoryCatalog::new());
    let field = registry.field("gene", "symbol").unwrap();
    let outcome = registry
        .get_or_create_records(
            [Some("ABC1")],
            &field,
            &ResolveOptions::new().with_scope("human"),
        )
        .unwrap();
    assert_eq!(outcome.existing().count(), 0);
    assert_eq!(outcome.records[0].scope.as_deref(), Some("human"));
}

#[test]
fn second_run_after_saving_creates_nothing() {
    let mut registry = Registry::new(MemoryStore::new(), cell_type_catalog());
    let field = registry.field("cell_type", "name").unwrap();
    let input = ["T cell", "T-cell", "hepatocyte", "my new cell type", "my new cell type"];
    let options = ResolveOptions::new().from_catalog();

    let first = registry
        .get_or_create_records(input.map(Some), &field, &options)
        .unwrap();
    assert_eq!(first.created().count(), 3);
    registry.save(first.records).unwrap();

    let second = registry
        .get_or_create_records(input.map(Some), &field, &options)
        .unwrap();
    assert_eq!(second.created().count(), 0);
    assert_eq!(second.existing().count(), 3);
    assert_eq!(second.report.counts.created(), 0);
}

#[test]
fn without_catalog_lookup_everything_unknown_is_bare() {
    let registry = Registry::new(MemoryStore::new(), cell_type_catalog());
    let field = registry.field("cell_type", "name").unwrap();
    let outcome = registry
        .get_or_create_records(["T cell"].map(Some), &field, &ResolveOptions::new())
        .unwrap();
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].get_str("ontology_id"), None);
    assert_eq!(outcome.report.counts.bare, 1);
}

#[test]
fn search_names_setting_is_restored_after_resolution() {
    let registry = Registry::new(MemoryStore::new(), MemoryCatalog::new());
    let field = registry.field("ulabel", "name").unwrap();
    assert!(registry.settings().upon_create_search_names);
    registry
        .get_or_create_records([Some("D0001")], &field, &ResolveOptions::new())
        .unwrap();
    assert!(registry.settings().upon_create_search_names);
}

#[test]
fn similar_name_search_is_off_during_resolution() {
    let store = CountingStore {
        inner: store_with(vec![Record::new("ulabel").with_field("name", "D0001 treated")]),
        ..CountingStore::default()
    };
    let registry = Registry::new(store, MemoryCatalog::new());
    let field = registry.field("ulabel", "name").unwrap();
    assert!(registry.settings().upon_create_search_names);

    let outcome = registry
        .get_or_create_records([Some("D0001")], &field, &ResolveOptions::new())
        .unwrap();
    assert_eq!(outcome.created().count(), 1);
    assert_eq!(registry.store().scans.get(), 0);

    registry
        .create_record(
            "ulabel",
            BTreeMap::from([("name".to_string(), json!("D0001"))]),
        )
        .unwrap();
    assert_eq!(registry.store().scans.get(), 1);
}

#[test]
fn catalog_synonym_of_stored_name_returns_the_stored_record() {
    let store = store_with(vec![Record::new("cell_type").with_field("name", "T cell")]);
    let mut registry = Registry::new(store, cell_type_catalog());
    let field = registry.field("cell_type", "name").unwrap();
    let options = ResolveOptions::new().from_catalog();

    let outcome = registry
        .get_or_create_records(["T cell", "T-cell"].map(Some), &field, &options)
        .unwrap();
    assert_eq!(outcome.records.len(), 1);
    assert!(outcome.records[0].is_persisted());
    assert_eq!(outcome.report.counts.created(), 0);
    assert_eq!(
        outcome.report.messages(),
        vec!["Returned 1 existing CellType records that matched name field"]
    );

    let outcome = registry
        .get_or_create_records([Some("T lymphocyte")], &field, &options)
        .unwrap();
    assert_eq!(outcome.records.len(), 1);
    assert!(outcome.records[0].is_persisted());
    assert_eq!(outcome.report.counts.store_synonym, 1);
    assert_eq!(outcome.report.counts.catalog_synonym, 0);

    assert!(registry.save(outcome.records).is_ok());
}

#[test]
fn name_synonyms_do_not_resolve_ontology_ids() {
    let store = store_with(vec![
        Record::new("cell_type")
            .with_field("name", "T cell")
            .with_field("ontology_id", "CL:0000084")
            .with_field("synonyms", "T-cell"),
    ]);
    let registry = Registry::new(store, cell_type_catalog());
    let field = registry.field("cell_type", "ontology_id").unwrap();
    let outcome = registry
        .get_or_create_records(["T-cell", "CL:0000084"].map(Some), &field, &ResolveOptions::new())
        .unwrap();

    assert_eq!(outcome.existing().count(), 1);
    assert_eq!(outcome.records[0].get_str("name"), Some("T cell"));
    let created = outcome.created().collect::<Vec<_>>();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].get_str("ontology_id"), Some("T-cell"));
    assert_eq!(outcome.report.counts.store_field, 1);
    assert_eq!(outcome.report.counts.store_synonym, 0);
}
