use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RegistryError;

/// Field values are stored as JSON values so catalog columns of any shape
/// (strings, id lists, parent lists) can be carried onto records unchanged.
pub type FieldValue = Value;

/// Record type used to resolve a scope name (e.g. "human") into a scope record.
pub const SCOPE_RECORD_TYPE: &str = "organism";

/// Field that holds the pipe-separated synonyms of a record.
pub const SYNONYMS_FIELD: &str = "synonyms";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    List,
    Number,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Text => write!(f, "text"),
            FieldKind::List => write!(f, "list"),
            FieldKind::Number => write!(f, "number"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: FieldKind,
    #[serde(default)]
    pub unique: bool,
}

fn default_kind() -> FieldKind {
    FieldKind::Text
}

impl FieldSpec {
    pub fn text(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Text,
            unique: false,
        }
    }

    pub fn unique(name: &str) -> Self {
        Self {
            unique: true,
            ..Self::text(name)
        }
    }

    pub fn list(name: &str) -> Self {
        Self {
            kind: FieldKind::List,
            ..Self::text(name)
        }
    }
}

/// Schema of a class of records, e.g. cell types or genes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordType {
    pub name: String,
    pub display_name: String,
    pub fields: Vec<FieldSpec>,
    /// Field carrying the synonym table of this type, if any.
    #[serde(default)]
    pub synonyms_field: Option<String>,
    /// Entity name in the reference catalog.
    #[serde(default)]
    pub catalog: Option<String>,
    /// Whether records of this type are disambiguated by organism.
    #[serde(default)]
    pub scoped: bool,
}

impl RecordType {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|field| field.unique)
    }

    pub fn field_ref(&self, name: &str) -> Result<FieldRef, RegistryError> {
        if !self.has_field(name) {
            return Err(RegistryError::Validation(format!(
                "{} has no field {name:?}",
                self.display_name
            )));
        }
        Ok(FieldRef {
            record_type: self.clone(),
            field: name.to_string(),
        })
    }

    /// Field used when looking for similarly named records.
    pub fn name_field(&self) -> Option<&str> {
        ["name", "symbol"]
            .into_iter()
            .find(|candidate| self.has_field(candidate))
    }

    /// Synonyms are alternate names, so they only resolve lookups on the name field.
    pub fn resolves_synonyms_for(&self, field: &str) -> bool {
        self.synonyms_field.is_some() && self.name_field() == Some(field)
    }
}

/// A record type together with one of its declared fields.
///
/// Only constructible through [`RecordType::field_ref`] or [`TypeRegistry::field_ref`],
/// so the field is always declared on the type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    record_type: RecordType,
    field: String,
}

impl FieldRef {
    pub fn record_type(&self) -> &RecordType {
        &self.record_type
    }

    pub fn field_name(&self) -> &str {
        &self.field
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.record_type.name, self.field)
    }
}

/// Provenance of a record materialized from the reference catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogSource {
    pub entity: String,
    #[serde(default)]
    pub organism: Option<String>,
    pub source: String,
    pub version: String,
}

impl fmt::Display for CatalogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.source, self.version, self.entity)?;
        if let Some(organism) = &self.organism {
            write!(f, " for {organism}")?;
        }
        Ok(())
    }
}

/// A record of some [`RecordType`]. Transient until persisted by the store,
/// which assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub record_type: String,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub source: Option<CatalogSource>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Record {
    pub fn new(record_type: &str) -> Self {
        Self {
            record_type: record_type.to_string(),
            id: None,
            fields: BTreeMap::new(),
            scope: None,
            source: None,
            created_at: None,
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn with_scope(mut self, scope: Option<&str>) -> Self {
        self.scope = scope.map(str::to_string);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.fields.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Lookup key of a field: strings as-is, numbers and booleans rendered.
    pub fn key(&self, name: &str) -> Option<String> {
        self.get(name).and_then(value_key)
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    pub fn synonyms(&self) -> Vec<String> {
        self.get(SYNONYMS_FIELD)
            .map(split_synonyms)
            .unwrap_or_default()
    }
}

pub fn value_key(value: &FieldValue) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Synonyms are stored either pipe-separated (`"T-cell|T lymphocyte"`) or as a list.
pub fn split_synonyms(value: &FieldValue) -> Vec<String> {
    match value {
        Value::String(text) => text
            .split('|')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Known record types, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, RecordType>,
}

impl TypeRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for record_type in builtin_types() {
            registry.register(record_type);
        }
        registry
    }

    pub fn register(&mut self, record_type: RecordType) {
        self.types.insert(record_type.name.clone(), record_type);
    }

    pub fn get(&self, name: &str) -> Result<&RecordType, RegistryError> {
        self.types
            .get(name)
            .ok_or_else(|| RegistryError::UnknownRecordType(name.to_string()))
    }

    pub fn field_ref(&self, type_name: &str, field: &str) -> Result<FieldRef, RegistryError> {
        self.get(type_name)?.field_ref(field)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names = self.types.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecordType> {
        self.types.values()
    }
}

pub fn builtin_type(name: &str) -> Option<RecordType> {
    builtin_types().into_iter().find(|record_type| record_type.name == name)
}

fn ontology_type(name: &str, display_name: &str, catalog: &str) -> RecordType {
    RecordType {
        name: name.to_string(),
        display_name: display_name.to_string(),
        fields: vec![
            FieldSpec::unique("name"),
            FieldSpec::unique("ontology_id"),
            FieldSpec::text("abbr"),
            FieldSpec::text(SYNONYMS_FIELD),
            FieldSpec::text("description"),
        ],
        synonyms_field: Some(SYNONYMS_FIELD.to_string()),
        catalog: Some(catalog.to_string()),
        scoped: false,
    }
}

pub fn builtin_types() -> Vec<RecordType> {
    vec![
        ontology_type("cell_type", "CellType", "CellType"),
        ontology_type("tissue", "Tissue", "Tissue"),
        ontology_type("disease", "Disease", "Disease"),
        RecordType {
            name: "gene".to_string(),
            display_name: "Gene".to_string(),
            fields: vec![
                FieldSpec::text("symbol"),
                FieldSpec::unique("ensembl_gene_id"),
                FieldSpec::list("ncbi_gene_ids"),
                FieldSpec::text("biotype"),
                FieldSpec::text(SYNONYMS_FIELD),
                FieldSpec::text("description"),
            ],
            synonyms_field: Some(SYNONYMS_FIELD.to_string()),
            catalog: Some("Gene".to_string()),
            scoped: true,
        },
        RecordType {
            name: SCOPE_RECORD_TYPE.to_string(),
            display_name: "Organism".to_string(),
            fields: vec![
                FieldSpec::unique("name"),
                FieldSpec::unique("ontology_id"),
                FieldSpec::text("scientific_name"),
                FieldSpec::text(SYNONYMS_FIELD),
            ],
            synonyms_field: Some(SYNONYMS_FIELD.to_string()),
            catalog: Some("Organism".to_string()),
            scoped: false,
        },
        RecordType {
            name: "ulabel".to_string(),
            display_name: "ULabel".to_string(),
            fields: vec![FieldSpec::unique("name"), FieldSpec::text("description")],
            synonyms_field: None,
            catalog: None,
            scoped: false,
        },
        RecordType {
            name: "feature".to_string(),
            display_name: "Feature".to_string(),
            fields: vec![
                FieldSpec::unique("name"),
                FieldSpec::text("type"),
                FieldSpec::text("description"),
            ],
            synonyms_field: None,
            catalog: None,
            scoped: false,
        },
    ]
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn field_ref_requires_declared_field() {
        let types = TypeRegistry::builtin();
        let field = types.field_ref("cell_type", "name").unwrap();
        assert_eq!(field.to_string(), "cell_type.name");

        let err = types.field_ref("cell_type", "symbol").unwrap_err();
        assert_matches!(err, RegistryError::Validation(_));

        let err = types.field_ref("protein", "name").unwrap_err();
        assert_matches!(err, RegistryError::UnknownRecordType(_));
    }

    #[test]
    fn synonyms_split_on_pipes_and_lists() {
        assert_eq!(
            split_synonyms(&json!("T-cell| T lymphocyte||")),
            vec!["T-cell", "T lymphocyte"]
        );
        assert_eq!(split_synonyms(&json!(["a", " ", "b"])), vec!["a", "b"]);
        assert!(split_synonyms(&json!(null)).is_empty());
    }

    #[test]
    fn record_keys_render_scalars() {
        let record = Record::new("gene")
            .with_field("symbol", "ABC1")
            .with_field("rank", 3);
        assert_eq!(record.key("symbol").as_deref(), Some("ABC1"));
        assert_eq!(record.key("rank").as_deref(), Some("3"));
        assert_eq!(record.key("missing"), None);
        assert!(!record.is_persisted());
    }

    #[test]
    fn name_field_prefers_name_then_symbol() {
        let types = TypeRegistry::builtin();
        assert_eq!(types.get("cell_type").unwrap().name_field(), Some("name"));
        assert_eq!(types.get("gene").unwrap().name_field(), Some("symbol"));
    }

    #[test]
    fn synonyms_only_resolve_name_lookups() {
        let types = TypeRegistry::builtin();
        let cell_type = types.get("cell_type").unwrap();
        assert!(cell_type.resolves_synonyms_for("name"));
        assert!(!cell_type.resolves_synonyms_for("ontology_id"));
        assert!(types.get("gene").unwrap().resolves_synonyms_for("symbol"));
        assert!(!types.get("ulabel").unwrap().resolves_synonyms_for("name"));
    }
}
