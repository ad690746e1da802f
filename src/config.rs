use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{FieldSpec, RecordType, SYNONYMS_FIELD, TypeRegistry, builtin_type};
use crate::error::RegistryError;
use crate::settings::Settings;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub store: Option<String>,
    #[serde(default)]
    pub catalog_dir: Option<String>,
    #[serde(default)]
    pub organism: Option<String>,
    #[serde(default)]
    pub upon_create_search_names: Option<bool>,
    #[serde(default)]
    pub record_types: Vec<RecordTypeEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RecordTypeEntry {
    Shorthand(String),
    Detailed(RecordTypeObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RecordTypeObject {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub fields: Vec<String>,
    #[serde(default)]
    pub unique: Vec<String>,
    #[serde(default)]
    pub synonyms: bool,
    #[serde(default)]
    pub catalog: Option<String>,
    #[serde(default)]
    pub scoped: bool,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub store_path: Option<Utf8PathBuf>,
    pub catalog_dir: Option<Utf8PathBuf>,
    pub organism: Option<String>,
    pub settings: Settings,
    pub types: TypeRegistry,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, RegistryError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("bionty.json"),
        };

        if path.is_none() && !config_path.exists() {
            return Err(RegistryError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| RegistryError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| RegistryError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, RegistryError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let mut types = TypeRegistry::builtin();
        for entry in config.record_types {
            let record_type = match entry {
                RecordTypeEntry::Shorthand(name) => builtin_type(&name).ok_or_else(|| {
                    RegistryError::ConfigParse(format!("unknown built-in record type: {name}"))
                })?,
                RecordTypeEntry::Detailed(obj) => record_type_from_object(obj)?,
            };
            types.register(record_type);
        }

        Ok(ResolvedConfig {
            schema_version,
            store_path: config.store.map(Utf8PathBuf::from),
            catalog_dir: config.catalog_dir.map(Utf8PathBuf::from),
            organism: config.organism,
            settings: Settings {
                upon_create_search_names: config
                    .upon_create_search_names
                    .unwrap_or(Settings::default().upon_create_search_names),
            },
            types,
        })
    }
}

fn record_type_from_object(obj: RecordTypeObject) -> Result<RecordType, RegistryError> {
    if obj.fields.is_empty() {
        return Err(RegistryError::ConfigParse(format!(
            "record type {} declares no fields",
            obj.name
        )));
    }
    if let Some(unknown) = obj.unique.iter().find(|name| !obj.fields.contains(name)) {
        return Err(RegistryError::ConfigParse(format!(
            "record type {}: unique field {unknown} is not declared",
            obj.name
        )));
    }
    let mut fields = obj
        .fields
        .iter()
        .map(|name| {
            if obj.unique.contains(name) {
                FieldSpec::unique(name)
            } else {
                FieldSpec::text(name)
            }
        })
        .collect::<Vec<_>>();
    if obj.synonyms && !obj.fields.iter().any(|name| name == SYNONYMS_FIELD) {
        fields.push(FieldSpec::text(SYNONYMS_FIELD));
    }
    Ok(RecordType {
        display_name: obj.display_name.unwrap_or_else(|| obj.name.clone()),
        name: obj.name,
        fields,
        synonyms_field: obj.synonyms.then(|| SYNONYMS_FIELD.to_string()),
        catalog: obj.catalog,
        scoped: obj.scoped,
    })
}
