use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub dtype: String,
}

/// Column header of a table whose columns are features.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnTable {
    pub columns: Vec<Column>,
}

impl ColumnTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column(mut self, name: &str, dtype: &str) -> Self {
        self.columns.push(Column {
            name: name.to_string(),
            dtype: dtype.to_string(),
        });
        self
    }

    pub fn dtype(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|column| column.name == name)
            .map(|column| column.dtype.as_str())
    }
}

/// Where feature names come from: a plain list of names or the columns of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureInput {
    Scalar(Vec<Option<String>>),
    Tabular(ColumnTable),
}

impl FeatureInput {
    pub fn names(&self) -> Vec<Option<String>> {
        match self {
            FeatureInput::Scalar(values) => values.clone(),
            FeatureInput::Tabular(table) => table
                .columns
                .iter()
                .map(|column| Some(column.name.clone()))
                .collect(),
        }
    }

    /// Declared type of feature `name`; only tables carry types.
    pub fn dtype(&self, name: &str) -> Option<&str> {
        match self {
            FeatureInput::Scalar(_) => None,
            FeatureInput::Tabular(table) => table.dtype(name),
        }
    }
}
