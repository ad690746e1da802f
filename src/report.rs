use std::fmt;

use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Store,
    Catalog,
    Bare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Field,
    Synonym,
}

/// Per-stage counts of one resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub store_field: usize,
    pub store_synonym: usize,
    pub catalog_field: usize,
    pub catalog_synonym: usize,
    pub bare: usize,
}

impl StageCounts {
    pub fn existing(&self) -> usize {
        self.store_field + self.store_synonym
    }

    pub fn created(&self) -> usize {
        self.catalog_field + self.catalog_synonym + self.bare
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportLine {
    pub stage: Stage,
    pub kind: MatchKind,
    pub count: usize,
    pub record_type: String,
    pub field: String,
    pub source: Option<String>,
}

impl fmt::Display for ReportLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let matched = match self.kind {
            MatchKind::Field => format!("{} field", self.field),
            MatchKind::Synonym => "synonyms".to_string(),
        };
        match self.stage {
            Stage::Store => write!(
                f,
                "Returned {} existing {} records that matched {matched}",
                self.count, self.record_type
            ),
            Stage::Catalog => {
                write!(
                    f,
                    "Created {} {} records from catalog that matched {matched}",
                    self.count, self.record_type
                )?;
                if let Some(source) = &self.source {
                    write!(f, ", linked to {source}")?;
                }
                Ok(())
            }
            Stage::Bare => write!(
                f,
                "Created {} {} records with a single field {}",
                self.count, self.record_type, self.field
            ),
        }
    }
}

/// Ordered summary of a resolution.
///
/// Lines follow the stages (store, catalog, bare); within a stage the field-matched
/// line always precedes the synonym-matched line. Zero counts produce no line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub counts: StageCounts,
    pub lines: Vec<ReportLine>,
}

impl Report {
    pub fn from_counts(
        counts: StageCounts,
        record_type: &str,
        field: &str,
        catalog_source: Option<String>,
    ) -> Self {
        let line = |stage, kind, count, source: Option<String>| ReportLine {
            stage,
            kind,
            count,
            record_type: record_type.to_string(),
            field: field.to_string(),
            source,
        };
        let candidates = [
            line(Stage::Store, MatchKind::Field, counts.store_field, None),
            line(Stage::Store, MatchKind::Synonym, counts.store_synonym, None),
            line(
                Stage::Catalog,
                MatchKind::Field,
                counts.catalog_field,
                catalog_source.clone(),
            ),
            line(
                Stage::Catalog,
                MatchKind::Synonym,
                counts.catalog_synonym,
                catalog_source,
            ),
            line(Stage::Bare, MatchKind::Field, counts.bare, None),
        ];
        Self {
            counts,
            lines: candidates
                .into_iter()
                .filter(|line| line.count > 0)
                .collect(),
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.lines.iter().map(ToString::to_string).collect()
    }

    pub fn log(&self) {
        for line in &self.lines {
            info!(stage = ?line.stage, count = line.count, "{line}");
        }
    }
}
