use std::io::{self, Write};

use serde::Serialize;

use crate::domain::RecordType;
use crate::registry::ResolveOutcome;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_outcome(outcome: &ResolveOutcome) -> io::Result<()> {
        Self::print_json(outcome)
    }

    pub fn print_types(types: &[&RecordType]) -> io::Result<()> {
        Self::print_json(&types)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_outcome(outcome: &ResolveOutcome) -> io::Result<()> {
        let mut stdout = io::stdout();
        for message in outcome.report.messages() {
            writeln!(stdout, "{message}")?;
        }
        for record in &outcome.records {
            let id = record
                .id
                .map(|id| format!("#{id}"))
                .unwrap_or_else(|| "new".to_string());
            let fields = serde_json::to_string(&record.fields).map_err(io::Error::other)?;
            writeln!(stdout, "{id}\t{fields}")?;
        }
        Ok(())
    }

    pub fn print_types(types: &[&RecordType]) -> io::Result<()> {
        let mut stdout = io::stdout();
        for record_type in types {
            let fields = record_type
                .fields
                .iter()
                .map(|field| {
                    let marker = if field.unique { "*" } else { "" };
                    format!("{}{marker}:{}", field.name, field.kind)
                })
                .collect::<Vec<_>>()
                .join(", ");
            let catalog = record_type.catalog.as_deref().unwrap_or("-");
            writeln!(
                stdout,
                "{} ({})\tcatalog={catalog}\tscoped={}\t{fields}",
                record_type.name, record_type.display_name, record_type.scoped
            )?;
        }
        Ok(())
    }
}
