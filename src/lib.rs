//! Get-or-create engine for ontology-backed biological records.
//!
//! Given raw labels and a field of a record type, [`registry::Registry`] returns the
//! stored records that already carry them (directly or through synonyms), new records
//! populated from a reference catalog, and bare records for whatever is left.

pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod existing;
pub mod features;
pub mod from_catalog;
pub mod index;
pub mod output;
pub mod registry;
pub mod report;
pub mod settings;
pub mod store;
pub mod synonyms;
