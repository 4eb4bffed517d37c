// src/lib.rs

//! pkgload
//!
//! Declarative package loader for ERP extension bundles: parses an XML
//! manifest describing a bundle of database objects (tables, views,
//! triggers, functions, privileges, reports, scripts, UI components,
//! images, prerequisites) and applies it to a relational database,
//! tracking package identity and version in a metadata table.
//!
//! # Architecture
//!
//! - Manifest-first: one XML element subtree becomes one typed `Package`
//! - Diagnostics: parse-time messages carry a parallel fatal/non-fatal flag
//! - Metadata table: package headers upserted into `pkghead`, keyed on name
//! - Scripts: raw SQL payloads executed with a per-script onerror policy

pub mod db;
mod error;
pub mod manifest;
pub mod version;

pub use error::{Error, Result};
