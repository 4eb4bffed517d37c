// src/manifest/script.rs

//! SQL script records and the per-script onerror policy
//!
//! A `<script>` element names one SQL fragment shipped alongside the
//! manifest. The payload itself lives in a file next to the manifest;
//! the record only carries the name, an optional comment, and the
//! policy telling the installer driver how to react if execution fails.

use super::{attr_value, Diagnostics};
use crate::error::{Error, Result};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use rusqlite::Connection;
use std::io::Write;
use tracing::debug;

/// How the installer driver should react when a script's SQL fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnError {
    /// Defer to the driver's configured policy
    #[default]
    Default,
    /// Abort the package load
    Stop,
    /// Ask the operator whether to continue
    Prompt,
    /// Log the failure and keep going
    Ignore,
}

impl OnError {
    pub fn as_str(&self) -> &str {
        match self {
            OnError::Default => "Default",
            OnError::Stop => "Stop",
            OnError::Prompt => "Prompt",
            OnError::Ignore => "Ignore",
        }
    }

    /// Map an `onerror` attribute value to a policy.
    ///
    /// Unrecognized names fall back to `Default`, matching how manifests
    /// have always been interpreted.
    pub fn from_name(name: &str) -> Self {
        match name {
            "Stop" => OnError::Stop,
            "Prompt" => OnError::Prompt,
            "Ignore" => OnError::Ignore,
            _ => OnError::Default,
        }
    }

    /// Collapse this policy to the action a driver should take.
    ///
    /// `Default` defers to the driver's configured fallback. `Prompt`
    /// degrades to `Stop` when there is no operator to ask, which also
    /// applies when the fallback itself is `Prompt`.
    pub fn resolve(self, fallback: OnError) -> OnError {
        match self {
            OnError::Default => match fallback {
                OnError::Default | OnError::Prompt => OnError::Stop,
                other => other,
            },
            OnError::Prompt => OnError::Stop,
            other => other,
        }
    }

    /// All policy names, optionally including `Default`
    pub fn list(include_default: bool) -> Vec<&'static str> {
        let mut list = Vec::new();
        if include_default {
            list.push("Default");
        }
        list.extend(["Stop", "Prompt", "Ignore"]);
        list
    }
}

/// One named SQL script fragment within a package
#[derive(Debug, Clone)]
pub struct Script {
    name: String,
    on_error: OnError,
    comment: String,
}

impl Script {
    pub fn new(name: impl Into<String>, on_error: OnError, comment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            on_error,
            comment: comment.into(),
        }
    }

    /// Build a script record from its manifest element.
    ///
    /// The `file` attribute, when present, overrides `name`; the two are
    /// interchangeable for scripts. A script without either is a fatal
    /// diagnostic.
    pub(crate) fn from_element(e: &BytesStart<'_>, text: &str, diag: &mut Diagnostics) -> Self {
        let mut name = attr_value(e, b"name").unwrap_or_default();
        if let Some(file) = attr_value(e, b"file") {
            name = file;
        }
        let on_error = OnError::from_name(&attr_value(e, b"onerror").unwrap_or_default());

        if name.is_empty() {
            diag.fatal("This script does not have a name.");
        }

        Self {
            name,
            on_error,
            comment: text.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The file holding the payload; interchangeable with the name
    pub fn filename(&self) -> &str {
        &self.name
    }

    pub fn on_error(&self) -> OnError {
        self.on_error
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub(crate) fn write_xml<W: Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        self.write_xml_as(writer, "script")
    }

    fn write_xml_as<W: Write>(&self, writer: &mut Writer<W>, tag: &str) -> Result<()> {
        let mut start = BytesStart::new(tag);
        start.push_attribute(("name", self.name.as_str()));
        start.push_attribute(("file", self.name.as_str()));
        start.push_attribute(("onerror", self.on_error.as_str()));

        if self.comment.is_empty() {
            writer.write_event(Event::Empty(start))?;
        } else {
            writer.write_event(Event::Start(start))?;
            writer.write_event(Event::Text(BytesText::new(&self.comment)))?;
            writer.write_event(Event::End(BytesEnd::new(tag)))?;
        }
        Ok(())
    }

    /// Execute the script's payload against the database.
    ///
    /// The payload is the content of the file named by this record, read
    /// by the installer driver. An empty payload is an error; a failed
    /// statement is reported with the file name so the operator knows
    /// which fragment broke.
    pub fn write_to_db(&self, conn: &Connection, payload: &str) -> Result<()> {
        debug!(script = %self.name, on_error = %self.on_error.as_str(), "executing script");

        if payload.trim().is_empty() {
            return Err(Error::EmptyScript(self.filename().to_string()));
        }

        conn.execute_batch(payload).map_err(|e| Error::ScriptFailed {
            file: self.filename().to_string(),
            source: e,
        })
    }
}

/// A script that runs after every ordinary script in the package
///
/// Identical in shape to `Script`; only the manifest tag and the point
/// in the load sequence differ.
#[derive(Debug, Clone)]
pub struct FinalScript(Script);

impl FinalScript {
    pub(crate) fn from_element(e: &BytesStart<'_>, text: &str, diag: &mut Diagnostics) -> Self {
        Self(Script::from_element(e, text, diag))
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn filename(&self) -> &str {
        self.0.filename()
    }

    pub fn on_error(&self) -> OnError {
        self.0.on_error()
    }

    pub(crate) fn write_xml<W: Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        self.0.write_xml_as(writer, "finalscript")
    }

    pub fn write_to_db(&self, conn: &Connection, payload: &str) -> Result<()> {
        self.0.write_to_db(conn, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_error_name_round_trip() {
        for name in ["Default", "Stop", "Prompt", "Ignore"] {
            assert_eq!(OnError::from_name(name).as_str(), name);
        }
    }

    #[test]
    fn test_unknown_on_error_maps_to_default() {
        assert_eq!(OnError::from_name("Explode"), OnError::Default);
        assert_eq!(OnError::from_name(""), OnError::Default);
    }

    #[test]
    fn test_on_error_list() {
        assert_eq!(
            OnError::list(true),
            vec!["Default", "Stop", "Prompt", "Ignore"]
        );
        assert_eq!(OnError::list(false), vec!["Stop", "Prompt", "Ignore"]);
    }

    #[test]
    fn test_default_policy_resolves_to_driver_fallback() {
        assert_eq!(OnError::Default.resolve(OnError::Stop), OnError::Stop);
        assert_eq!(OnError::Default.resolve(OnError::Ignore), OnError::Ignore);
    }

    #[test]
    fn test_prompt_degrades_to_stop_without_an_operator() {
        assert_eq!(OnError::Prompt.resolve(OnError::Stop), OnError::Stop);
        assert_eq!(OnError::Prompt.resolve(OnError::Ignore), OnError::Stop);
        // a Prompt fallback cannot be honored either
        assert_eq!(OnError::Default.resolve(OnError::Prompt), OnError::Stop);
        assert_eq!(OnError::Default.resolve(OnError::Default), OnError::Stop);
    }

    #[test]
    fn test_explicit_policies_resolve_to_themselves() {
        assert_eq!(OnError::Stop.resolve(OnError::Ignore), OnError::Stop);
        assert_eq!(OnError::Ignore.resolve(OnError::Stop), OnError::Ignore);
    }

    #[test]
    fn test_empty_payload_is_an_error() {
        let conn = Connection::open_in_memory().unwrap();
        let script = Script::new("empty.sql", OnError::Default, "");
        let result = script.write_to_db(&conn, "   \n");
        assert!(matches!(result, Err(Error::EmptyScript(_))));
    }

    #[test]
    fn test_payload_executes() {
        let conn = Connection::open_in_memory().unwrap();
        let script = Script::new("create.sql", OnError::Default, "");
        script
            .write_to_db(&conn, "CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (7);")
            .unwrap();

        let x: i64 = conn
            .query_row("SELECT x FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(x, 7);
    }

    #[test]
    fn test_failed_payload_names_the_file() {
        let conn = Connection::open_in_memory().unwrap();
        let script = Script::new("broken.sql", OnError::Stop, "");
        let err = script
            .write_to_db(&conn, "NOT VALID SQL AT ALL;")
            .unwrap_err();
        match err {
            Error::ScriptFailed { file, .. } => assert_eq!(file, "broken.sql"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
