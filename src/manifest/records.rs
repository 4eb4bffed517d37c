// src/manifest/records.rs

//! The sibling record types a package manifest can carry
//!
//! Apart from scripts, every child element of `<package>` becomes one of
//! these records: a database object to create, an application artifact to
//! load, or a prerequisite to check. They are deliberately near-identical;
//! each carries a name, the file holding its payload, and the comment text
//! of its element. The `load*` family additionally remembers whether it was
//! parsed in system-package mode, which relaxes grade/order requirements
//! downstream.

use super::{attr_value, Diagnostics};
use crate::error::Result;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Write;

/// Pull the `name`/`file` attribute pair from an element.
///
/// `file` falls back to the name when absent. A record without a name is
/// a fatal diagnostic, same as a nameless script.
fn name_and_file(e: &BytesStart<'_>, tag: &str, diag: &mut Diagnostics) -> (String, String) {
    let name = attr_value(e, b"name").unwrap_or_default();
    let file = attr_value(e, b"file").unwrap_or_else(|| name.clone());
    if name.is_empty() {
        diag.fatal(format!("This {} element does not have a name.", tag));
    }
    (name, file)
}

/// Serialize one record element: attributes, then the comment as text
fn write_record<W: Write>(
    writer: &mut Writer<W>,
    tag: &str,
    attrs: &[(&str, &str)],
    text: &str,
) -> Result<()> {
    let mut start = BytesStart::new(tag);
    for (k, v) in attrs {
        start.push_attribute((*k, *v));
    }
    if text.is_empty() {
        writer.write_event(Event::Empty(start))?;
    } else {
        writer.write_event(Event::Start(start))?;
        writer.write_event(Event::Text(BytesText::new(text)))?;
        writer.write_event(Event::End(BytesEnd::new(tag)))?;
    }
    Ok(())
}

macro_rules! manifest_record {
    ($(#[$doc:meta])* $type:ident, $tag:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $type {
            name: String,
            file: String,
            comment: String,
        }

        impl $type {
            pub(crate) fn from_element(
                e: &BytesStart<'_>,
                text: &str,
                diag: &mut Diagnostics,
            ) -> Self {
                let (name, file) = name_and_file(e, $tag, diag);
                Self {
                    name,
                    file,
                    comment: text.to_string(),
                }
            }

            pub fn name(&self) -> &str {
                &self.name
            }

            pub fn filename(&self) -> &str {
                &self.file
            }

            pub fn comment(&self) -> &str {
                &self.comment
            }
        }
    };

    ($(#[$doc:meta])* $type:ident, $tag:literal, system) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $type {
            name: String,
            file: String,
            comment: String,
            system: bool,
        }

        impl $type {
            pub(crate) fn from_element(
                e: &BytesStart<'_>,
                text: &str,
                system: bool,
                diag: &mut Diagnostics,
            ) -> Self {
                let (name, file) = name_and_file(e, $tag, diag);
                Self {
                    name,
                    file,
                    comment: text.to_string(),
                    system,
                }
            }

            pub fn name(&self) -> &str {
                &self.name
            }

            pub fn filename(&self) -> &str {
                &self.file
            }

            pub fn comment(&self) -> &str {
                &self.comment
            }

            /// Whether this record came from a system (core) package
            pub fn is_system(&self) -> bool {
                self.system
            }

            pub(crate) fn write_xml<W: Write>(&self, writer: &mut Writer<W>) -> Result<()> {
                write_record(
                    writer,
                    $tag,
                    &[("name", self.name.as_str()), ("file", self.file.as_str())],
                    &self.comment,
                )
            }
        }
    };
}

manifest_record!(
    /// A stored function/procedure definition to create
    CreateFunction,
    "createfunction"
);
manifest_record!(
    /// A table definition to create
    CreateTable,
    "createtable"
);
manifest_record!(
    /// A trigger definition to create
    CreateTrigger,
    "createtrigger"
);
manifest_record!(
    /// A view definition to create
    CreateView,
    "createview"
);
manifest_record!(
    /// A parameterized SQL (metasql) statement to load
    LoadMetasql,
    "loadmetasql",
    system
);
manifest_record!(
    /// A privilege/permission definition to load
    LoadPriv,
    "loadpriv",
    system
);
manifest_record!(
    /// A UI screen definition to load
    LoadAppUi,
    "loadappui",
    system
);
manifest_record!(
    /// An application-side script to load
    LoadAppScript,
    "loadappscript",
    system
);
manifest_record!(
    /// A custom command definition to load
    LoadCmd,
    "loadcmd",
    system
);
manifest_record!(
    /// An image asset to load
    LoadImage,
    "loadimage",
    system
);

/// A report definition to load
///
/// Same shape as the rest of the `load*` family plus a `grade`: when two
/// reports share a name, the higher grade wins at display time.
#[derive(Debug, Clone)]
pub struct LoadReport {
    name: String,
    file: String,
    comment: String,
    grade: i32,
    system: bool,
}

impl LoadReport {
    pub(crate) fn from_element(
        e: &BytesStart<'_>,
        text: &str,
        system: bool,
        diag: &mut Diagnostics,
    ) -> Self {
        let (name, file) = name_and_file(e, "loadreport", diag);
        let grade = match attr_value(e, b"grade") {
            Some(g) => g.parse().unwrap_or_else(|_| {
                diag.warn(format!(
                    "Could not parse the grade '{}' of report {}; using 0.",
                    g, name
                ));
                0
            }),
            None => 0,
        };
        Self {
            name,
            file,
            comment: text.to_string(),
            grade,
            system,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filename(&self) -> &str {
        &self.file
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn grade(&self) -> i32 {
        self.grade
    }

    pub fn is_system(&self) -> bool {
        self.system
    }

    pub(crate) fn write_xml<W: Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let grade = self.grade.to_string();
        write_record(
            writer,
            "loadreport",
            &[
                ("name", self.name.as_str()),
                ("file", self.file.as_str()),
                ("grade", grade.as_str()),
            ],
            &self.comment,
        )
    }
}

/// A condition that must hold before the package may be applied
///
/// The flat prerequisite list is checked by the installer driver; no
/// dependency-graph resolution happens here. The default kind is `query`:
/// the nested `<query>` must return a true first column, otherwise the
/// nested `<message>` is shown to the operator.
#[derive(Debug, Clone)]
pub struct Prerequisite {
    name: String,
    kind: String,
    query: String,
    message: String,
}

impl Prerequisite {
    /// Parse a `<prerequisite>` subtree, consuming events up to and
    /// including its end tag.
    pub(crate) fn from_reader(
        e: &BytesStart<'_>,
        reader: &mut Reader<&[u8]>,
    ) -> Result<Self> {
        let mut prereq = Self::from_attributes(e);
        loop {
            match reader.read_event()? {
                Event::Start(child) => {
                    let tag = child.name().as_ref().to_vec();
                    let text = reader.read_text(child.name())?.into_owned();
                    match tag.as_slice() {
                        b"query" => prereq.query = text,
                        b"message" => prereq.message = text,
                        _ => {}
                    }
                }
                Event::End(_) | Event::Eof => break,
                _ => {}
            }
        }
        Ok(prereq)
    }

    /// Parse a childless `<prerequisite/>` element
    pub(crate) fn from_attributes(e: &BytesStart<'_>) -> Self {
        Self {
            name: attr_value(e, b"name").unwrap_or_default(),
            kind: attr_value(e, b"type").unwrap_or_else(|| "query".to_string()),
            query: String::new(),
            message: String::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn write_xml<W: Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let mut start = BytesStart::new("prerequisite");
        start.push_attribute(("type", self.kind.as_str()));
        start.push_attribute(("name", self.name.as_str()));
        writer.write_event(Event::Start(start))?;

        if !self.query.is_empty() {
            writer.write_event(Event::Start(BytesStart::new("query")))?;
            writer.write_event(Event::Text(BytesText::new(&self.query)))?;
            writer.write_event(Event::End(BytesEnd::new("query")))?;
        }
        if !self.message.is_empty() {
            writer.write_event(Event::Start(BytesStart::new("message")))?;
            writer.write_event(Event::Text(BytesText::new(&self.message)))?;
            writer.write_event(Event::End(BytesEnd::new("message")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("prerequisite")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_with(attrs: &[(&'static str, &'static str)]) -> BytesStart<'static> {
        let mut e = BytesStart::new("loadreport");
        for &(k, v) in attrs {
            e.push_attribute((k, v));
        }
        e
    }

    #[test]
    fn test_file_falls_back_to_name() {
        let mut diag = Diagnostics::new();
        let e = start_with(&[("name", "invoices")]);
        let report = LoadReport::from_element(&e, "", false, &mut diag);
        assert_eq!(report.name(), "invoices");
        assert_eq!(report.filename(), "invoices");
        assert!(!diag.has_fatal());
    }

    #[test]
    fn test_missing_name_is_fatal() {
        let mut diag = Diagnostics::new();
        let e = start_with(&[]);
        let _ = LoadReport::from_element(&e, "", false, &mut diag);
        assert!(diag.has_fatal());
    }

    #[test]
    fn test_report_grade_defaults_to_zero() {
        let mut diag = Diagnostics::new();
        let e = start_with(&[("name", "invoices")]);
        let report = LoadReport::from_element(&e, "", false, &mut diag);
        assert_eq!(report.grade(), 0);
    }

    #[test]
    fn test_unparsable_grade_warns_but_is_not_fatal() {
        let mut diag = Diagnostics::new();
        let e = start_with(&[("name", "invoices"), ("grade", "high")]);
        let report = LoadReport::from_element(&e, "", false, &mut diag);
        assert_eq!(report.grade(), 0);
        assert!(!diag.has_fatal());
        assert_eq!(diag.len(), 1);
    }

    #[test]
    fn test_prerequisite_kind_defaults_to_query() {
        let mut e = BytesStart::new("prerequisite");
        e.push_attribute(("name", "fixcountry"));
        let prereq = Prerequisite::from_attributes(&e);
        assert_eq!(prereq.kind(), "query");
        assert_eq!(prereq.name(), "fixcountry");
    }
}
