// src/manifest/mod.rs

//! Manifest parsing and the Package type
//!
//! One `<package>` element subtree becomes one `Package`: an ordered
//! collection of typed child records plus the header metadata (name,
//! version, developer, description, notes) that gets persisted to the
//! pkghead table. Parsing never panics and rarely errors; problems with
//! the manifest's content are accumulated as diagnostics, each flagged
//! fatal or merely advisory, and the caller decides whether to proceed.

pub mod records;
pub mod script;

use crate::error::{Error, Result};
use crate::version;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use rusqlite::{params, Connection, OptionalExtension};
use semver::Version;
use tracing::{debug, warn};

pub use records::{
    CreateFunction, CreateTable, CreateTrigger, CreateView, LoadAppScript, LoadAppUi, LoadCmd,
    LoadImage, LoadMetasql, LoadPriv, LoadReport, Prerequisite,
};
pub use script::{FinalScript, OnError, Script};

/// Developer name marking core (system) packages, which may omit the
/// package name and version
const SYSTEM_DEVELOPER: &str = "xTuple";

/// Parse-time messages with a parallel fatal/non-fatal flag list
///
/// A fatal diagnostic means the package must not be loaded; a non-fatal
/// one is shown to the operator and loading may continue.
#[derive(Debug, Default)]
pub struct Diagnostics {
    messages: Vec<String>,
    fatal: Vec<bool>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an advisory message
    pub fn warn(&mut self, msg: impl Into<String>) {
        self.messages.push(msg.into());
        self.fatal.push(false);
    }

    /// Record a message that must abort package loading
    pub fn fatal(&mut self, msg: impl Into<String>) {
        self.messages.push(msg.into());
        self.fatal.push(true);
    }

    pub fn has_fatal(&self) -> bool {
        self.fatal.iter().any(|&f| f)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Iterate messages with their fatal flag
    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.messages
            .iter()
            .map(String::as_str)
            .zip(self.fatal.iter().copied())
    }
}

/// Read an attribute value off an element, if present
pub(crate) fn attr_value(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.as_ref() == name)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

/// One parsed package manifest
///
/// Field order in the record vectors preserves manifest order; the
/// installer driver applies records in the order they were declared.
#[derive(Debug, Default)]
pub struct Package {
    id: String,
    name: String,
    developer: String,
    description: String,
    notes: String,
    version: Option<Version>,
    system: bool,

    functions: Vec<CreateFunction>,
    tables: Vec<CreateTable>,
    triggers: Vec<CreateTrigger>,
    views: Vec<CreateView>,
    metasqls: Vec<LoadMetasql>,
    privs: Vec<LoadPriv>,
    reports: Vec<LoadReport>,
    appuis: Vec<LoadAppUi>,
    appscripts: Vec<LoadAppScript>,
    cmds: Vec<LoadCmd>,
    images: Vec<LoadImage>,
    prerequisites: Vec<Prerequisite>,
    scripts: Vec<Script>,
    final_scripts: Vec<FinalScript>,
}

impl Package {
    /// Parse a manifest document into a Package.
    ///
    /// `loader_version` is the running loader's own version, checked
    /// against the manifest's `updater` attribute. Malformed XML is an
    /// error; everything else wrong with the manifest lands in `diag`
    /// and a partially-populated Package is still returned so the
    /// caller can report on it.
    pub fn from_xml(
        xml: &str,
        loader_version: &Version,
        diag: &mut Diagnostics,
    ) -> Result<Package> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut pkg = Package::default();

        // Find the root element, skipping the declaration and comments.
        let (root, root_is_empty) = loop {
            match reader.read_event()? {
                Event::Start(e) => break (e, false),
                Event::Empty(e) => break (e, true),
                Event::Eof => {
                    return Err(Error::Parse("the manifest contains no elements".to_string()))
                }
                _ => {}
            }
        };

        let root_tag = String::from_utf8_lossy(root.name().as_ref()).into_owned();
        if root_tag != "package" {
            diag.fatal(format!(
                "The root tag must be 'package' but this package has a root tag named '{}'",
                root_tag
            ));
        }

        if let Some(required) = attr_value(&root, b"updater") {
            let Some(requiredversion) = version::parse_loose(&required) else {
                diag.fatal(format!(
                    "Could not parse the updater version string {} required by the package",
                    required
                ));
                return Ok(pkg);
            };
            if *loader_version < requiredversion {
                diag.fatal(format!(
                    "This package requires a newer version of the updater ({}) than you are \
                     currently running ({}). Please get a newer updater.",
                    required, loader_version
                ));
                return Ok(pkg);
            }
        }

        pkg.id = attr_value(&root, b"id").unwrap_or_default();
        pkg.name = attr_value(&root, b"name").unwrap_or_default();
        pkg.developer = attr_value(&root, b"developer").unwrap_or_default();
        pkg.description = attr_value(&root, b"descrip").unwrap_or_default();

        pkg.system = pkg.name.is_empty()
            && (pkg.developer == SYSTEM_DEVELOPER || pkg.developer.is_empty());
        debug!(
            name = %pkg.name,
            developer = %pkg.developer,
            system = pkg.system,
            "parsed package header"
        );

        match attr_value(&root, b"version") {
            Some(v) => match version::parse_loose(&v) {
                Some(parsed) => pkg.version = Some(parsed),
                None => {
                    diag.fatal(format!("Could not parse the package version string {}.", v));
                    return Ok(pkg);
                }
            },
            None if !pkg.system => {
                diag.fatal(
                    "Add-on packages must have version numbers but the package element \
                     has no version attribute.",
                );
                return Ok(pkg);
            }
            None => {}
        }

        if root_is_empty {
            return Ok(pkg);
        }

        // Warn once per distinct unknown tag, never per occurrence.
        let mut reported_tags: Vec<String> = Vec::new();
        let system = pkg.system;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    if e.name().as_ref() == b"prerequisite" {
                        pkg.prerequisites
                            .push(Prerequisite::from_reader(&e, &mut reader)?);
                    } else {
                        let text = reader.read_text(e.name())?.into_owned();
                        pkg.dispatch_child(&e, &text, system, diag, &mut reported_tags);
                    }
                }
                Event::Empty(e) => {
                    if e.name().as_ref() == b"prerequisite" {
                        pkg.prerequisites.push(Prerequisite::from_attributes(&e));
                    } else {
                        pkg.dispatch_child(&e, "", system, diag, &mut reported_tags);
                    }
                }
                Event::End(_) | Event::Eof => break,
                _ => {}
            }
        }

        debug!(
            functions = pkg.functions.len(),
            tables = pkg.tables.len(),
            triggers = pkg.triggers.len(),
            views = pkg.views.len(),
            metasqls = pkg.metasqls.len(),
            privs = pkg.privs.len(),
            reports = pkg.reports.len(),
            appuis = pkg.appuis.len(),
            appscripts = pkg.appscripts.len(),
            cmds = pkg.cmds.len(),
            images = pkg.images.len(),
            prerequisites = pkg.prerequisites.len(),
            scripts = pkg.scripts.len(),
            final_scripts = pkg.final_scripts.len(),
            "parsed package contents"
        );

        Ok(pkg)
    }

    /// Dispatch one child element on its tag name
    fn dispatch_child(
        &mut self,
        e: &BytesStart<'_>,
        text: &str,
        system: bool,
        diag: &mut Diagnostics,
        reported_tags: &mut Vec<String>,
    ) {
        match e.name().as_ref() {
            b"createfunction" => self
                .functions
                .push(CreateFunction::from_element(e, text, diag)),
            b"createtable" => self.tables.push(CreateTable::from_element(e, text, diag)),
            b"createtrigger" => self
                .triggers
                .push(CreateTrigger::from_element(e, text, diag)),
            b"createview" => self.views.push(CreateView::from_element(e, text, diag)),
            b"loadmetasql" => self
                .metasqls
                .push(LoadMetasql::from_element(e, text, system, diag)),
            b"loadpriv" => self
                .privs
                .push(LoadPriv::from_element(e, text, system, diag)),
            b"loadreport" => self
                .reports
                .push(LoadReport::from_element(e, text, system, diag)),
            b"loadappui" => self
                .appuis
                .push(LoadAppUi::from_element(e, text, system, diag)),
            b"loadappscript" => self
                .appscripts
                .push(LoadAppScript::from_element(e, text, system, diag)),
            b"loadcmd" => self.cmds.push(LoadCmd::from_element(e, text, system, diag)),
            b"loadimage" => self
                .images
                .push(LoadImage::from_element(e, text, system, diag)),
            b"pkgnotes" => self.notes.push_str(text),
            b"script" => self.scripts.push(Script::from_element(e, text, diag)),
            b"finalscript" => self
                .final_scripts
                .push(FinalScript::from_element(e, text, diag)),
            other => {
                let tag = String::from_utf8_lossy(other).into_owned();
                if !reported_tags.contains(&tag) {
                    warn!(tag = %tag, "unknown package element will be ignored");
                    diag.warn(format!(
                        "This package contains an element '{}'. The application does not \
                         know how to process it and so it will be ignored.",
                        tag
                    ));
                    reported_tags.push(tag);
                }
            }
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn developer(&self) -> &str {
        &self.developer
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    /// Core packages may omit the package name and version
    pub fn is_system(&self) -> bool {
        self.system
    }

    pub fn scripts(&self) -> &[Script] {
        &self.scripts
    }

    pub fn final_scripts(&self) -> &[FinalScript] {
        &self.final_scripts
    }

    pub fn prerequisites(&self) -> &[Prerequisite] {
        &self.prerequisites
    }

    pub fn reports(&self) -> &[LoadReport] {
        &self.reports
    }

    pub fn contains_report(&self, name: &str) -> bool {
        self.reports.iter().any(|r| r.name() == name)
    }

    pub fn contains_script(&self, name: &str) -> bool {
        self.scripts.iter().any(|s| s.name() == name)
    }

    pub fn contains_final_script(&self, name: &str) -> bool {
        self.final_scripts.iter().any(|s| s.name() == name)
    }

    pub fn contains_prerequisite(&self, name: &str) -> bool {
        self.prerequisites.iter().any(|p| p.name() == name)
    }

    pub fn contains_app_script(&self, name: &str) -> bool {
        self.appscripts.iter().any(|s| s.name() == name)
    }

    pub fn contains_app_ui(&self, name: &str) -> bool {
        self.appuis.iter().any(|u| u.name() == name)
    }

    pub fn contains_image(&self, name: &str) -> bool {
        self.images.iter().any(|i| i.name() == name)
    }

    pub fn contains_cmd(&self, name: &str) -> bool {
        self.cmds.iter().any(|c| c.name() == name)
    }

    pub fn contains_function(&self, name: &str) -> bool {
        self.functions.iter().any(|f| f.name() == name)
    }

    pub fn contains_metasql(&self, name: &str) -> bool {
        self.metasqls.iter().any(|m| m.name() == name)
    }

    pub fn contains_priv(&self, name: &str) -> bool {
        self.privs.iter().any(|p| p.name() == name)
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.tables.iter().any(|t| t.name() == name)
    }

    pub fn contains_trigger(&self, name: &str) -> bool {
        self.triggers.iter().any(|t| t.name() == name)
    }

    pub fn contains_view(&self, name: &str) -> bool {
        self.views.iter().any(|v| v.name() == name)
    }

    /// Serialize the package back to manifest XML.
    ///
    /// Create-object records (functions, tables, triggers, views) are
    /// not part of the round trip; the manifest format has never
    /// written them back out.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        let version = self
            .version
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default();
        let mut root = BytesStart::new("package");
        root.push_attribute(("id", self.id.as_str()));
        root.push_attribute(("version", version.as_str()));
        writer.write_event(Event::Start(root))?;

        for p in &self.prerequisites {
            p.write_xml(&mut writer)?;
        }
        for p in &self.privs {
            p.write_xml(&mut writer)?;
        }
        for m in &self.metasqls {
            m.write_xml(&mut writer)?;
        }
        for s in &self.scripts {
            s.write_xml(&mut writer)?;
        }
        for r in &self.reports {
            r.write_xml(&mut writer)?;
        }
        for u in &self.appuis {
            u.write_xml(&mut writer)?;
        }
        for s in &self.appscripts {
            s.write_xml(&mut writer)?;
        }
        for c in &self.cmds {
            c.write_xml(&mut writer)?;
        }
        for i in &self.images {
            i.write_xml(&mut writer)?;
        }
        for f in &self.final_scripts {
            f.write_xml(&mut writer)?;
        }

        writer.write_event(Event::End(BytesEnd::new("package")))?;

        String::from_utf8(writer.into_inner())
            .map_err(|e| Error::Parse(format!("serialized manifest is not UTF-8: {}", e)))
    }

    /// Upsert the package header into pkghead, keyed on package name.
    ///
    /// A package with no name has no header to create; that is not an
    /// error, just `None`. Otherwise returns the pkghead row id.
    pub fn write_to_db(&self, conn: &Connection) -> Result<Option<i64>> {
        if self.name.is_empty() {
            return Ok(None);
        }

        let version = self
            .version
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default();

        let existing: Option<i64> = conn
            .query_row(
                "SELECT pkghead_id FROM pkghead WHERE pkghead_name = ?1",
                [&self.name],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(id) => {
                conn.execute(
                    "UPDATE pkghead
                        SET pkghead_descrip = ?1,
                            pkghead_version = ?2,
                            pkghead_developer = ?3,
                            pkghead_notes = ?4,
                            pkghead_updated = CURRENT_TIMESTAMP
                      WHERE pkghead_id = ?5",
                    params![&self.description, version, &self.developer, &self.notes, id],
                )?;
                debug!(name = %self.name, id, "updated package header");
                Ok(Some(id))
            }
            None => {
                conn.execute(
                    "INSERT INTO pkghead (
                        pkghead_name, pkghead_descrip, pkghead_version,
                        pkghead_developer, pkghead_notes
                    ) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![&self.name, &self.description, version, &self.developer, &self.notes],
                )?;
                let id = conn.last_insert_rowid();
                debug!(name = %self.name, id, "inserted package header");
                Ok(Some(id))
            }
        }
    }
}
