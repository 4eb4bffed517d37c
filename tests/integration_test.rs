// tests/integration_test.rs

//! Integration tests for the package loader
//!
//! These tests verify end-to-end functionality across modules: database
//! lifecycle, manifest parsing, header upsert, and script execution.

use pkgload::db;
use pkgload::manifest::{Diagnostics, Package};
use semver::Version;
use tempfile::NamedTempFile;

fn loader_version() -> Version {
    Version::parse(env!("CARGO_PKG_VERSION")).unwrap()
}

#[test]
fn test_database_lifecycle() {
    // Create a temporary database
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file.path().to_str().unwrap().to_string();

    // Remove the temp file so init can create it
    drop(temp_file);

    // Initialize the database
    let init_result = db::init(&db_path);
    assert!(
        init_result.is_ok(),
        "Database initialization should succeed"
    );

    // Verify database file exists
    assert!(
        std::path::Path::new(&db_path).exists(),
        "Database file should exist after initialization"
    );

    // Open the database
    let conn_result = db::open(&db_path);
    assert!(conn_result.is_ok(), "Opening database should succeed");

    // Verify we can query the metadata table
    let conn = conn_result.unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM pkghead", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0, "Fresh database should have no package headers");
}

#[test]
fn test_database_init_creates_parent_directories() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir
        .path()
        .join("nested/path/to/pkgload.db")
        .to_str()
        .unwrap()
        .to_string();

    let result = db::init(&db_path);
    assert!(result.is_ok(), "Should create parent directories");
    assert!(
        std::path::Path::new(&db_path).exists(),
        "Database should exist in nested path"
    );
}

#[test]
fn test_database_pragmas_are_set() {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file.path().to_str().unwrap().to_string();
    drop(temp_file);

    db::init(&db_path).unwrap();
    let conn = db::open(&db_path).unwrap();

    // Verify foreign keys are enabled
    let foreign_keys: i32 = conn
        .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
        .unwrap();
    assert_eq!(foreign_keys, 1, "Foreign keys should be enabled");

    // Verify WAL mode (on a fresh init)
    let journal_mode: String = conn
        .query_row("PRAGMA journal_mode", [], |row| row.get(0))
        .unwrap();
    assert_eq!(
        journal_mode.to_lowercase(),
        "wal",
        "Journal mode should be WAL"
    );
}

#[test]
fn test_full_package_load_workflow() {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file.path().to_str().unwrap().to_string();
    drop(temp_file);

    db::init(&db_path).unwrap();
    let conn = db::open(&db_path).unwrap();

    let xml = r#"<package id="crm" name="crm" developer="Example Software"
                   descrip="CRM add-on" version="2.0.1">
        <pkgnotes>Customer relationship screens.</pkgnotes>
        <script name="schema.sql" onerror="Stop"/>
        <finalscript name="grants.sql" onerror="Ignore"/>
      </package>"#;

    let mut diag = Diagnostics::new();
    let pkg = Package::from_xml(xml, &loader_version(), &mut diag).unwrap();
    assert!(!diag.has_fatal(), "diagnostics: {:?}", diag);

    // Header goes in first
    let id = pkg
        .write_to_db(&conn)
        .unwrap()
        .expect("named package should create a header row");

    let (name, version, developer, notes): (String, String, String, String) = conn
        .query_row(
            "SELECT pkghead_name, pkghead_version, pkghead_developer, pkghead_notes
               FROM pkghead WHERE pkghead_id = ?1",
            [id],
            |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            },
        )
        .unwrap();
    assert_eq!(name, "crm");
    assert_eq!(version, "2.0.1");
    assert_eq!(developer, "Example Software");
    assert_eq!(notes, "Customer relationship screens.");

    // Then the scripts run, in manifest order
    pkg.scripts()[0]
        .write_to_db(
            &conn,
            "CREATE TABLE crmacct (crmacct_id INTEGER PRIMARY KEY, crmacct_name TEXT);",
        )
        .unwrap();
    pkg.final_scripts()[0]
        .write_to_db(&conn, "INSERT INTO crmacct (crmacct_name) VALUES ('seed');")
        .unwrap();

    let accounts: i64 = conn
        .query_row("SELECT COUNT(*) FROM crmacct", [], |row| row.get(0))
        .unwrap();
    assert_eq!(accounts, 1, "final script should run against the same database");
}

#[test]
fn test_reloading_a_package_updates_its_header_in_place() {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file.path().to_str().unwrap().to_string();
    drop(temp_file);

    db::init(&db_path).unwrap();
    let conn = db::open(&db_path).unwrap();

    let v1 = r#"<package name="inventory" developer="Example" version="1.0.0"/>"#;
    let v2 = r#"<package name="inventory" developer="Example" version="1.1.0"
                  descrip="now with bin locations"/>"#;

    let mut diag = Diagnostics::new();
    let first = Package::from_xml(v1, &loader_version(), &mut diag).unwrap();
    let id1 = first.write_to_db(&conn).unwrap().unwrap();

    let mut diag = Diagnostics::new();
    let second = Package::from_xml(v2, &loader_version(), &mut diag).unwrap();
    let id2 = second.write_to_db(&conn).unwrap().unwrap();

    assert_eq!(id1, id2, "upsert should be keyed on package name");

    let (version, descrip): (String, String) = conn
        .query_row(
            "SELECT pkghead_version, pkghead_descrip FROM pkghead WHERE pkghead_id = ?1",
            [id1],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(version, "1.1.0");
    assert_eq!(descrip, "now with bin locations");
}

#[test]
fn test_fatal_manifest_still_returns_a_package_for_reporting() {
    let xml = r#"<package name="broken" developer="Example">
        <script name="a.sql"/>
      </package>"#;

    let mut diag = Diagnostics::new();
    let pkg = Package::from_xml(xml, &loader_version(), &mut diag).unwrap();

    // missing version on an add-on package is fatal, but the caller can
    // still see what was parsed so far
    assert!(diag.has_fatal());
    assert_eq!(pkg.name(), "broken");
}
