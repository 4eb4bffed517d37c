// src/error.rs

use thiserror::Error;

/// Core error types for the package loader
#[derive(Error, Debug)]
pub enum Error {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest XML errors
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Manifest structure/content errors
    #[error("Manifest error: {0}")]
    Parse(String),

    /// Script payload was empty
    #[error("The file {0} is empty")]
    EmptyScript(String),

    /// Script payload failed to execute
    #[error("The following error was encountered while trying to import {file} into the database: {source}")]
    ScriptFailed {
        file: String,
        source: rusqlite::Error,
    },

    /// Database initialization error
    #[error("Failed to initialize database: {0}")]
    InitError(String),

    /// Database not found
    #[error("Database not found at path: {0}")]
    DatabaseNotFound(String),
}

/// Result type alias using the loader's Error type
pub type Result<T> = std::result::Result<T, Error>;
