// src/main.rs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pkgload::manifest::{Diagnostics, OnError, Package};
use pkgload::db;
use rusqlite::Connection;
use semver::Version;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "pkgload")]
#[command(author, version, about = "Declarative package loader for ERP extension bundles", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the package metadata database
    Init {
        /// Database path
        #[arg(short, long, default_value = "pkgload.db")]
        db_path: String,
    },
    /// Parse a manifest and report its diagnostics without touching the database
    Check {
        /// Path to the package manifest (package.xml)
        manifest: String,
    },
    /// Load a package: upsert its header and run its scripts
    Load {
        /// Path to the package manifest (package.xml)
        manifest: String,
        /// Database path
        #[arg(short, long, default_value = "pkgload.db")]
        db_path: String,
        /// Policy for scripts whose manifest says onerror="Default"
        #[arg(long, value_enum, default_value_t = OnErrorPolicy::Stop)]
        on_error: OnErrorPolicy,
    },
}

/// Driver-level fallback for the per-script onerror policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OnErrorPolicy {
    Stop,
    Prompt,
    Ignore,
}

impl OnErrorPolicy {
    fn as_policy(self) -> OnError {
        match self {
            OnErrorPolicy::Stop => OnError::Stop,
            OnErrorPolicy::Prompt => OnError::Prompt,
            OnErrorPolicy::Ignore => OnError::Ignore,
        }
    }
}

fn loader_version() -> Result<Version> {
    Version::parse(env!("CARGO_PKG_VERSION")).context("loader version is not valid semver")
}

/// Parse a manifest file, echoing every diagnostic to the log
fn parse_manifest(manifest_path: &str) -> Result<(Package, Diagnostics)> {
    let xml = fs::read_to_string(manifest_path)
        .with_context(|| format!("failed to read manifest: {}", manifest_path))?;

    let version = loader_version()?;
    let mut diag = Diagnostics::new();
    let pkg = Package::from_xml(&xml, &version, &mut diag)
        .with_context(|| format!("failed to parse manifest: {}", manifest_path))?;

    for (msg, fatal) in diag.iter() {
        if fatal {
            tracing::error!("{}", msg);
        } else {
            warn!("{}", msg);
        }
    }

    Ok((pkg, diag))
}

/// Run one script payload, honoring its onerror policy
fn run_script(
    conn: &Connection,
    base: &Path,
    name: &str,
    policy: OnError,
    fallback: OnErrorPolicy,
    run: impl Fn(&Connection, &str) -> pkgload::Result<()>,
) -> Result<()> {
    let path = base.join(name);
    let payload = fs::read_to_string(&path)
        .with_context(|| format!("failed to read script file: {}", path.display()))?;

    match run(conn, &payload) {
        Ok(()) => {
            info!(script = %name, "script applied");
            Ok(())
        }
        Err(e) => {
            let requested = if policy == OnError::Default {
                fallback.as_policy()
            } else {
                policy
            };
            if requested == OnError::Prompt {
                // No GUI here; prompting degrades to stopping.
                warn!(script = %name, "onerror=Prompt is not available in a non-interactive run; stopping");
            }
            match policy.resolve(fallback.as_policy()) {
                OnError::Ignore => {
                    warn!(script = %name, error = %e, "script failed; continuing per onerror policy");
                    Ok(())
                }
                _ => {
                    bail!("script {} failed: {}", name, e);
                }
            }
        }
    }
}

fn cmd_check(manifest: &str) -> Result<()> {
    let (pkg, diag) = parse_manifest(manifest)?;

    println!(
        "package '{}' version {} by '{}'{}",
        pkg.name(),
        pkg.version().map(|v| v.to_string()).unwrap_or_else(|| "(none)".to_string()),
        pkg.developer(),
        if pkg.is_system() { " [system]" } else { "" }
    );
    println!(
        "{} scripts, {} final scripts, {} prerequisites",
        pkg.scripts().len(),
        pkg.final_scripts().len(),
        pkg.prerequisites().len()
    );

    for (msg, fatal) in diag.iter() {
        println!("{}: {}", if fatal { "error" } else { "warning" }, msg);
    }

    if diag.has_fatal() {
        bail!("manifest has fatal errors");
    }
    println!("manifest OK");
    Ok(())
}

fn cmd_load(manifest: &str, db_path: &str, on_error: OnErrorPolicy) -> Result<()> {
    let (pkg, diag) = parse_manifest(manifest)?;
    if diag.has_fatal() {
        bail!("manifest has fatal errors; nothing was loaded");
    }

    let conn = db::open(db_path)?;

    match pkg.write_to_db(&conn)? {
        Some(id) => info!(package = %pkg.name(), pkghead_id = id, "package header stored"),
        None => info!("system package without a name; no header row written"),
    }

    // Script payloads live in files next to the manifest.
    let base = Path::new(manifest).parent().unwrap_or_else(|| Path::new("."));

    for script in pkg.scripts() {
        run_script(
            &conn,
            base,
            script.filename(),
            script.on_error(),
            on_error,
            |conn, payload| script.write_to_db(conn, payload),
        )?;
    }
    for script in pkg.final_scripts() {
        run_script(
            &conn,
            base,
            script.filename(),
            script.on_error(),
            on_error,
            |conn, payload| script.write_to_db(conn, payload),
        )?;
    }

    info!(package = %pkg.name(), "package loaded");
    Ok(())
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_path } => {
            info!("Initializing package metadata database at: {}", db_path);
            db::init(&db_path)?;
            println!("Database initialized successfully at: {}", db_path);
            Ok(())
        }
        Commands::Check { manifest } => cmd_check(&manifest),
        Commands::Load {
            manifest,
            db_path,
            on_error,
        } => cmd_load(&manifest, &db_path, on_error),
    }
}
