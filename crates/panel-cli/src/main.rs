//! mcm-panel: command-line host for the MCM Panel document.
//!
//! Uses the same panel-sync controller as the web panel, with a JSON file
//! for local storage and the Realtime Database REST API for remote storage.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use panel_sync::{StorageMode, clock};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use panel_cli::session::{self, run_session};
use panel_cli::{Config, report};

#[derive(Parser, Debug)]
#[command(name = "mcm-panel")]
#[command(version, about = "MCM Panel data sync")]
struct Args {
    /// Directory for the local document
    #[arg(long, env = "MCM_PANEL_DATA_DIR", default_value = "~/.mcm-panel", global = true)]
    data_dir: String,

    /// Realtime Database URL; without it the panel works from local storage only
    #[arg(long, env = "MCM_FIREBASE_DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Database secret or ID token
    #[arg(long, env = "MCM_FIREBASE_AUTH", hide_env_values = true, global = true)]
    auth: Option<String>,

    /// Seconds between automatic saves in remote mode
    #[arg(long, default_value_t = 10, global = true)]
    autosave_secs: u64,

    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the storage mode and section status
    Status,

    /// Write the document to a backup file
    Export {
        /// Output path (defaults to `<prefix>-<date>.json` in the current directory)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Replace the document with a backup file
    Import {
        file: PathBuf,

        /// In remote mode, publish the imported document immediately
        #[arg(long)]
        save: bool,
    },

    /// Replace one section from a JSON file and save
    Set { section: String, file: PathBuf },

    /// Verify write access to the remote database
    Check,

    /// Delete the local document
    ClearLocal,

    /// Interactive session reading commands from stdin
    Session,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,panel_sync=debug,panel_cli=debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::new(
        &args.data_dir,
        args.database_url,
        args.auth,
        args.autosave_secs,
    )?;
    info!("Data directory: {:?}", config.data_dir);

    let mut ctrl = config.controller();

    // Clearing must not load the document first: a local document would
    // pin the session to local mode.
    if let Command::ClearLocal = args.command {
        ctrl.clear_local()?;
        println!("Local document removed");
        return Ok(());
    }

    let (_, mode) = ctrl.initialize().await?;
    info!("Storage mode: {}", mode);

    match args.command {
        Command::Status => {
            print!("{}", report::status_report(&ctrl));
        }
        Command::Export { out } => {
            let path =
                out.unwrap_or_else(|| PathBuf::from(ctrl.backup_filename(clock::now_millis())));
            session::write_export(&ctrl, &path).await?;
            println!("Exported to {}", path.display());
        }
        Command::Import { file, save } => {
            let bytes = std::fs::read(&file).with_context(|| format!("reading {:?}", file))?;
            ctrl.import_document(&bytes)?;
            match ctrl.mode() {
                StorageMode::Remote if save => {
                    ctrl.mark_all_dirty();
                    ctrl.force_save().await?;
                    println!("Imported and published {} sections", ctrl.document().len());
                }
                StorageMode::Remote => {
                    warn!("Remote mode: import was not published (use --save)");
                    println!("Imported {} sections (not published)", ctrl.document().len());
                }
                _ => println!("Imported {} sections into local storage", ctrl.document().len()),
            }
        }
        Command::Set { section, file } => {
            let text =
                std::fs::read_to_string(&file).with_context(|| format!("reading {:?}", file))?;
            let value: serde_json::Value =
                serde_json::from_str(&text).with_context(|| format!("parsing {:?}", file))?;
            ctrl.update_section(&section, value)?;
            if ctrl.mode() == StorageMode::Offline {
                bail!("offline: {} was not saved (export or configure a backend)", section);
            }
            ctrl.force_save().await?;
            println!("Saved {} ({} mode)", section, ctrl.mode());
        }
        Command::Check => {
            ctrl.check_connection().await?;
            println!("Remote database reachable and writable");
        }
        Command::Session => {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            run_session(&mut ctrl, stdin).await?;
        }
        Command::ClearLocal => {}
    }

    ctrl.shutdown();
    Ok(())
}
