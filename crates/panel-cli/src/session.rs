//! Interactive session: one loop over stdin commands, remote pushes, the
//! autosave timer and Ctrl-C. The loop owns the controller.

use crate::report;
use anyhow::Result;
use futures::StreamExt;
use panel_sync::remote::SnapshotResult;
use panel_sync::{LocalStore, RemoteStore, RootSubscription, StorageMode, SyncController, clock};
use serde_json::Value;
use std::path::PathBuf;
use std::str::FromStr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// One line of session input.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    /// `set <section> <json>`
    Set { section: String, value: Value },
    /// `save`
    Save,
    /// `export [path]`
    Export(Option<PathBuf>),
    /// `status`
    Status,
    /// `help`
    Help,
    /// `quit` / `exit`
    Quit,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseCommandError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command {0:?} (try `help`)")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
}

pub const HELP: &str = "\
Commands:
  set <section> <json>   replace a section
  save                   flush unsaved sections now
  export [path]          write a backup file
  status                 show mode and section status
  quit                   end the session";

impl FromStr for SessionCommand {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word {
            "" => Err(ParseCommandError::Empty),
            "set" => {
                let (section, json) = rest
                    .split_once(char::is_whitespace)
                    .ok_or(ParseCommandError::Usage("set <section> <json>"))?;
                let value = serde_json::from_str(json.trim())
                    .map_err(|e| ParseCommandError::InvalidJson(e.to_string()))?;
                Ok(SessionCommand::Set {
                    section: section.to_string(),
                    value,
                })
            }
            "save" => Ok(SessionCommand::Save),
            "export" if rest.is_empty() => Ok(SessionCommand::Export(None)),
            "export" => Ok(SessionCommand::Export(Some(PathBuf::from(rest)))),
            "status" => Ok(SessionCommand::Status),
            "help" | "?" => Ok(SessionCommand::Help),
            "quit" | "exit" => Ok(SessionCommand::Quit),
            other => Err(ParseCommandError::Unknown(other.to_string())),
        }
    }
}

/// Run one command and return the text to show.
pub async fn execute<L: LocalStore, R: RemoteStore>(
    ctrl: &mut SyncController<L, R>,
    command: SessionCommand,
) -> Result<String> {
    match command {
        SessionCommand::Set { section, value } => {
            ctrl.update_section(&section, value)?;
            Ok(match ctrl.mode() {
                StorageMode::Local => format!("Updated {} (saved locally)", section),
                StorageMode::Remote => format!("Updated {} (pending autosave)", section),
                StorageMode::Offline => {
                    format!("Updated {} (offline: export to keep changes)", section)
                }
            })
        }
        SessionCommand::Save => {
            ctrl.force_save().await?;
            Ok("Saved".to_string())
        }
        SessionCommand::Export(path) => {
            let path =
                path.unwrap_or_else(|| PathBuf::from(ctrl.backup_filename(clock::now_millis())));
            write_export(ctrl, &path).await?;
            Ok(format!("Exported to {}", path.display()))
        }
        SessionCommand::Status => Ok(report::status_report(ctrl)),
        SessionCommand::Help => Ok(HELP.to_string()),
        SessionCommand::Quit => Ok(String::new()),
    }
}

/// Write the export to `path`.
pub async fn write_export<L: LocalStore, R: RemoteStore>(
    ctrl: &SyncController<L, R>,
    path: &std::path::Path,
) -> Result<()> {
    let bytes = ctrl.export_document()?;
    tokio::fs::write(path, bytes).await?;
    info!("Exported {} sections to {:?}", ctrl.document().len(), path);
    Ok(())
}

async fn next_remote_item(subscription: &mut Option<RootSubscription>) -> Option<SnapshotResult> {
    match subscription.as_mut() {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}

/// Drive an initialized controller until `quit`, end of input or Ctrl-C.
pub async fn run_session<L, R, In>(ctrl: &mut SyncController<L, R>, input: In) -> Result<()>
where
    L: LocalStore,
    R: RemoteStore,
    In: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut subscription = ctrl.take_subscription();

    let period = ctrl.config().autosave_interval;
    let mut autosave = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    autosave.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Session started in {} mode. Type `help` for commands.", ctrl.mode());

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("Input closed");
                    break;
                };
                match line.parse::<SessionCommand>() {
                    Ok(SessionCommand::Quit) => break,
                    Ok(command) => match execute(ctrl, command).await {
                        Ok(reply) => println!("{}", reply),
                        Err(e) => println!("error: {:#}", e),
                    },
                    Err(ParseCommandError::Empty) => {}
                    Err(e) => println!("error: {}", e),
                }
            }

            item = next_remote_item(&mut subscription) => {
                match item {
                    Some(item) => ctrl.handle_remote_item(item),
                    None => {
                        warn!("Remote subscription ended; changes will still be written on save");
                        subscription = None;
                    }
                }
            }

            _ = autosave.tick(), if ctrl.autosave_due() => {
                ctrl.autosave_tick().await;
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    if ctrl.mode() == StorageMode::Remote && ctrl.is_dirty() {
        info!("Saving pending changes before exit");
        if let Err(e) = ctrl.force_save().await {
            warn!("Final save failed: {}", e);
        }
    }
    if ctrl.mode() == StorageMode::Offline && ctrl.is_dirty() {
        warn!("Offline session ended with unsaved changes; export before quitting to keep them");
    }

    drop(subscription);
    ctrl.shutdown();
    Ok(())
}
