//! panel-cli library: native host for the MCM Panel sync controller.
//!
//! Exposes the adapters and session loop so integration tests can drive
//! them without the binary.

pub mod config;
pub mod file_store;
pub mod firebase;
pub mod report;
pub mod session;
pub mod sse;

pub use config::{Config, ConfigError};
pub use file_store::FileLocalStore;
pub use firebase::FirebaseRemote;
pub use session::{SessionCommand, run_session};
