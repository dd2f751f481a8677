use crate::file_store::FileLocalStore;
use crate::firebase::FirebaseRemote;
use panel_sync::{SyncConfig, SyncController};
use std::path::PathBuf;
use std::time::Duration;

/// Resolved CLI configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the local document file
    pub data_dir: PathBuf,
    /// Realtime database root URL; `None` means no remote is configured
    pub database_url: Option<String>,
    /// Value for the `auth` query parameter
    pub auth: Option<String>,
    pub autosave_interval: Duration,
}

impl Config {
    /// Build from raw option values (as given on the command line or in env).
    pub fn new(
        data_dir: &str,
        database_url: Option<String>,
        auth: Option<String>,
        autosave_secs: u64,
    ) -> Result<Self, ConfigError> {
        if autosave_secs == 0 {
            return Err(ConfigError::InvalidAutosaveInterval);
        }
        let database_url = database_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
        if let Some(url) = &database_url {
            if !url.starts_with("https://") && !url.starts_with("http://") {
                return Err(ConfigError::InvalidDatabaseUrl(url.clone()));
            }
        }

        Ok(Self {
            data_dir: expand_tilde(data_dir),
            database_url,
            auth: auth.filter(|a| !a.is_empty()),
            autosave_interval: Duration::from_secs(autosave_secs),
        })
    }

    /// Controller wired to the file store and, when configured, Firebase.
    pub fn controller(&self) -> SyncController<FileLocalStore, FirebaseRemote> {
        let local = FileLocalStore::new(&self.data_dir);
        let remote = self
            .database_url
            .as_deref()
            .map(|url| FirebaseRemote::new(url, self.auth.clone()));
        SyncController::new(
            local,
            remote,
            SyncConfig {
                autosave_interval: self.autosave_interval,
            },
        )
    }
}

/// Expand ~ or ~/ prefix to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"))
    } else if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Autosave interval must be at least one second")]
    InvalidAutosaveInterval,

    #[error("Database URL must be an http(s) URL, got {0:?}")]
    InvalidDatabaseUrl(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_database_url_means_unconfigured() {
        let config = Config::new("/tmp/panel", Some("  ".into()), Some(String::new()), 10).unwrap();
        assert!(config.database_url.is_none());
        assert!(config.auth.is_none());
        assert_eq!(config.data_dir, PathBuf::from("/tmp/panel"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            Config::new("/tmp", None, None, 0),
            Err(ConfigError::InvalidAutosaveInterval)
        ));
        assert!(matches!(
            Config::new("/tmp", Some("mcm.firebaseio.com".into()), None, 10),
            Err(ConfigError::InvalidDatabaseUrl(_))
        ));
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/.mcm-panel"), home.join(".mcm-panel"));
        }
    }
}
