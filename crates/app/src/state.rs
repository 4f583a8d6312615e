use std::{fs, path::PathBuf, time::Duration};

use common::crypto::{KeyStore, KeyStoreError};
use common::identity::Profile;
use common::sharing::{SharingConfig, DEFAULT_NETWORK_TIMEOUT};
use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::LevelFilter;

pub const APP_NAME: &str = "vault";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const KEYS_DIR_NAME: &str = "keys";
pub const RELAY_DIR_NAME: &str = "relay";
pub const DOWNLOADS_DIR_NAME: &str = "downloads";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Id of the local user on the relay
    pub user_id: String,
    pub display_name: String,
    pub email: String,
    #[serde(default)]
    pub avatar_ref: String,
    /// Directory of the relay shared with other users
    pub relay_dir: PathBuf,
    /// Where fetched files are saved (defaults to the system downloads dir)
    #[serde(default)]
    pub downloads_dir: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Optional directory for daily rolling log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default = "default_network_timeout_secs")]
    pub network_timeout_secs: u64,
    #[serde(default)]
    pub attach_hmac: bool,
    #[serde(default)]
    pub verify_counterparty_epoch: bool,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_network_timeout_secs() -> u64 {
    DEFAULT_NETWORK_TIMEOUT.as_secs()
}

impl AppConfig {
    pub fn new(
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        email: impl Into<String>,
        relay_dir: PathBuf,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            email: email.into(),
            avatar_ref: String::new(),
            relay_dir,
            downloads_dir: None,
            log_level: default_log_level(),
            log_dir: None,
            network_timeout_secs: default_network_timeout_secs(),
            attach_hmac: false,
            verify_counterparty_epoch: false,
        }
    }

    pub fn profile(&self) -> Profile {
        Profile {
            display_name: self.display_name.clone(),
            email: self.email.clone(),
            avatar_ref: self.avatar_ref.clone(),
        }
    }

    pub fn sharing_config(&self) -> SharingConfig {
        SharingConfig::default()
            .with_network_timeout(Duration::from_secs(self.network_timeout_secs.max(1)))
            .with_hmac(self.attach_hmac)
            .with_counterparty_epoch_check(self.verify_counterparty_epoch)
    }

    /// The configured level, falling back to `warn` if it does not parse
    pub fn log_level(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::WARN)
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the vault directory (~/.vault)
    pub vault_dir: PathBuf,
    /// Path to the identity key files
    pub keys_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the vault directory path (custom or default ~/.vault)
    pub fn vault_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Default relay location for a fresh vault directory
    pub fn default_relay_dir(vault_dir: &std::path::Path) -> PathBuf {
        vault_dir.join(RELAY_DIR_NAME)
    }

    /// Initialize a new vault directory and generate the identity keys
    pub fn init(custom_path: Option<PathBuf>, config: AppConfig) -> Result<Self, StateError> {
        let vault_dir = Self::vault_dir(custom_path)?;

        if vault_dir.join(CONFIG_FILE_NAME).exists() {
            return Err(StateError::AlreadyInitialized);
        }

        fs::create_dir_all(&vault_dir)?;

        let keys_path = vault_dir.join(KEYS_DIR_NAME);
        let key_store = KeyStore::new(&keys_path);
        if !key_store.exists() {
            key_store.generate_identity()?;
        }

        let config_path = vault_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        Ok(Self {
            vault_dir,
            keys_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the vault directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let vault_dir = Self::vault_dir(custom_path)?;

        if !vault_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let keys_path = vault_dir.join(KEYS_DIR_NAME);
        let config_path = vault_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }
        if !keys_path.exists() {
            return Err(StateError::MissingFile(format!("{}/", KEYS_DIR_NAME)));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            vault_dir,
            keys_path,
            config_path,
            config,
        })
    }

    pub fn key_store(&self) -> KeyStore {
        KeyStore::new(&self.keys_path)
    }

    /// Where fetched files go: the configured directory, the system
    ///  downloads directory, or `downloads/` inside the vault directory
    pub fn downloads_dir(&self) -> PathBuf {
        self.config
            .downloads_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| self.vault_dir.join(DOWNLOADS_DIR_NAME))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("vault directory not initialized. Run 'vault init' first")]
    NotInitialized,

    #[error("vault directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("key store error: {0}")]
    KeyStore(#[from] KeyStoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    fn config(dir: &std::path::Path) -> AppConfig {
        AppConfig::new("u1", "Alice", "alice@example.com", dir.join("relay"))
    }

    #[test]
    fn test_init_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let vault_dir = dir.path().join("vault");

        let state = AppState::init(Some(vault_dir.clone()), config(dir.path())).unwrap();
        assert!(state.config_path.exists());
        assert!(state.key_store().exists());

        let loaded = AppState::load(Some(vault_dir.clone())).unwrap();
        assert_eq!(loaded.config, state.config);
        assert!(loaded.key_store().load_identity().is_ok());

        assert!(matches!(
            AppState::init(Some(vault_dir), config(dir.path())),
            Err(StateError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_load_uninitialized() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            AppState::load(Some(dir.path().join("missing"))),
            Err(StateError::NotInitialized)
        ));
        assert!(matches!(
            AppState::load(Some(dir.path().to_path_buf())),
            Err(StateError::MissingFile(_))
        ));
    }

    #[test]
    fn test_config_defaults() {
        let minimal = r#"
            user_id = "u1"
            display_name = "Alice"
            email = "alice@example.com"
            relay_dir = "/tmp/relay"
        "#;
        let config: AppConfig = toml::from_str(minimal).unwrap();
        assert_eq!(config.log_level(), LevelFilter::WARN);
        assert_eq!(config.network_timeout_secs, 30);
        assert!(!config.attach_hmac);
        assert_eq!(config.sharing_config(), SharingConfig::default());
        assert_eq!(config.downloads_dir, None);
    }

    #[test]
    fn test_downloads_dir_override() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.downloads_dir = Some(dir.path().join("inbox"));
        let state = AppState::init(Some(dir.path().join("vault")), config).unwrap();
        assert_eq!(state.downloads_dir(), dir.path().join("inbox"));
    }
}
