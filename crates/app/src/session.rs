use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use common::crypto::KeyStoreError;
use common::identity::Identity;
use common::relay::{FsRelay, RelayError};
use common::sharing::SharingCoordinator;

use crate::state::{AppState, StateError};

/// How often a watching command re-reads the relay
pub const WATCH_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Everything a command needs to talk to the relay as the local user
pub struct Session {
    pub state: AppState,
    pub coordinator: SharingCoordinator<FsRelay>,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("failed to load identity: {0}")]
    KeyStore(#[from] KeyStoreError),
    #[error("failed to open relay: {0}")]
    Relay(#[from] RelayError),
}

impl Session {
    pub async fn open(config_path: Option<PathBuf>) -> Result<Self, SessionError> {
        Self::from_state(AppState::load(config_path)?, false).await
    }

    /// Open a session whose relay keeps polling for changes made elsewhere
    pub async fn open_watching(config_path: Option<PathBuf>) -> Result<Self, SessionError> {
        Self::from_state(AppState::load(config_path)?, true).await
    }

    pub async fn from_state(state: AppState, watching: bool) -> Result<Self, SessionError> {
        let identity = Identity::load(
            state.config.user_id.clone(),
            state.config.profile(),
            &state.key_store(),
        )?;

        let relay = if watching {
            FsRelay::open_with_polling(&state.config.relay_dir, WATCH_POLL_INTERVAL).await?
        } else {
            FsRelay::open(&state.config.relay_dir).await?
        };

        let coordinator =
            SharingCoordinator::new(relay, Arc::new(identity), state.config.sharing_config());
        Ok(Self { state, coordinator })
    }

    pub fn identity(&self) -> &Identity {
        self.coordinator.identity()
    }
}
