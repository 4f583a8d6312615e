use std::path::PathBuf;

use clap::Args;

use crate::session::{Session, SessionError};
use crate::state::{AppConfig, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Id of the local user on the relay
    #[arg(long)]
    pub user_id: String,

    /// Display name shown to other users
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub email: String,

    /// Relay directory shared with other users (default: <vault dir>/relay)
    #[arg(long)]
    pub relay_dir: Option<PathBuf>,

    /// Where fetched files are saved (default: the system downloads directory)
    #[arg(long)]
    pub downloads_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] StateError),
    #[error("init failed: {0}")]
    Session(#[from] SessionError),
    #[error("user id must not be empty or contain '/'")]
    InvalidUserId,
}

#[async_trait::async_trait]
impl crate::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        if self.user_id.is_empty() || self.user_id.contains('/') {
            return Err(InitError::InvalidUserId);
        }

        let vault_dir = AppState::vault_dir(ctx.config_path.clone())?;
        let relay_dir = self
            .relay_dir
            .clone()
            .unwrap_or_else(|| AppState::default_relay_dir(&vault_dir));

        let mut config = AppConfig::new(&self.user_id, &self.name, &self.email, relay_dir);
        config.downloads_dir = self.downloads_dir.clone();

        let state = AppState::init(Some(vault_dir), config)?;
        let session = Session::from_state(state, false).await?;

        let published = match session
            .coordinator
            .directory()
            .publish(session.identity())
            .await
        {
            Ok(_) => "yes".to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to publish public key, run 'vault keys publish' to retry");
                format!("no ({})", e)
            }
        };

        let state = &session.state;
        Ok(format!(
            "Initialized vault directory at: {}\n\
             - User: {} <{}>\n\
             - Keys: {}\n\
             - Config: {}\n\
             - Relay: {}\n\
             - Downloads: {}\n\
             - Public key published: {}",
            state.vault_dir.display(),
            state.config.user_id,
            state.config.email,
            state.keys_path.display(),
            state.config_path.display(),
            state.config.relay_dir.display(),
            state.downloads_dir().display(),
            published
        ))
    }
}
