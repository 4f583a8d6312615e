use clap::Args;

use common::crypto::{KeyError, KeyStoreError};
use common::directory::DirectoryError;

use crate::session::{Session, SessionError};
use crate::state::{AppState, StateError};

/// Replace the identity key pair and publish the new public key.
///
/// Files already shared with this user can no longer be decrypted.
#[derive(Args, Debug, Clone)]
pub struct Reset {
    /// Confirm that existing shares become unreadable
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ResetError {
    #[error("refusing to reset keys without --force: files shared with you become unreadable")]
    NotConfirmed,
    #[error(transparent)]
    State(#[from] StateError),
    #[error("failed to reset keys: {0}")]
    KeyStore(#[from] KeyStoreError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("keys regenerated but not published: {0}")]
    Directory(#[from] DirectoryError),
    #[error("failed to encode public key: {0}")]
    Key(#[from] KeyError),
}

#[async_trait::async_trait]
impl crate::op::Op for Reset {
    type Error = ResetError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        if !self.force {
            return Err(ResetError::NotConfirmed);
        }

        let state = AppState::load(ctx.config_path.clone())?;
        let key_store = state.key_store();
        key_store.reset()?;
        key_store.generate_identity()?;

        let session = Session::from_state(state, false).await?;
        session
            .coordinator
            .directory()
            .publish(session.identity())
            .await?;

        Ok(format!(
            "Generated and published a new key pair\nFingerprint: {}",
            session.identity().public_key().fingerprint()?
        ))
    }
}
