use std::path::PathBuf;

use clap::Args;

use common::sharing::{KeySource, ShareRequest, ShareState, SharingError};

use crate::session::{Session, SessionError};

/// Encrypt a file for another user and leave it on the relay
#[derive(Args, Debug, Clone)]
pub struct Share {
    /// Id of the recipient
    pub recipient: String,

    /// File to share
    pub file: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ShareError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Sharing(#[from] SharingError),
}

#[async_trait::async_trait]
impl crate::op::Op for Share {
    type Error = ShareError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = Session::open(ctx.config_path.clone()).await?;
        let request = ShareRequest::from_path(&self.recipient, &self.file)
            .await
            .map_err(|source| ShareError::Read {
                path: self.file.clone(),
                source,
            })?;

        let share = session.coordinator.spawn_send(request);
        let mut states = share.watch_state();

        loop {
            tokio::select! {
                changed = states.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    match *states.borrow_and_update() {
                        ShareState::InProgress(stage) => eprintln!("{}...", stage),
                        _ => break,
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("cancelling...");
                    share.cancel();
                    break;
                }
            }
        }

        let sent = share.join().await?;
        let key = match sent.key_source {
            KeySource::Cached => "cached",
            KeySource::Derived => "newly derived",
            KeySource::Unverified => "unverified",
        };
        Ok(format!(
            "Shared {} with {} (file id: {}, {} shared key)",
            sent.record.name, sent.recipient_id, sent.record.id, key
        ))
    }
}
