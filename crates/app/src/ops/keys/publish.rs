use clap::Args;

use common::directory::DirectoryError;

use crate::session::{Session, SessionError};

/// Publish the local profile and public key to the directory
#[derive(Args, Debug, Clone)]
pub struct Publish;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("failed to publish public key: {0}")]
    Directory(#[from] DirectoryError),
}

#[async_trait::async_trait]
impl crate::op::Op for Publish {
    type Error = PublishError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = Session::open(ctx.config_path.clone()).await?;
        let entry = session
            .coordinator
            .directory()
            .publish(session.identity())
            .await?;
        Ok(format!(
            "Published public key for {} <{}>",
            entry.display_name, entry.email
        ))
    }
}
