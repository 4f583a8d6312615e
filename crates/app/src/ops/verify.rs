use std::path::PathBuf;

use clap::Args;

use common::sharing::{Authenticity, SharingError};

use crate::session::{Session, SessionError};

/// Check a local file against the signature of a shared file
#[derive(Args, Debug, Clone)]
pub struct Verify {
    /// Id of the shared file the local copy came from
    pub file_id: String,

    /// Local copy to check
    pub path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Sharing(#[from] SharingError),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{0} does not match the signature of the shared file")]
    Mismatch(PathBuf),
}

#[async_trait::async_trait]
impl crate::op::Op for Verify {
    type Error = VerifyError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let content = tokio::fs::read(&self.path)
            .await
            .map_err(|source| VerifyError::Read {
                path: self.path.clone(),
                source,
            })?;

        let session = Session::open(ctx.config_path.clone()).await?;
        let record = session.coordinator.find_incoming(&self.file_id).await?;

        match session.coordinator.verify_local(&record, &content).await? {
            Authenticity::Authentic => Ok(format!(
                "{} matches {} as signed by {} <{}>",
                self.path.display(),
                record.name,
                record.author_name,
                record.author_id
            )),
            Authenticity::Tampered => Err(VerifyError::Mismatch(self.path.clone())),
        }
    }
}
