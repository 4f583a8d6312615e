use std::path::PathBuf;

use clap::Args;

use common::crypto::KeyStoreError;

use crate::state::{AppState, StateError};

/// Write the public key to a file
#[derive(Args, Debug, Clone)]
pub struct Export {
    /// Destination file
    pub dest: PathBuf,

    /// Write PEM instead of raw DER
    #[arg(long)]
    pub pem: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("failed to export public key: {0}")]
    KeyStore(#[from] KeyStoreError),
}

#[async_trait::async_trait]
impl crate::op::Op for Export {
    type Error = ExportError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        state.key_store().export_public_key(&self.dest, self.pem)?;
        Ok(format!(
            "Exported public key ({}) to {}",
            if self.pem { "PEM" } else { "DER" },
            self.dest.display()
        ))
    }
}
