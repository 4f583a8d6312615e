use clap::Args;

use common::crypto::KeyError;

use crate::session::{Session, SessionError};

/// Print the local identity and whether its key is on the relay
#[derive(Args, Debug, Clone)]
pub struct Show;

#[derive(Debug, thiserror::Error)]
pub enum ShowError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("failed to encode public key: {0}")]
    Key(#[from] KeyError),
}

#[async_trait::async_trait]
impl crate::op::Op for Show {
    type Error = ShowError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = Session::open(ctx.config_path.clone()).await?;
        let identity = session.identity();
        let public_key = identity.public_key();

        let published = match session
            .coordinator
            .directory()
            .has_published(identity.user_id())
            .await
        {
            Ok(true) => "yes".to_string(),
            Ok(false) => "no".to_string(),
            Err(e) => format!("unknown ({})", e),
        };

        Ok(format!(
            "User: {} (id: {})\n\
             Fingerprint: {}\n\
             Public key: {}\n\
             Published: {}",
            identity.display_name(),
            identity.user_id(),
            public_key.fingerprint()?,
            public_key.to_base64()?,
            published
        ))
    }
}
