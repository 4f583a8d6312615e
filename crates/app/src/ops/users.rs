use clap::Args;
use futures::StreamExt;

use common::directory::{DirectoryError, PublicDirectoryEntry};

use crate::session::{Session, SessionError};

#[derive(Args, Debug, Clone)]
pub struct Users {
    /// Keep printing the directory as it changes (Ctrl-C to stop)
    #[arg(long)]
    pub watch: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum UsersError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("failed to read directory: {0}")]
    Directory(#[from] DirectoryError),
}

fn render(entries: &[PublicDirectoryEntry], local_user: &str) -> String {
    if entries.is_empty() {
        return "No users found".to_string();
    }
    entries
        .iter()
        .map(|entry| {
            let mut line = format!("{} <{}> (id: {})", entry.display_name, entry.email, entry.user_id);
            if !entry.has_public_key() {
                line.push_str(" [no public key]");
            }
            if entry.user_id == local_user {
                line.push_str(" [you]");
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait::async_trait]
impl crate::op::Op for Users {
    type Error = UsersError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        if !self.watch {
            let session = Session::open(ctx.config_path.clone()).await?;
            let entries = session.coordinator.directory().list().await?;
            return Ok(render(&entries, session.identity().user_id()));
        }

        let session = Session::open_watching(ctx.config_path.clone()).await?;
        let local_user = session.identity().user_id().to_string();
        let (handle, mut entries) = session.coordinator.directory().watch().await?;

        loop {
            tokio::select! {
                next = entries.next() => match next {
                    Some(entries) => println!("{}\n", render(&entries, &local_user)),
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    handle.cancel();
                    break;
                }
            }
        }
        Ok("Stopped watching".to_string())
    }
}
