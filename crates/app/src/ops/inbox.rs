use clap::Args;
use futures::StreamExt;

use common::records::SharedFileRecord;
use common::sharing::SharingError;

use crate::ops::describe_record;
use crate::session::{Session, SessionError};

/// List files shared with you
#[derive(Args, Debug, Clone)]
pub struct Inbox {
    /// Keep printing the inbox as files arrive (Ctrl-C to stop)
    #[arg(long)]
    pub watch: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum InboxError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Sharing(#[from] SharingError),
}

fn render(records: &[SharedFileRecord]) -> String {
    if records.is_empty() {
        return "No shared files".to_string();
    }
    records
        .iter()
        .map(describe_record)
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait::async_trait]
impl crate::op::Op for Inbox {
    type Error = InboxError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        if !self.watch {
            let session = Session::open(ctx.config_path.clone()).await?;
            return Ok(render(&session.coordinator.incoming().await?));
        }

        let session = Session::open_watching(ctx.config_path.clone()).await?;
        let (handle, mut records) = session.coordinator.watch_incoming().await?;

        loop {
            tokio::select! {
                next = records.next() => match next {
                    Some(records) => println!("{}\n", render(&records)),
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
