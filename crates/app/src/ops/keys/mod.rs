use clap::{Args, Subcommand};

pub mod export;
pub mod publish;
pub mod reset;
pub mod show;

use crate::op::Op;

crate::command_enum! {
    (Show, show::Show),
    (Publish, publish::Publish),
    (Export, export::Export),
    (Reset, reset::Reset),
}

pub type KeysCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct Keys {
    #[command(subcommand)]
    pub command: KeysCommand,
}

#[async_trait::async_trait]
impl Op for Keys {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}
