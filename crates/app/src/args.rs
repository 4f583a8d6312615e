pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "vault")]
#[command(about = "Share end-to-end encrypted files through an untrusted relay")]
#[command(version)]
pub struct Args {
    /// Path to the vault config directory (defaults to ~/.vault)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Log level for this run, overriding the config (e.g. debug)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: crate::Command,
}
