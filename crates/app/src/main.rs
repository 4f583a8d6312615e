// CLI modules
mod args;
mod logging;
mod op;
mod ops;
mod session;
mod state;

use args::Args;
use clap::{Parser, Subcommand};
use op::Op;
use ops::{Fetch, Inbox, Init, Keys, Share, Users, Verify, Version};
use state::AppState;
use tracing_subscriber::filter::LevelFilter;

command_enum! {
    (Init, Init),
    (Keys, Keys),
    (Users, Users),
    (Share, Share),
    (Inbox, Inbox),
    (Fetch, Fetch),
    (Verify, Verify),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Logging follows the config when there is one; `init` runs without
    let config = AppState::load(args.config_path.clone())
        .ok()
        .map(|state| state.config);
    let level = args
        .log_level
        .as_deref()
        .and_then(|level| level.parse().ok())
        .or_else(|| config.as_ref().map(|config| config.log_level()))
        .unwrap_or(LevelFilter::WARN);
    let log_dir = config.as_ref().and_then(|config| config.log_dir.as_ref());
    let guards = logging::init_logging(level, log_dir);

    let ctx = op::OpContext::new(args.config_path);

    let result = args.command.execute(&ctx).await;
    // Flush buffered log lines before exiting
    drop(guards);

    match result {
        Ok(output) => {
            println!("{}", output);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
