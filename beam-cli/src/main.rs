use clap::Parser;
use log::LevelFilter;

mod cli;
mod commands;
mod error;
mod progress;
mod render;

use cli::Cli;
pub use error::AppError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let mut logger = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn"),
    );
    if args.verbose {
        logger.filter_level(LevelFilter::Debug);
    }
    logger.init();

    args.command.run().await?;
    Ok(())
}
