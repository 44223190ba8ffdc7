use clap::Subcommand;

use crate::AppError;

pub mod config;
mod inspect;
mod receive;
mod send;

#[derive(Debug, Subcommand)]
pub enum Commands {
    Send(send::SendFiles),
    Receive(receive::ReceiveFiles),
    Inspect(inspect::Inspect),
    #[command(about = "Show the configuration")]
    Config {
        #[clap(subcommand)]
        subcommand: config::Config,
    },
}

impl Commands {
    pub async fn run(&self) -> Result<(), AppError> {
        match self {
            Commands::Send(send) => send.run().await,
            Commands::Receive(receive) => receive.run().await,
            Commands::Inspect(inspect) => inspect.run(),
            Commands::Config { subcommand } => subcommand.run(),
        }
    }
}
