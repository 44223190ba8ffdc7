use crate::commands::Commands;

use clap::Parser;

#[derive(Parser, Debug)]
#[clap(name = "beam")]
#[clap(about = "Send and receive files by scanning a code", long_about = None)]
pub struct Cli {
    #[clap(long, short, global = true, action, help = "Print debug logs")]
    pub verbose: bool,
    #[clap(subcommand)]
    pub command: Commands,
}
