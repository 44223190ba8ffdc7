use beam_core::config::BeamConfig;
use clap::Subcommand;

use crate::AppError;

#[derive(Clone, Debug, Subcommand)]
pub enum Config {
    #[command(about = "Print the configuration in effect, overrides included")]
    Show,
    #[command(about = "Print where the config file lives")]
    Path,
}

impl Config {
    pub fn run(&self) -> Result<(), AppError> {
        match self {
            Config::Show => {
                let config = BeamConfig::load()?;
                let rendered = toml::to_string_pretty(&config)
                    .map_err(|e| AppError::ConfigRenderError(e.to_string()))?;
                print!("{}", rendered);
            }
            Config::Path => {
                println!("{}", BeamConfig::config_file()?.display());
            }
        }
        Ok(())
    }
}
