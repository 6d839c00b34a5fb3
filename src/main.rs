use clap::Parser;
use hedgeflow::cli::{Cli, Commands};
use hedgeflow::config::AppConfig;
use hedgeflow::error::{HedgeflowError, Result};

mod main_modes;
mod main_runtime;

use main_runtime::{init_logging, init_logging_simple};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from(&cli.config)?;
    cli.command.apply_overrides(&mut config);
    if let Err(errors) = config.validate() {
        return Err(HedgeflowError::Config(::config::ConfigError::Message(
            errors.join("; "),
        )));
    }

    match cli.command {
        Commands::Run { autostart, .. } => {
            init_logging(&config.logging);
            main_modes::run_service(config, autostart).await?;
        }
        Commands::Analyze { show_reasoning, .. } => {
            init_logging_simple();
            main_modes::run_analyze(config, show_reasoning).await?;
        }
        Commands::Config => {
            main_modes::show_config(&config)?;
        }
    }

    Ok(())
}
