//! trade-escrow CLI binary

use anyhow::Context;
use clap::Parser;
use trade_escrow::cli::{Cli, Commands, DemoApp, Scenario};
use trade_escrow::EngineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Demo { scenario } => {
            tracing::info!("Running demo scenario {:?}", scenario);
            let config = match scenario {
                Scenario::Expire { window_secs } => EngineConfig {
                    negotiation_window_secs: window_secs,
                    sweep_interval_ms: config.sweep_interval_ms.min(250),
                    ..config
                },
                _ => config,
            };
            let app = DemoApp::new(config).await?;
            app.run(scenario).await?;
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
