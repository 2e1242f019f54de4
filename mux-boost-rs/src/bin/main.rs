use anyhow::{Context as _, Result};
use clap::Parser;
use mux_boost_rs::{ConfigFile, Service};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[clap(version, about = "connecting proposers to the external builder network", long_about = None)]
struct Args {
    #[clap(env, default_value = "config.toml")]
    config_file: String,
}

fn setup_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let args = Args::parse();
    let config_file = &args.config_file;
    tracing::info!("loading config from `{config_file}`...");
    let config = ConfigFile::from_toml_file(config_file)
        .with_context(|| format!("could not load config from `{config_file}`"))?;

    let network = config.network;
    tracing::info!("configured for {network}");

    let service = Service::from(network, config.boost);
    tokio::select! {
        result = service.spawn() => Ok(result??),
        _ = signal::ctrl_c() => {
            tracing::info!("shutting down...");
            Ok(())
        }
    }
}
