use anyhow::bail;
use clap::Parser;

use mods2parquet::batch;
use mods2parquet::cli::{ModsCli, ModsConfig};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = ModsCli::parse();
    if let Err(message) = cli.validate() {
        bail!(message);
    }
    batch::run_mods(&ModsConfig::from_cli(&cli))
}
