use anyhow::bail;
use clap::Parser;

use mods2parquet::batch;
use mods2parquet::cli::{AltoCli, AltoConfig};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = AltoCli::parse();
    if let Err(message) = cli.validate() {
        bail!(message);
    }
    batch::run_alto(&AltoConfig::from_cli(&cli))
}
