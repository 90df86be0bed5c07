//! Command-line interfaces for the two converters.

use std::path::PathBuf;

use clap::Parser;

/// Convert the MODS metadata in METS files to a Parquet table.
#[derive(Parser, Debug, Clone)]
#[command(name = "mods2parquet")]
#[command(about = "Convert the MODS metadata in METS files to a Parquet table")]
#[command(version)]
pub struct ModsCli {
    /// METS files to process (directories are expanded to their files)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output Parquet file
    #[arg(short = 'o', long = "output", default_value = "mods_info_df.parquet")]
    pub output: PathBuf,

    /// Output Parquet file for per-page information
    #[arg(long = "output-page-info")]
    pub output_page_info: Option<PathBuf>,

    /// Ignore unknown tags instead of failing the document
    #[arg(long = "lenient")]
    pub lenient: bool,
}

impl ModsCli {
    pub fn validate(&self) -> Result<(), String> {
        validate_inputs(&self.inputs)
    }
}

/// Convert ALTO OCR layout documents to a Parquet table.
#[derive(Parser, Debug, Clone)]
#[command(name = "alto2parquet")]
#[command(about = "Convert ALTO OCR layout documents to a Parquet table")]
#[command(version)]
pub struct AltoCli {
    /// ALTO files to process (directories are expanded to their files)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output Parquet file
    #[arg(short = 'o', long = "output", default_value = "alto_info_df.parquet")]
    pub output: PathBuf,

    /// Ignore unknown tags instead of failing the document
    #[arg(long = "lenient")]
    pub lenient: bool,
}

impl AltoCli {
    pub fn validate(&self) -> Result<(), String> {
        validate_inputs(&self.inputs)
    }
}

fn validate_inputs(inputs: &[PathBuf]) -> Result<(), String> {
    for input in inputs {
        if !input.exists() {
            return Err(format!("Input does not exist: {}", input.display()));
        }
    }
    Ok(())
}

/// Batch configuration derived from the CLI.
#[derive(Debug, Clone)]
pub struct ModsConfig {
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub output_page_info: Option<PathBuf>,
    pub strict: bool,
}

impl ModsConfig {
    pub fn from_cli(cli: &ModsCli) -> Self {
        Self {
            inputs: cli.inputs.clone(),
            output: cli.output.clone(),
            output_page_info: cli.output_page_info.clone(),
            strict: !cli.lenient,
        }
    }
}

/// Batch configuration derived from the CLI.
#[derive(Debug, Clone)]
pub struct AltoConfig {
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub strict: bool,
}

impl AltoConfig {
    pub fn from_cli(cli: &AltoCli) -> Self {
        Self {
            inputs: cli.inputs.clone(),
            output: cli.output.clone(),
            strict: !cli.lenient,
        }
    }
}
