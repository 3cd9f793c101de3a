use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "panelfetch")]
#[command(about = "Background fetcher for periodically refreshed HTTP resources", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $PANELFETCH_CONFIG or config/panelfetch.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Refresh the configured resources and serve their status
    Run,
    /// Fetch one URL through the worker and print the body
    Get(GetArgs),
    /// Show which trust anchor a host resolves to
    ResolveCert(ResolveCertArgs),
}

#[derive(clap::Args, Debug)]
pub struct GetArgs {
    pub url: String,

    /// Extra request header as `Name: value`; repeatable
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,
}

#[derive(clap::Args, Debug)]
pub struct ResolveCertArgs {
    pub host: String,

    /// Anchor directory, overriding `[tls] cert_dir`
    #[arg(long)]
    pub cert_dir: Option<PathBuf>,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected 'Name: value', got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in '{}'", raw));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
