mod cache;
mod cli;
mod config;
mod lookup;
mod modinfo;
mod pack;
mod reconcile;
mod remote;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "packsmith=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = cli::parse_args(&args)?;
    cli::run(options)
}
