use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use kifu_tree::Config;
use kifu_tree::app::{self, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    let output = runtime.block_on(app::run(cli.command, &config))?;
    print!("{output}");
    Ok(())
}
