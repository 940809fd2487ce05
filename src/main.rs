mod app;
mod cli;
mod config;
mod db;
mod http;
mod logging;
mod paths;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    let _logger = logging::init_logging()?;
    let settings = config::Settings::load()?;
    app::run(cli, settings)
}
