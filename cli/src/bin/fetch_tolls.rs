//! Sends every trip CSV to the toll service and saves the answers as JSON.

use anyhow::Result;

use cli::StageArgs;
use tolls::{TollGuru, TollGuruConfig, DEFAULT_WORKERS};

fn main() -> Result<()> {
    cli::setup_logger();
    let args = StageArgs::load()?;

    let api = TollGuru::new(TollGuruConfig::from_env()?)?;
    tolls::fetch_tolls(&api, &args.to_process, &args.output_dir, DEFAULT_WORKERS)?;
    Ok(())
}
