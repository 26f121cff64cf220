#[macro_use]
extern crate anyhow;

use std::path::PathBuf;

use anyhow::Result;
use structopt::StructOpt;

/// Every stage of the pipeline reads from one place and writes into a directory.
#[derive(Debug, StructOpt)]
pub struct StageArgs {
    /// The file or directory to process
    #[structopt(long, alias = "to_process")]
    pub to_process: PathBuf,
    /// The directory to write results into. Created if needed.
    #[structopt(long, alias = "output_dir")]
    pub output_dir: PathBuf,
}

impl StageArgs {
    /// Parses the command line, failing if the input doesn't exist.
    pub fn load() -> Result<Self> {
        Self::from_args().check()
    }

    fn check(self) -> Result<Self> {
        if !self.to_process.exists() {
            bail!("--to-process {} doesn't exist", self.to_process.display());
        }
        Ok(self)
    }
}

/// Logs at info level unless RUST_LOG says otherwise
pub fn setup_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
