use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
pub struct MainArgs {
    /// The path to the config file for the mission
    #[clap(long, short)]
    pub config: PathBuf,

    /// Fly the in-process simulated vehicle instead of the configured one
    #[clap(long)]
    pub dry_run: bool,
}
