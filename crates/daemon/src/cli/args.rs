pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ckp")]
#[command(about = "Pair hosts that observe the same events via the candidate key protocol")]
pub struct Args {
    /// Path to the ckp config directory (defaults to ~/.ckp)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
