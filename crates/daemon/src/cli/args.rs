pub use clap::Parser;

use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "xfer")]
#[command(about = "Password-protected encrypted file buckets")]
pub struct Args {
    /// API endpoint of a running daemon (defaults to the configured port)
    #[arg(long, global = true)]
    pub remote: Option<Url>,

    /// Path to the xfer config directory (defaults to ~/.xfer)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
