use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "auth-bridge", version, about = "API key verification bridge")]
pub(crate) struct Cli {
    /// YAML config file; replaces the default search path.
    #[arg(long, env = "AUTH_BRIDGE_CONFIG")]
    pub(crate) config: Option<PathBuf>,
}
