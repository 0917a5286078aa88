use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "reporting-api", version, about = "Usage reporting API")]
pub(crate) struct Cli {
    /// YAML config file; replaces the default search path.
    #[arg(long, env = "REPORTING_API_CONFIG")]
    pub(crate) config: Option<PathBuf>,
}
