use clap::Parser;
use std::path::PathBuf;

/// Serves upload, training and SoC prediction endpoints for battery sessions.
#[derive(Parser, Debug, Clone)]
#[command(name = "soc-estimator", version)]
pub struct Args {
    /// Interface the HTTP API binds to.
    #[arg(long, env = "SOC_HOST", default_value = "127.0.0.1")]
    pub host: String,
    #[arg(long, env = "SOC_PORT", default_value_t = 5000)]
    pub port: u16,
    /// Root for uploads and trained models; overrides SOC_DATA_ROOT.
    #[arg(long)]
    pub data_root: Option<PathBuf>,
    /// Print the resolved training and storage settings as JSON and exit.
    #[arg(long, conflicts_with = "print_openapi")]
    pub print_config: bool,
    #[arg(long)]
    pub print_openapi: bool,
}

impl Args {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
