use clap::Parser;
use std::path::PathBuf;

/// Serve configured commands and files over HTTP.
#[derive(Parser, Debug)]
#[command(name = "servant", version, about)]
pub struct Cli {
    /// YAML configuration file
    #[arg(short, long, env = "SERVANT_CONFIG", default_value = "servant.yaml")]
    pub config: PathBuf,

    /// Listen address, overriding `server.listen`
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Log level, overriding SERVANT_LOG_LEVEL
    #[arg(long)]
    pub log_level: Option<String>,
}
