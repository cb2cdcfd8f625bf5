use anyhow::{anyhow, Context};
use clap::Parser;
use servant::cli::Cli;
use servant::config::Config;
use servant::logging::{self, LogConfig};
use servant::runtime_config::RuntimeConfig;
use servant::server::Server;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
        config.listen_addr().context("Invalid --listen address")?;
    }

    let mut log_config = LogConfig::from_env();
    if let Some(level) = cli.log_level {
        log_config.log_level = level;
    }
    log_config.file = config.log.clone();
    let _log_guard = logging::init_logging(&log_config)?;

    RuntimeConfig::from_env().apply();

    let handle = Server::builder(config)
        .build()
        .start()
        .context("Failed to start server")?;
    handle
        .join()
        .map_err(|e| anyhow!("server stopped unexpectedly: {e:?}"))
}
