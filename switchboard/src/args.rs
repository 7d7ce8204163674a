use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Serving fabric for a multi-channel AI assistant.
#[derive(Debug, Parser)]
#[command(name = "switchboard", version)]
pub struct Args {
    /// Path to the switchboard TOML configuration file.
    #[arg(short, long, env = "SWITCHBOARD_CONFIG", default_value = "switchboard.toml")]
    pub config: PathBuf,

    /// Listen address override; takes precedence over the config file.
    #[arg(short, long, env = "SWITCHBOARD_LISTEN")]
    pub listen_address: Option<SocketAddr>,

    /// Log filter, e.g. `info` or `server=debug,runs=debug`.
    #[arg(long, env = "SWITCHBOARD_LOG", default_value = "info")]
    pub log_filter: String,
}
