use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use args::Args;
use clap::Parser;
use config::Config;
use server::ServeConfig;
use tokio_util::sync::CancellationToken;

mod args;
mod dev;

const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:8085";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = if args.config.exists() {
        Config::load(&args.config).with_context(|| format!("Failed to load {}", args.config.display()))?
    } else {
        Config::default()
    };

    let listen_address: SocketAddr = args
        .listen_address
        .or(config.server.listen_address)
        .unwrap_or_else(|| DEFAULT_LISTEN_ADDRESS.parse().expect("default listen address is valid"));

    let shutdown_signal = CancellationToken::new();

    {
        let shutdown_signal = shutdown_signal.clone();

        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown_signal.cancel();
            }
        });
    }

    server::serve(ServeConfig {
        listen_address,
        config,
        shutdown_signal,
        log_filter: args.log_filter,
        version: env!("CARGO_PKG_VERSION").to_string(),
        bound_addr_sender: None,
        model: Arc::new(dev::DevConnector),
        sessions: None,
        tools: None,
    })
    .await
}
