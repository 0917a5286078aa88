use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rpcgw_authbridge::{AuthBridgeConfig, BridgeState, Cache, bridge_router};
use rpcgw_common::{ServeOptions, init_tracing, serve_until_signal, shutdown_signal};
use rpcgw_unkey::{KeyVerifier, UnkeyClient, UnkeyClientConfig};
use tracing::info;

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("auth-bridge failed: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (config, source) = AuthBridgeConfig::load(cli.config).context("failed to load config")?;
    init_tracing(&config.logging, "auth_bridge");
    info!(
        event = "config_loaded",
        source = ?source,
        addr = %config.server.addr(),
        unkey = %config.unkey.base_url,
        cache_enabled = config.cache.enabled,
        cache_backend = ?config.cache.backend,
        "config loaded"
    );

    let cache = Cache::connect(&config.cache)
        .await
        .context("failed to initialize cache")?;
    let verifier: Arc<dyn KeyVerifier> = Arc::new(
        UnkeyClient::new(UnkeyClientConfig {
            base_url: config.unkey.base_url.clone(),
            api_key: config.unkey.api_key.clone(),
            request_timeout: config.unkey.request_timeout,
        })
        .context("failed to initialize unkey client")?,
    );

    let app = bridge_router(
        BridgeState::new(verifier, cache.clone()),
        config.server.read_timeout + config.server.write_timeout,
    );
    let served = serve_until_signal(
        app,
        ServeOptions {
            addr: config.server.addr(),
            shutdown_timeout: config.server.shutdown_timeout,
        },
        shutdown_signal(),
    )
    .await;

    cache.close().await;
    served.context("server failed")?;
    info!(event = "stopped", "auth-bridge stopped");
    Ok(())
}
