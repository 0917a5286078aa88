use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rpcgw_common::{ServeOptions, init_tracing, serve_until_signal, shutdown_signal};
use rpcgw_reporting::{
    AdminKey, HttpMetrics, RateLimiter, ReportingConfig, ReportingState, RouterOptions,
    reporting_router,
};
use rpcgw_storage::{ClickHouseRepository, PostgresRepository};
use tracing::{info, warn};

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("reporting-api failed: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (config, source) = ReportingConfig::load(cli.config).context("failed to load config")?;
    init_tracing(&config.logging, "reporting_api");
    info!(
        event = "config_loaded",
        source = ?source,
        environment = %config.server.environment,
        addr = %config.server.addr(),
        "config loaded"
    );

    let analytics = ClickHouseRepository::connect(config.clickhouse.clone())
        .await
        .context("failed to connect to clickhouse")?;
    info!(event = "clickhouse_connected", host = %config.clickhouse.host);
    let metadata = PostgresRepository::connect(&config.postgresql)
        .await
        .context("failed to connect to postgresql")?;
    info!(event = "postgresql_connected", host = %config.postgresql.host);

    let admin_key = if config.auth.enabled {
        info!(event = "auth_enabled");
        Some(AdminKey::new(&config.auth.admin_api_key))
    } else {
        warn!(event = "auth_disabled", "authentication disabled, not suitable for production");
        None
    };
    let rate_limiter = config.rate_limit.enabled.then(|| {
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit.requests,
            config.rate_limit.window,
        ));
        limiter.clone().spawn_sweeper();
        info!(
            event = "rate_limit_enabled",
            requests = config.rate_limit.requests,
            window_secs = config.rate_limit.window.as_secs()
        );
        limiter
    });

    let metrics = Arc::new(HttpMetrics::new().context("failed to register metrics")?);
    let app = reporting_router(
        ReportingState::new(Arc::new(analytics), Arc::new(metadata)),
        metrics,
        RouterOptions {
            admin_key,
            rate_limiter,
            request_timeout: config.server.read_timeout + config.server.write_timeout,
        },
    );

    serve_until_signal(
        app,
        ServeOptions {
            addr: config.server.addr(),
            shutdown_timeout: config.server.shutdown_timeout,
        },
        shutdown_signal(),
    )
    .await
    .context("server failed")?;
    info!(event = "stopped", "reporting-api stopped");
    Ok(())
}
