use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinError;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub addr: String,
    /// Grace period for in-flight requests once the shutdown signal fires.
    pub shutdown_timeout: Duration,
}

/// Resolves on SIGINT or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Binds `options.addr`, serves `app` until `signal` resolves, then stops
/// accepting, drains in-flight requests for at most `shutdown_timeout` and
/// force-closes whatever is left.
pub async fn serve_until_signal<F>(
    app: Router,
    options: ServeOptions,
    signal: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(&options.addr).await?;
    info!(addr = %options.addr, "listening");
    serve_listener(listener, app, options.shutdown_timeout, signal).await
}

pub async fn serve_listener<F>(
    listener: TcpListener,
    app: Router,
    grace: Duration,
    signal: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = stop_rx.wait_for(|stop| *stop).await;
    });
    let mut server = tokio::spawn(async move { server.await });

    tokio::select! {
        result = &mut server => return flatten(result),
        _ = signal => {}
    }

    info!(grace_secs = grace.as_secs(), "shutdown signal received, draining");
    let _ = stop_tx.send(true);
    match tokio::time::timeout(grace, &mut server).await {
        Ok(result) => {
            info!("server stopped");
            flatten(result)
        }
        Err(_) => {
            warn!(grace_secs = grace.as_secs(), "graceful shutdown timed out, forcing close");
            server.abort();
            Ok(())
        }
    }
}

fn flatten(result: Result<std::io::Result<()>, JoinError>) -> std::io::Result<()> {
    result.map_err(std::io::Error::other)?
}
