use anyhow::{Context, Result};
use clap::Parser;
use soc_estimator::{cli, config, openapi, routes, state};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

/// Binds the API listener, turning an occupied port into a hint about `--port`.
async fn bind_listener(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr).await.map_err(|err| {
        if err.kind() == std::io::ErrorKind::AddrInUse {
            anyhow::anyhow!(
                "cannot serve SoC estimates on {addr}: the port is taken by another process; pass --port <PORT> or set SOC_PORT"
            )
        } else {
            anyhow::Error::new(err).context(format!("binding API listener on {addr}"))
        }
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = cli::Args::parse();
    if args.print_openapi {
        println!(
            "{}",
            serde_json::to_string_pretty(&openapi::openapi_json())?
        );
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = config::CoreConfig::from_env(args.data_root.clone())?;
    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&config.summary())?);
        return Ok(());
    }
    config
        .ensure_dirs()
        .context("preparing upload and model directories")?;
    tracing::info!(
        data_root = %config.data_root.display(),
        window = config.sequence.window,
        estimators = config.boosting.n_estimators,
        "configuration loaded"
    );

    let state = state::AppState::from_config(config);
    let app = routes::router(state).layer(CorsLayer::permissive());
    let addr = args.bind_addr();
    let listener = bind_listener(&addr).await?;
    tracing::info!(%addr, "soc-estimator listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::bind_listener;

    #[tokio::test]
    async fn occupied_port_points_at_port_flag() {
        let Ok(first) = bind_listener("127.0.0.1:0").await else {
            // Sandboxes can block binding.
            return;
        };
        let addr = first.local_addr().unwrap().to_string();

        let message = bind_listener(&addr).await.unwrap_err().to_string();
        assert!(message.contains(&addr), "{message}");
        assert!(message.contains("port is taken"), "{message}");
        assert!(message.contains("--port"), "{message}");
    }
}
