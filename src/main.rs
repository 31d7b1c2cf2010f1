use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::signal;
use tracing::{error, info};

use digital_goods_fulfillment as app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = app::config::load_config()?;
    app::config::init_tracing(cfg.log_level(), cfg.log_json);
    app::handlers::health::init_start_time();

    let key = app::auth::ServiceAccountKey::from_file(&cfg.service_account_key_file)
        .context("failed to load service account key")?;
    let http = app::services::build_http_client(cfg.http_timeout())
        .context("failed to build outbound HTTP client")?;

    let authorizer = app::auth::ServiceAccountAuthorizer::new(key, http.clone())
        .context("failed to initialize service account authorization")?;
    info!(
        client_email = authorizer.client_email(),
        "service account authorization ready"
    );

    let commerce = app::services::ActionsCommerceClient::new(
        http,
        cfg.api_base_url(),
        cfg.package_name.clone(),
        Arc::new(authorizer),
    );
    let fulfillment = app::handlers::FulfillmentService::new(
        app::handlers::FulfillmentSettings::from(&cfg),
        Arc::new(commerce),
    );

    let host: std::net::IpAddr = cfg
        .host
        .parse()
        .with_context(|| format!("invalid host address '{}'", cfg.host))?;
    let addr = SocketAddr::from((host, cfg.port));

    let router = app::app_router(app::AppState::new(fulfillment));

    info!(
        environment = %cfg.environment,
        package = %cfg.package_name,
        "digital-goods-fulfillment listening on http://{}",
        addr
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("failed to install SIGTERM handler: {}", err);
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
