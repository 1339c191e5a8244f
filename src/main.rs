use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use nexus_hub::adapters::http::app_router;
use nexus_hub::adapters::{MqttBroker, ZigbeeState};
use nexus_hub::application::DeviceController;
use nexus_hub::config::AppConfig;
use nexus_hub::domain::zigbee::DeviceTopics;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(&config);
    config.validate().context("invalid configuration")?;

    // No broker, no hub
    let (broker, inbox) = MqttBroker::connect(&config.mqtt)
        .await
        .context("failed to connect to MQTT broker")?;
    let broker = Arc::new(broker);

    let topics = DeviceTopics::new(config.mqtt.base_topic.clone());
    let controller = DeviceController::new_shared(broker.clone(), topics);
    let dispatch = tokio::spawn(controller.clone().run(inbox));

    let app = app_router(
        ZigbeeState::new(controller, config.server.outbound_queue_capacity),
        &config.server,
    );
    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!(address = %addr, "nexus-hub listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server error")?;

    if let Err(e) = broker.disconnect().await {
        tracing::warn!(error = %e, "MQTT disconnect failed");
    }
    dispatch.abort();

    info!("nexus-hub stopped");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    if config.json_logs() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
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

    info!("received shutdown signal");
}
