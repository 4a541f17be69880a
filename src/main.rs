use std::sync::Arc;

use anyhow::Result;
use tokio::{net::TcpListener, signal};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::level_filters::LevelFilter;

use rover_relay::config::RelayConfig;
use rover_relay::externals::control::task::task_serve_control;
use rover_relay::externals::sensors;
use rover_relay::externals::subscribers::task::task_accept_subscribers;
use rover_relay::internals::broadcast::{task::task_broadcast_telemetry, ClientRegistry};
use rover_relay::internals::capture::SnapshotService;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false)
        .with_max_level(LevelFilter::DEBUG)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = RelayConfig::from_env()?;
    let tracker = TaskTracker::new();
    let token = CancellationToken::new();

    let suite = Arc::new(sensors::default_suite());
    let registry = Arc::new(ClientRegistry::new());
    let snapshots = Arc::new(SnapshotService::new(config.capture.clone()));

    let subscriber_listener = TcpListener::bind(config.subscriber_bind_addr).await?;
    let control_listener = TcpListener::bind(config.control_bind_addr).await?;
    tracing::info!(
        "Listening for subscribers on {} and control requests on {}.",
        config.subscriber_bind_addr,
        config.control_bind_addr
    );

    let token_clone = token.clone();
    let suite_clone = suite.clone();
    let registry_clone = registry.clone();
    let period = config.broadcast_period;
    tracker.spawn(async move {
        task_broadcast_telemetry(token_clone, suite_clone, registry_clone, period).await
    });

    let token_clone = token.clone();
    let registry_clone = registry.clone();
    let tracker_clone = tracker.clone();
    let push_buffer = config.push_buffer;
    tracker.spawn(async move {
        task_accept_subscribers(
            token_clone,
            subscriber_listener,
            registry_clone,
            tracker_clone,
            push_buffer,
        )
        .await
    });

    let token_clone = token.clone();
    let tracker_clone = tracker.clone();
    let radio_config = config.radio.clone();
    tracker.spawn(async move {
        task_serve_control(
            token_clone,
            control_listener,
            suite,
            snapshots,
            radio_config,
            tracker_clone,
        )
        .await
    });

    let token_clone = token.clone();
    tokio::select! {
        _ = token_clone.cancelled() => {}
        res = signal::ctrl_c() => {
            match res {
                Ok(_) => {
                    token.cancel();
                },
                Err(e) => {
                    tracing::error!("Failed to listen for ctrl_c. Error: {}", e);
                    token.cancel();
                }
            };
        },
    }

    registry.close_all();
    tracker.close();
    tracker.wait().await;

    Ok(())
}
