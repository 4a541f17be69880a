use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::externals::sensors::services::SensorSuite;
use crate::models::wire::PushMessage;

use super::registry::{ClientRegistry, OutboundMessage};

/// Task: Runs on a fixed period. Each tick samples every sensor port,
/// assembles one telemetry record, and pushes it to every registered
/// subscriber, pruning any member whose push fails. Ticks are strictly
/// sequential; the next tick's sampling never starts before this tick's
/// fan-out attempts have all been issued. Can be cancelled.
#[tracing::instrument(skip_all)]
pub async fn task_broadcast_telemetry(
    token: CancellationToken,
    suite: Arc<SensorSuite>,
    registry: Arc<ClientRegistry>,
    period: Duration,
) {
    info!("Started.");
    loop {
        business_logic(&suite, &registry);

        tokio::select! {
            _ = token.cancelled() => {
                warn!("Cancelled.");
                break;
            },
            _ = tokio::time::sleep(period) => {}
        };
    }
}

/// Perform one tick: sample, serialize once, fan out.
#[tracing::instrument(skip_all)]
fn business_logic(suite: &SensorSuite, registry: &ClientRegistry) {
    trace!("Sampling {} sensor ports.", suite.len());
    let record = suite.sample_all();

    let line = match serde_json::to_string(&PushMessage::telemetry(record)) {
        Ok(line) => Arc::new(line),
        Err(e) => {
            error!("Failed to serialize telemetry record. Error: {}", e);
            return;
        }
    };

    fan_out(registry, line);
}

/// Push one serialized record to every current member. Pushes are
/// independent; a failure deregisters that one subscriber and never
/// aborts the iteration or delays the others.
pub fn fan_out(registry: &ClientRegistry, line: Arc<String>) {
    let members = registry.snapshot_members();
    trace!("Fanning out to {} subscribers.", members.len());

    for handle in members {
        if let Err(e) = handle.push(OutboundMessage::Telemetry(line.clone())) {
            debug!("Dropping subscriber {}. Reason: {}", handle.id(), e);
            registry.deregister(handle.id());
        }
    }
}
