//! One-shot request listener: the boundary behind which an HTTP layer or
//! richer protocol would live. Requests and JSON replies travel as
//! length-delimited frames; a successful snapshot is answered with one
//! frame of raw JPEG bytes (a JPEG frame starts with 0xFF, never `{`).

use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::RadioConfig;
use crate::externals::radio;
use crate::externals::sensors::services::SensorSuite;
use crate::internals::capture::SnapshotService;
use crate::models::wire::{ControlReply, ControlRequest};

/// Task: Accept control connections and spawn one session per connection.
/// Can be cancelled.
#[tracing::instrument(skip_all)]
pub async fn task_serve_control(
    token: CancellationToken,
    listener: TcpListener,
    suite: Arc<SensorSuite>,
    snapshots: Arc<SnapshotService>,
    radio_config: RadioConfig,
    tracker: TaskTracker,
) {
    info!("Started.");
    let mut incoming = TcpListenerStream::new(listener);

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                warn!("Cancelled.");
                break;
            },
            accepted = incoming.next() => {
                match accepted {
                    Some(Ok(stream)) => {
                        tracker.spawn(task_control_session(
                            token.clone(),
                            stream,
                            suite.clone(),
                            snapshots.clone(),
                            radio_config.clone(),
                        ));
                    }
                    Some(Err(e)) => {
                        warn!("Failed to accept control connection. Error: {}", e);
                    }
                    None => {
                        warn!("Control listener closed.");
                        break;
                    }
                }
            }
        };
    }
}

/// Task: Serve requests on one control connection until the peer closes
/// or cancellation.
#[tracing::instrument(skip_all)]
async fn task_control_session(
    token: CancellationToken,
    stream: TcpStream,
    suite: Arc<SensorSuite>,
    snapshots: Arc<SnapshotService>,
    radio_config: RadioConfig,
) {
    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                warn!("Cancelled.");
                break;
            },
            frame = framed.next() => {
                match frame {
                    None => break,
                    Some(Err(e)) => {
                        debug!("Control receive failed. Error: {}", e);
                        break;
                    }
                    Some(Ok(raw)) => {
                        let reply =
                            handle_request(&raw, &suite, &snapshots, &radio_config).await;
                        if let Err(e) = framed.send(reply).await {
                            debug!("Control reply failed. Error: {}", e);
                            break;
                        }
                    }
                }
            }
        };
    }
}

async fn handle_request(
    raw: &[u8],
    suite: &SensorSuite,
    snapshots: &SnapshotService,
    radio_config: &RadioConfig,
) -> Bytes {
    let request: ControlRequest = match serde_json::from_slice(raw) {
        Ok(request) => request,
        Err(e) => {
            return encode_reply(&ControlReply::BadRequest {
                detail: e.to_string(),
            })
        }
    };

    match request {
        ControlRequest::Sensors => encode_reply(&ControlReply::Sensors {
            payload: suite.sample_all(),
        }),
        ControlRequest::Snapshot => match snapshots.capture_still().await {
            Ok(bytes) => Bytes::from(bytes),
            Err(fault) => encode_reply(&ControlReply::Error { fault }),
        },
        ControlRequest::Radio { command } => {
            let config = radio_config.clone();
            let ok = tokio::task::spawn_blocking(move || radio::send_command(&config, &command))
                .await
                .unwrap_or(false);
            encode_reply(&ControlReply::Radio { ok })
        }
    }
}

fn encode_reply(reply: &ControlReply) -> Bytes {
    match serde_json::to_vec(reply) {
        Ok(bytes) => Bytes::from(bytes),
        Err(e) => {
            warn!("Failed to encode control reply. Error: {}", e);
            Bytes::from_static(b"{\"status\":\"error\"}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureConfig;
    use crate::externals::sensors::services::SensorPort;
    use crate::models::telemetry::{Reading, SensorSample};

    struct StubPort;

    impl SensorPort for StubPort {
        fn kind(&self) -> &'static str {
            "imu"
        }

        fn sample(&self) -> SensorSample {
            Reading::new().with_vector("accel", vec![0.0, 0.0, 9.81]).into()
        }
    }

    fn fixtures() -> (Arc<SensorSuite>, Arc<SnapshotService>, RadioConfig) {
        let suite = Arc::new(SensorSuite::new(vec![Box::new(StubPort)]));
        let snapshots = Arc::new(SnapshotService::with_factory(
            CaptureConfig {
                tool_candidates: vec![],
                ..CaptureConfig::default()
            },
            Box::new(|| None),
        ));
        (suite, snapshots, RadioConfig::default())
    }

    #[tokio::test]
    async fn test_sensors_request_returns_full_record() {
        let (suite, snapshots, radio_config) = fixtures();
        let reply = handle_request(
            br#"{"op":"sensors"}"#,
            &suite,
            &snapshots,
            &radio_config,
        )
        .await;

        let parsed: ControlReply = serde_json::from_slice(&reply).unwrap();
        match parsed {
            ControlReply::Sensors { payload } => {
                assert_eq!(payload.len(), 1);
                assert!(!payload.get("imu").unwrap().is_fault());
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_snapshot_failure_is_a_json_fault_frame() {
        let (suite, snapshots, radio_config) = fixtures();
        let reply = handle_request(
            br#"{"op":"snapshot"}"#,
            &suite,
            &snapshots,
            &radio_config,
        )
        .await;

        // Not a JPEG: the frame is a JSON fault.
        assert_eq!(reply[0], b'{');
        let parsed: ControlReply = serde_json::from_slice(&reply).unwrap();
        assert!(matches!(parsed, ControlReply::Error { .. }));
    }

    #[tokio::test]
    async fn test_malformed_request_is_a_bad_request_reply() {
        let (suite, snapshots, radio_config) = fixtures();
        let reply = handle_request(b"not json", &suite, &snapshots, &radio_config).await;

        let parsed: ControlReply = serde_json::from_slice(&reply).unwrap();
        assert!(matches!(parsed, ControlReply::BadRequest { .. }));
    }
}
