use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::internals::broadcast::{ClientRegistry, OutboundMessage};

const MAX_INBOUND_LINE: usize = 8 * 1024;

/// Task: Accept persistent subscriber connections and spawn one session
/// task per connection. Can be cancelled.
#[tracing::instrument(skip_all)]
pub async fn task_accept_subscribers(
    token: CancellationToken,
    listener: TcpListener,
    registry: Arc<ClientRegistry>,
    tracker: TaskTracker,
    push_buffer: usize,
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
                        tracker.spawn(task_subscriber_session(
                            token.clone(),
                            stream,
                            registry.clone(),
                            push_buffer,
                        ));
                    }
                    Some(Err(e)) => {
                        warn!("Failed to accept subscriber connection. Error: {}", e);
                    }
                    None => {
                        warn!("Subscriber listener closed.");
                        break;
                    }
                }
            }
        };
    }
}

/// Task: One live subscriber connection. Registers its handle, then
/// services two independent directions of traffic on a single task:
/// draining the outbound queue (telemetry pushes from the broadcast loop)
/// and answering inbound lines with a trivial `echo: ` reply. Owning both
/// socket halves here serializes all writes for the connection. Any
/// receive or send error, an explicit close, or cancellation deregisters
/// the handle and releases the connection.
#[tracing::instrument(skip_all)]
pub async fn task_subscriber_session(
    token: CancellationToken,
    stream: TcpStream,
    registry: Arc<ClientRegistry>,
    push_buffer: usize,
) {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let (tx, mut rx) = mpsc::channel(push_buffer);
    let id = registry.register(tx);
    info!("Subscriber {} connected from {}.", id, peer);

    let (read_half, write_half) = stream.into_split();
    let mut inbound = FramedRead::new(
        read_half,
        LinesCodec::new_with_max_length(MAX_INBOUND_LINE),
    );
    let mut outbound = FramedWrite::new(write_half, LinesCodec::new());

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                warn!("Cancelled.");
                break;
            },
            queued = rx.recv() => {
                match queued {
                    None | Some(OutboundMessage::Close) => {
                        debug!("Subscriber {} asked to close.", id);
                        break;
                    }
                    Some(OutboundMessage::Telemetry(line)) => {
                        if let Err(e) = outbound.send(line.as_str()).await {
                            debug!("Push to subscriber {} failed. Error: {}", id, e);
                            break;
                        }
                    }
                }
            },
            received = inbound.next() => {
                match received {
                    None => {
                        debug!("Subscriber {} closed the connection.", id);
                        break;
                    }
                    Some(Err(e)) => {
                        debug!("Receive from subscriber {} failed. Error: {}", id, e);
                        break;
                    }
                    Some(Ok(text)) => {
                        if let Err(e) = outbound.send(format!("echo: {}", text)).await {
                            debug!("Echo to subscriber {} failed. Error: {}", id, e);
                            break;
                        }
                    }
                }
            }
        };
    }

    registry.deregister(id);
    info!("Subscriber {} disconnected.", id);
}
