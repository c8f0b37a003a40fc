//! Duplex transport over WebSocket.

use super::{ConnectionHandle, Emitter};
use crate::endpoint::TransportKind;
use crate::error::TransportError;
use crate::heartbeat::HeartbeatMonitor;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Dial `url` on a background task and return its handle immediately.
pub(super) fn open(
    runtime: &Handle,
    url: String,
    emitter: Emitter,
    heartbeat_timeout: Duration,
) -> ConnectionHandle {
    let cancel = CancellationToken::new();
    let (ping_tx, ping_rx) = mpsc::unbounded_channel();
    let handle = ConnectionHandle::new(TransportKind::Duplex, &emitter, cancel.clone(), Some(ping_tx));
    runtime.spawn(run(url, emitter, cancel, ping_rx, heartbeat_timeout));
    handle
}

async fn run(
    url: String,
    emitter: Emitter,
    cancel: CancellationToken,
    mut ping_rx: mpsc::UnboundedReceiver<()>,
    heartbeat_timeout: Duration,
) {
    info!(url = %url, "Connecting to WebSocket");

    // TCP_NODELAY for lower latency (disable Nagle's algorithm)
    let connected = tokio::select! {
        () = cancel.cancelled() => return,
        result = connect_async_tls_with_config(url.as_str(), None, true, None) => result,
    };

    let ws_stream = match connected {
        Ok((ws_stream, _response)) => ws_stream,
        Err(e) => {
            warn!(url = %url, error = %e, "WebSocket connect failed");
            emitter.error(e.into());
            emitter.close();
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();
    emitter.open();

    let mut heartbeat = HeartbeatMonitor::new(heartbeat_timeout);
    let far_future = Instant::now() + Duration::from_secs(86_400 * 365);
    let mut pings_open = true;

    let result: Result<(), TransportError> = loop {
        let pong_deadline = heartbeat.pong_deadline().unwrap_or(far_future);

        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                // Caller closed; callbacks are already suppressed.
                if let Err(e) = write.send(Message::Close(None)).await {
                    debug!(error = %e, "Failed to send Close frame");
                }
                return;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        heartbeat.record_message();
                        emitter.text(&text);
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        heartbeat.record_message();
                        match std::str::from_utf8(&bytes) {
                            Ok(text) => emitter.text(text),
                            Err(_) => warn!(len = bytes.len(), "Dropping non-UTF-8 binary frame"),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        heartbeat.record_message();
                        debug!("Received ping, sending pong");
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            break Err(TransportError::SendFailed(e.to_string()));
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        heartbeat.record_pong();
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (f.code.into(), f.reason.to_string()))
                            .unwrap_or((1000, "Normal close".to_string()));
                        info!(code, %reason, "WebSocket closed by server");
                        if code == 1000 {
                            break Ok(());
                        }
                        break Err(TransportError::ConnectionClosed { code, reason });
                    }
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket read error");
                        break Err(TransportError::ReadFailed(e.to_string()));
                    }
                    None => {
                        info!("WebSocket stream ended");
                        break Ok(());
                    }
                }
            }

            ping = ping_rx.recv(), if pings_open => {
                let Some(()) = ping else {
                    pings_open = false;
                    continue;
                };
                if heartbeat.is_timed_out() {
                    break Err(TransportError::HeartbeatTimeout);
                }
                if heartbeat.is_waiting_for_pong() {
                    debug!("Ping skipped, previous ping still outstanding");
                    continue;
                }
                if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                    break Err(TransportError::SendFailed(e.to_string()));
                }
                heartbeat.record_ping();
            }

            () = sleep_until(pong_deadline), if heartbeat.is_waiting_for_pong() => {
                warn!(stats = ?heartbeat.stats(), "Heartbeat timeout");
                break Err(TransportError::HeartbeatTimeout);
            }
        }
    };

    if let Err(e) = result {
        emitter.error(e);
    }
    emitter.close();
}
