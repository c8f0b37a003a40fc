//! Push transport over Server-Sent Events.
//!
//! The SSE protocol carries its own keep-alive comments, so this transport
//! has no ping support.

use super::{ConnectionHandle, Emitter};
use crate::endpoint::TransportKind;
use crate::error::TransportError;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub(super) fn open(
    runtime: &Handle,
    client: reqwest::Client,
    url: String,
    emitter: Emitter,
) -> ConnectionHandle {
    let cancel = CancellationToken::new();
    let handle = ConnectionHandle::new(TransportKind::Push, &emitter, cancel.clone(), None);
    runtime.spawn(run(client, url, emitter, cancel));
    handle
}

async fn run(client: reqwest::Client, url: String, emitter: Emitter, cancel: CancellationToken) {
    info!(url = %url, "Connecting to event stream");

    let request = client
        .get(&url)
        .header(ACCEPT, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .send();

    let response = tokio::select! {
        () = cancel.cancelled() => return,
        result = request => result,
    };

    let response = match response {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            let status = response.status();
            warn!(url = %url, %status, "Event stream rejected");
            emitter.error(TransportError::HttpStatus(status.as_u16()));
            emitter.close();
            return;
        }
        Err(e) => {
            warn!(url = %url, error = %e, "Event stream connect failed");
            emitter.error(e.into());
            emitter.close();
            return;
        }
    };

    emitter.open();

    let mut events = Box::pin(response.bytes_stream().eventsource());

    let result: Result<(), TransportError> = loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => return,

            next = events.next() => {
                match next {
                    Some(Ok(event)) => {
                        if event.data.trim().is_empty() {
                            continue;
                        }
                        if !event.event.is_empty() && event.event != "message" {
                            debug!(event = %event.event, "Named event received");
                        }
                        emitter.text(&event.data);
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Event stream read error");
                        break Err(TransportError::ReadFailed(e.to_string()));
                    }
                    None => {
                        info!("Event stream ended");
                        break Ok(());
                    }
                }
            }
        }
    };

    if let Err(e) = result {
        emitter.error(e);
    }
    emitter.close();
}
