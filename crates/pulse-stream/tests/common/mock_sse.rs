//! Mock Server-Sent Events server built on axum.
//!
//! Routes:
//! - `/events`: sends the configured events, then stays open
//! - `/down`: always 503
//! - `/snapshot`: JSON body for fallback fetches

use axum::{
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        Sse,
    },
    routing::get,
    Json, Router,
};
use futures_util::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

pub struct MockSseServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockSseServer {
    pub async fn start(events: Vec<String>, snapshot: serde_json::Value) -> Self {
        let events = Arc::new(events);
        let snapshot = Arc::new(snapshot);

        let app = Router::new()
            .route(
                "/events",
                get(move || {
                    let events = events.clone();
                    async move { event_stream(events) }
                }),
            )
            .route("/down", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
            .route(
                "/snapshot",
                get(move || {
                    let snapshot = snapshot.clone();
                    async move { Json((*snapshot).clone()) }
                }),
            );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

fn event_stream(
    events: Arc<Vec<String>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let frames: Vec<Result<Event, Infallible>> = events
        .iter()
        .map(|data| Ok(Event::default().data(data.clone())))
        .collect();
    let stream = stream::iter(frames).chain(stream::pending());
    Sse::new(stream).keep_alive(KeepAlive::default())
}
