//! Mock REST endpoint serving a JSON snapshot, built on axum.

use axum::{routing::get, Json, Router};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct MockRestServer {
    addr: SocketAddr,
    hits: Arc<AtomicU32>,
}

impl MockRestServer {
    /// Serve `snapshot` at `/api/telemetry`.
    pub async fn start(snapshot: serde_json::Value) -> Self {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let snapshot = Arc::new(snapshot);

        let app = Router::new().route(
            "/api/telemetry",
            get(move || {
                let snapshot = snapshot.clone();
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json((*snapshot).clone())
                }
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, hits }
    }

    pub fn url(&self) -> String {
        format!("http://{}/api/telemetry", self.addr)
    }

    pub fn hits(&self) -> u32 {
        self.hits.load(Ordering::SeqCst)
    }
}
