//! Mock WebSocket server for integration tests.
//!
//! Accepts connections, pushes a fixed list of text frames to each one,
//! answers pings and counts what it saw.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};

#[derive(Clone)]
struct Behavior {
    frames: Arc<Vec<String>>,
    /// Send a non-normal close frame after the scripted frames.
    close_after: bool,
}

pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    connections: Arc<AtomicU32>,
    pings: Arc<AtomicU32>,
}

impl MockWsServer {
    /// Start a server that sends `frames` to every new connection and then
    /// keeps it open.
    pub async fn start(frames: Vec<String>) -> Self {
        Self::spawn(frames, false).await
    }

    /// Start a server that sends `frames` and then closes with code 1011.
    pub async fn start_closing(frames: Vec<String>) -> Self {
        Self::spawn(frames, true).await
    }

    async fn spawn(frames: Vec<String>, close_after: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicU32::new(0));
        let pings = Arc::new(AtomicU32::new(0));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let behavior = Behavior {
            frames: Arc::new(frames),
            close_after,
        };

        let connections_clone = connections.clone();
        let pings_clone = pings.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        connections_clone.fetch_add(1, Ordering::SeqCst);
                        tokio::spawn(handle_connection(stream, behavior.clone(), pings_clone.clone()));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            connections,
            pings,
        }
    }

    /// WebSocket URL of the server with `path` appended.
    pub fn url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    pub fn connection_count(&self) -> u32 {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn ping_count(&self) -> u32 {
        self.pings.load(Ordering::SeqCst)
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(stream: TcpStream, behavior: Behavior, pings: Arc<AtomicU32>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();

    for frame in behavior.frames.iter() {
        if write.send(Message::Text(frame.clone())).await.is_err() {
            return;
        }
    }

    if behavior.close_after {
        use tokio_tungstenite::tungstenite::protocol::{frame::coding::CloseCode, CloseFrame};
        let _ = write
            .send(Message::Close(Some(CloseFrame {
                code: CloseCode::Error,
                reason: "going away".into(),
            })))
            .await;
        return;
    }

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Ping(data)) => {
                pings.fetch_add(1, Ordering::SeqCst);
                let _ = write.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }
}
