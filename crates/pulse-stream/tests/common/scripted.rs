//! Connector whose connections follow a script instead of the network.

use parking_lot::Mutex;
use pulse_stream::{
    ConnectionHandle, Connector, Emitter, Endpoint, TransportError, TransportKind,
};
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// What a scripted connection does after `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Report a connect failure (`on_error` then `on_close`).
    Fail,
    /// Report `on_open` and stay up until the test drives it.
    Open,
    /// Do nothing until the test drives it.
    Hold,
}

struct Opened {
    emitter: Emitter,
    pings: mpsc::UnboundedReceiver<()>,
    cancel: CancellationToken,
}

pub struct ScriptedConnector {
    plan: Mutex<VecDeque<Script>>,
    fallback: Script,
    opened: Mutex<Vec<Opened>>,
}

impl ScriptedConnector {
    /// Connections follow `plan` in order, then `fallback` forever.
    pub fn new(plan: impl IntoIterator<Item = Script>, fallback: Script) -> Self {
        Self {
            plan: Mutex::new(plan.into_iter().collect()),
            fallback,
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn always(script: Script) -> Self {
        Self::new([], script)
    }

    /// Append steps to the plan.
    pub fn then(&self, steps: impl IntoIterator<Item = Script>) {
        self.plan.lock().extend(steps);
    }

    pub fn opens(&self) -> usize {
        self.opened.lock().len()
    }

    /// Emitter of the `index`-th connection (0-based).
    pub fn emitter(&self, index: usize) -> Emitter {
        self.opened.lock()[index].emitter.clone()
    }

    pub fn last_emitter(&self) -> Emitter {
        self.opened
            .lock()
            .last()
            .map(|o| o.emitter.clone())
            .expect("no connection opened")
    }

    /// Whether the `index`-th connection was closed by its owner.
    pub fn was_closed(&self, index: usize) -> bool {
        self.opened.lock()[index].cancel.is_cancelled()
    }

    /// Drain and count pings sent on the `index`-th connection.
    pub fn take_pings(&self, index: usize) -> usize {
        let mut opened = self.opened.lock();
        let mut count = 0;
        while opened[index].pings.try_recv().is_ok() {
            count += 1;
        }
        count
    }
}

impl Connector for ScriptedConnector {
    fn open(&self, _endpoint: &Endpoint, emitter: Emitter) -> ConnectionHandle {
        let script = self.plan.lock().pop_front().unwrap_or(self.fallback);
        let cancel = CancellationToken::new();
        let (ping_tx, pings) = mpsc::unbounded_channel();
        let handle =
            ConnectionHandle::new(TransportKind::Duplex, &emitter, cancel.clone(), Some(ping_tx));

        self.opened.lock().push(Opened {
            emitter: emitter.clone(),
            pings,
            cancel,
        });

        match script {
            Script::Fail => {
                tokio::spawn(async move {
                    emitter.error(TransportError::ConnectionFailed("refused".to_string()));
                    emitter.close();
                });
            }
            Script::Open => {
                tokio::spawn(async move {
                    emitter.open();
                });
            }
            Script::Hold => {}
        }
        handle
    }
}
