//! Listener contract and the contexts listeners run on.

use std::time::Duration;

use codescan_core::Symbology;
use codescan_session::DecodeResult;
use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};

/// Status text of a user cancellation.
pub const CANCELLED: &str = "cancelled";

/// What a listener is told: a decoded payload, or an error with its cause.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub payload: Option<String>,
    pub is_error: bool,
    /// Cause of an error; empty on success.
    pub status_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbology: Option<Symbology>,
    /// Configuration epoch of a decoded payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch: Option<u64>,
}

impl ScanOutcome {
    pub fn decoded(result: &DecodeResult) -> Self {
        Self {
            payload: Some(result.payload.clone()),
            is_error: false,
            status_text: String::new(),
            symbology: Some(result.symbology),
            epoch: Some(result.epoch),
        }
    }

    pub fn failure(status_text: impl Into<String>) -> Self {
        Self {
            payload: None,
            is_error: true,
            status_text: status_text.into(),
            symbology: None,
            epoch: None,
        }
    }

    pub fn cancelled() -> Self {
        Self::failure(CANCELLED)
    }

    pub fn is_cancelled(&self) -> bool {
        self.is_error && self.payload.is_none() && self.status_text == CANCELLED
    }
}

/// Receiver of scan outcomes. A controller holds at most one.
pub trait ScanListener: Send {
    fn on_result(&mut self, outcome: ScanOutcome);
}

impl<F> ScanListener for F
where
    F: FnMut(ScanOutcome) + Send,
{
    fn on_result(&mut self, outcome: ScanOutcome) {
        self(outcome)
    }
}

pub type Task = Box<dyn FnOnce() + Send>;

/// Where listener invocations run.
///
/// Capture and relay threads never call a listener directly; they post a
/// task here. Tasks posted from one thread must run in posting order.
pub trait DeliveryContext: Send + Sync {
    fn post(&self, task: Task);
}

/// Run the listener on the posting thread, which is the relay thread.
///
/// A listener call already under way when another thread calls `stop` may
/// still finish after `stop` returns; use a [`ListenerQueue`] when the host
/// needs a hard cut-off.
#[derive(Clone, Copy, Debug, Default)]
pub struct Inline;

impl DeliveryContext for Inline {
    fn post(&self, task: Task) {
        task()
    }
}

/// Task queue drained by the host on its own thread, typically a UI loop.
#[derive(Clone)]
pub struct ListenerQueue {
    tx: Sender<Task>,
    rx: Receiver<Task>,
}

impl Default for ListenerQueue {
    fn default() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }
}

impl std::fmt::Debug for ListenerQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerQueue")
            .field("pending", &self.rx.len())
            .finish()
    }
}

impl ListenerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Run every task that is ready. Returns how many ran.
    pub fn pump(&self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Wait up to `timeout` for a task, then run it and everything ready
    /// behind it.
    pub fn pump_timeout(&self, timeout: Duration) -> usize {
        match self.rx.recv_timeout(timeout) {
            Ok(task) => {
                task();
                1 + self.pump()
            }
            Err(_) => 0,
        }
    }
}

impl DeliveryContext for ListenerQueue {
    fn post(&self, task: Task) {
        // receiver is owned by `self`
        let _ = self.tx.send(task);
    }
}
