//! Result relay between a capture session and its listener.
//!
//! The relay thread reads session events in order, decides what may reach
//! the listener, and posts deliveries to the [`DeliveryContext`]. Two
//! independent guards keep stale results out:
//!
//! - the epoch gate admits decodes only from the run that is currently
//!   open and closes after the first result of a one-shot scan,
//! - the delivery generation invalidates tasks already posted when the
//!   controller stops.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use codescan_session::{CaptureSession, SessionEvent, SessionState};
use crossbeam_channel::{select, Receiver, Sender};
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::listener::{DeliveryContext, ScanListener, ScanOutcome};

pub(crate) const THREAD_NAME: &str = "codescan-relay";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Verdict {
    Deliver,
    /// Deliver, and stop the session first.
    DeliverAndStop,
    Discard,
}

/// Which epoch may deliver decodes right now.
#[derive(Debug, Default)]
pub(crate) struct Gate {
    open: Option<u64>,
    /// Epochs up to here are finished and never reopen.
    closed_through: u64,
    one_shot: bool,
}

impl Gate {
    pub(crate) fn set_one_shot(&mut self, one_shot: bool) {
        self.one_shot = one_shot;
    }

    pub(crate) fn on_state(&mut self, state: SessionState, epoch: u64) {
        match state {
            SessionState::Running if epoch > self.closed_through => self.open = Some(epoch),
            SessionState::Running => {
                debug!("epoch {epoch} already closed, gate stays shut");
            }
            SessionState::Stopped | SessionState::Faulted => self.close(epoch),
            SessionState::Idle | SessionState::Configuring => self.open = None,
        }
    }

    /// Shut the gate for `epoch` and everything before it.
    pub(crate) fn close(&mut self, epoch: u64) {
        self.closed_through = self.closed_through.max(epoch);
        if self.open.is_some_and(|open| open <= self.closed_through) {
            self.open = None;
        }
    }

    pub(crate) fn admit(&mut self, epoch: u64) -> Verdict {
        match self.open {
            Some(open) if open == epoch => {
                if self.one_shot {
                    self.close(epoch);
                    Verdict::DeliverAndStop
                } else {
                    Verdict::Deliver
                }
            }
            _ => Verdict::Discard,
        }
    }
}

#[derive(Default)]
struct ListenerSlot {
    listener: Option<Box<dyn ScanListener>>,
    version: u64,
}

/// State shared by the controller, the relay thread and posted tasks.
pub(crate) struct Shared {
    pub(crate) session: CaptureSession,
    pub(crate) gate: Mutex<Gate>,
    generation: AtomicU64,
    listener: Mutex<ListenerSlot>,
    delivery: Arc<dyn DeliveryContext>,
}

impl Shared {
    pub(crate) fn new(session: CaptureSession, delivery: Arc<dyn DeliveryContext>) -> Self {
        Self {
            session,
            gate: Mutex::new(Gate::default()),
            generation: AtomicU64::new(0),
            listener: Mutex::new(ListenerSlot::default()),
            delivery,
        }
    }

    /// Replace the listener. `None` removes it.
    pub(crate) fn set_listener(&self, listener: Option<Box<dyn ScanListener>>) {
        let mut slot = self.listener.lock();
        slot.listener = listener;
        slot.version += 1;
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Invalidate every delivery posted so far.
    ///
    /// Callers hold the gate lock, so a verdict and the generation it is
    /// posted under are always read together.
    fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Close the gate through `epoch`, if any, and invalidate posted
    /// deliveries in one step.
    pub(crate) fn invalidate(&self, epoch: Option<u64>) {
        let mut gate = self.gate.lock();
        if let Some(epoch) = epoch {
            gate.close(epoch);
        }
        self.bump_generation();
    }

    /// Start a new configuration: new one-shot mode, nothing stale delivered.
    pub(crate) fn reset_delivery(&self, one_shot: bool) {
        let mut gate = self.gate.lock();
        gate.set_one_shot(one_shot);
        self.bump_generation();
    }

    /// Verdict for a decode from `epoch`, with the generation to post it under.
    fn admit(&self, epoch: u64) -> (Verdict, u64) {
        let mut gate = self.gate.lock();
        (gate.admit(epoch), self.generation())
    }

    /// Close the gate after a fault; the generation to report it under.
    fn close_for_fault(&self, epoch: u64) -> u64 {
        let mut gate = self.gate.lock();
        gate.close(epoch);
        self.generation()
    }

    fn deliver(&self, outcome: ScanOutcome, generation: u64) {
        if self.generation() != generation {
            debug!("dropping stale outcome {outcome:?}");
            return;
        }
        // the listener runs outside the lock so it may re-register itself
        let (mut listener, version) = {
            let mut slot = self.listener.lock();
            (slot.listener.take(), slot.version)
        };
        match listener.as_mut() {
            Some(listener) => listener.on_result(outcome),
            None => debug!("no listener for {outcome:?}"),
        }
        let mut slot = self.listener.lock();
        if slot.version == version && slot.listener.is_none() {
            slot.listener = listener;
        }
    }
}

/// Post `outcome` for delivery under `generation`.
pub(crate) fn dispatch(shared: &Arc<Shared>, outcome: ScanOutcome, generation: u64) {
    let target: Weak<Shared> = Arc::downgrade(shared);
    shared.delivery.post(Box::new(move || {
        if let Some(shared) = target.upgrade() {
            shared.deliver(outcome, generation);
        }
    }));
}

pub(crate) enum RelayMsg {
    Cancelled { generation: u64 },
    Shutdown,
}

pub(crate) struct Relay {
    shared: Arc<Shared>,
    events: Receiver<SessionEvent>,
    control: Receiver<RelayMsg>,
}

impl Relay {
    pub(crate) fn spawn(
        shared: Arc<Shared>,
        events: Receiver<SessionEvent>,
    ) -> std::io::Result<(Sender<RelayMsg>, JoinHandle<()>)> {
        let (control_tx, control) = crossbeam_channel::unbounded();
        let relay = Relay {
            shared,
            events,
            control,
        };
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || relay.run())?;
        Ok((control_tx, handle))
    }

    fn run(self) {
        debug!("relay started");
        loop {
            select! {
                recv(self.events) -> event => match event {
                    Ok(event) => self.handle(event),
                    Err(_) => {
                        while let Ok(RelayMsg::Cancelled { generation }) = self.control.try_recv() {
                            dispatch(&self.shared, ScanOutcome::cancelled(), generation);
                        }
                        break;
                    }
                },
                recv(self.control) -> msg => match msg {
                    Ok(RelayMsg::Cancelled { generation }) => {
                        dispatch(&self.shared, ScanOutcome::cancelled(), generation);
                    }
                    Ok(RelayMsg::Shutdown) | Err(_) => break,
                },
            }
        }
        debug!("relay exiting");
    }

    fn handle(&self, event: SessionEvent) {
        match event {
            SessionEvent::Decoded(result) => {
                let (verdict, generation) = self.shared.admit(result.epoch);
                match verdict {
                    Verdict::Discard => {
                        debug!("discarding `{}` from epoch {}", result.payload, result.epoch);
                    }
                    Verdict::Deliver => {
                        dispatch(&self.shared, ScanOutcome::decoded(&result), generation);
                    }
                    Verdict::DeliverAndStop => {
                        info!("one-shot result `{}`, stopping", result.payload);
                        self.shared.session.stop();
                        dispatch(&self.shared, ScanOutcome::decoded(&result), generation);
                    }
                }
            }
            SessionEvent::StateChanged { state, epoch } => {
                self.shared.gate.lock().on_state(state, epoch);
            }
            SessionEvent::Fault { epoch, fault } => {
                warn!("session fault in epoch {epoch}: {fault}");
                let generation = self.shared.close_for_fault(epoch);
                dispatch(&self.shared, ScanOutcome::failure(fault.to_string()), generation);
            }
        }
    }
}
