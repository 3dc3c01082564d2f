//! The capture session state machine.
//!
//! ```text
//! Idle --configure--> Configuring --start--> Running --stop--> Stopped
//!                          ^                                      |
//!                          +--------------configure---------------+
//! any --fault--> Faulted --configure--> Configuring
//! ```
//!
//! A [`CaptureSession`] is a cheap, clonable handle. All operations take
//! `&self` and may be called from any thread. While running, one worker
//! thread polls the backend stream and publishes [`SessionEvent`]s on an
//! unbounded channel. Each event carries the configuration epoch it belongs
//! to; the epoch moves on every `configure` and on every restart from
//! `Stopped`.

mod error;
mod event;
mod state;
mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use codescan_core::RegionMask;
use crossbeam_channel::{Receiver, Sender};
use log::{debug, info, warn};
use parking_lot::Mutex;

#[cfg(feature = "tracing")]
use tracing::instrument;

pub use error::{ConfigureError, StartError, TorchError};
pub use event::{DecodeResult, SessionEvent};
pub use state::{SessionConfig, SessionState, TorchState};
pub use worker::filter_frame;

use crate::backend::{CameraBackend, InputDevice, RuntimeFault, TorchControl};
use crate::probe::{CapabilityProbe, InputSelector};
use crate::registry::{DeviceLease, DeviceRegistry, SessionId};
use worker::Worker;

/// Mask shared with the worker. Writers swap the whole `Arc`.
pub(crate) struct MaskSlot(Mutex<Arc<RegionMask>>);

impl MaskSlot {
    fn new(mask: RegionMask) -> Self {
        Self(Mutex::new(Arc::new(mask)))
    }

    pub(crate) fn snapshot(&self) -> Arc<RegionMask> {
        self.0.lock().clone()
    }

    fn replace(&self, mask: RegionMask) {
        *self.0.lock() = Arc::new(mask);
    }
}

struct RunHandle {
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl RunHandle {
    /// Signal the worker and wait for it, unless we are the worker.
    fn halt(self) {
        self.running.store(false, Ordering::Release);
        if self.thread.thread().id() == thread::current().id() {
            return;
        }
        if self.thread.join().is_err() {
            warn!("capture worker panicked");
        }
    }
}

#[derive(Default)]
struct Control {
    state: SessionState,
    epoch: u64,
    config: Option<SessionConfig>,
    device: Option<InputDevice>,
    torch: TorchState,
    torch_control: Option<Arc<dyn TorchControl>>,
    lease: Option<DeviceLease>,
    run: Option<RunHandle>,
}

struct Inner {
    id: SessionId,
    probe: CapabilityProbe,
    registry: DeviceRegistry,
    control: Mutex<Control>,
    mask: Arc<MaskSlot>,
    events_tx: Sender<SessionEvent>,
    events_rx: Receiver<SessionEvent>,
}

impl Inner {
    fn publish(&self, event: SessionEvent) {
        // the receiver lives in `self`, so this cannot fail
        let _ = self.events_tx.send(event);
    }

    fn set_state(&self, ctl: &mut Control, state: SessionState) {
        ctl.state = state;
        self.publish(SessionEvent::StateChanged {
            state,
            epoch: ctl.epoch,
        });
    }

    /// Leave streaming: give the device back and switch the torch off.
    fn release(&self, ctl: &mut Control) -> Option<RunHandle> {
        if ctl.torch.engaged {
            if let Some(torch) = &ctl.torch_control {
                if let Err(err) = torch.set_torch(false) {
                    warn!("{}: failed to switch torch off: {err}", self.id);
                }
            }
        }
        ctl.torch.engaged = false;
        ctl.torch_control = None;
        ctl.lease = None;
        ctl.run.take()
    }

    fn enter_fault(&self, ctl: &mut Control, fault: RuntimeFault) -> Option<RunHandle> {
        warn!("{} faulted in {} (epoch {}): {fault}", self.id, ctl.state, ctl.epoch);
        let run = self.release(ctl);
        self.publish(SessionEvent::Fault {
            epoch: ctl.epoch,
            fault,
        });
        self.set_state(ctl, SessionState::Faulted);
        run
    }

    /// Fault reported by the worker of `epoch`. Ignored once that run is over.
    fn worker_fault(&self, epoch: u64, fault: RuntimeFault) {
        let run = {
            let mut ctl = self.control.lock();
            if ctl.state != SessionState::Running || ctl.epoch != epoch {
                debug!("{}: dropping fault from finished run {epoch}: {fault}", self.id);
                return;
            }
            self.enter_fault(&mut ctl, fault)
        };
        if let Some(run) = run {
            run.halt();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let ctl = self.control.get_mut();
        if let Some(run) = ctl.run.take() {
            debug!("{} dropped while running", self.id);
            run.halt();
        }
    }
}

/// Handle to one capture pipeline.
#[derive(Clone)]
pub struct CaptureSession {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ctl = self.inner.control.lock();
        f.debug_struct("CaptureSession")
            .field("id", &self.inner.id)
            .field("state", &ctl.state)
            .field("epoch", &ctl.epoch)
            .finish()
    }
}

impl CaptureSession {
    /// Session arbitrated by the process-global [`DeviceRegistry`].
    pub fn new(backend: Arc<dyn CameraBackend>) -> Self {
        Self::with_registry(backend, DeviceRegistry::global())
    }

    pub fn with_registry(backend: Arc<dyn CameraBackend>, registry: DeviceRegistry) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            inner: Arc::new(Inner {
                id: SessionId::next(),
                probe: CapabilityProbe::new(backend),
                registry,
                control: Mutex::new(Control::default()),
                mask: Arc::new(MaskSlot::new(RegionMask::Unrestricted)),
                events_tx,
                events_rx,
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub fn probe(&self) -> &CapabilityProbe {
        &self.inner.probe
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.inner.registry
    }

    pub fn state(&self) -> SessionState {
        self.inner.control.lock().state
    }

    pub fn epoch(&self) -> u64 {
        self.inner.control.lock().epoch
    }

    pub fn torch_state(&self) -> TorchState {
        self.inner.control.lock().torch
    }

    pub fn config(&self) -> Option<SessionConfig> {
        self.inner.control.lock().config.clone()
    }

    /// Input chosen by the last successful `configure`.
    pub fn device(&self) -> Option<InputDevice> {
        self.inner.control.lock().device.clone()
    }

    /// Mask the worker will use for the next frame.
    pub fn current_mask(&self) -> RegionMask {
        *self.inner.mask.snapshot()
    }

    /// Event stream of this session.
    ///
    /// Every clone of the receiver competes for the same events; keep a
    /// single consumer.
    pub fn events(&self) -> Receiver<SessionEvent> {
        self.inner.events_rx.clone()
    }

    /// Select an input and store `config`. Returns the new epoch.
    ///
    /// Accepted in every state but `Running`. Nothing is opened yet; the
    /// device is claimed by [`start`](Self::start).
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, config), fields(session = %self.inner.id))
    )]
    pub fn configure(&self, config: SessionConfig) -> Result<u64, ConfigureError> {
        let inner = &self.inner;
        let mut ctl = inner.control.lock();
        if ctl.state == SessionState::Running {
            warn!("{}: configure rejected while running", inner.id);
            return Err(ConfigureError::SessionRunning);
        }
        if config.symbologies.is_empty() {
            return Err(ConfigureError::EmptySymbologySet);
        }
        let unsupported = inner.probe.unsupported(&config.symbologies);
        if !unsupported.is_empty() {
            return Err(ConfigureError::UnsupportedSymbologies { unsupported });
        }
        let device = inner
            .probe
            .select(&config.input)
            .ok_or(ConfigureError::NoInputDevice)?;

        ctl.epoch += 1;
        ctl.torch = TorchState {
            available: inner.probe.is_torch_available(&device),
            engaged: false,
        };
        inner.mask.replace(config.mask);
        info!(
            "{} configured for {} on `{}` (epoch {}, torch {})",
            inner.id, config.symbologies, device.id, ctl.epoch, ctl.torch.available
        );
        ctl.device = Some(device);
        ctl.config = Some(config);
        inner.set_state(&mut ctl, SessionState::Configuring);
        Ok(ctl.epoch)
    }

    /// Claim the device and begin streaming.
    ///
    /// No-op while running. A restart from `Stopped` reuses the stored
    /// configuration under a fresh epoch. On failure the state is unchanged.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self), fields(session = %self.inner.id))
    )]
    pub fn start(&self) -> Result<(), StartError> {
        let inner = &self.inner;
        let mut ctl = inner.control.lock();
        match ctl.state {
            SessionState::Running => return Ok(()),
            SessionState::Configuring | SessionState::Stopped => {}
            state @ (SessionState::Idle | SessionState::Faulted) => {
                return Err(StartError::NotConfigured { state });
            }
        }
        let (Some(config), Some(device)) = (ctl.config.clone(), ctl.device.clone()) else {
            return Err(StartError::NotConfigured { state: ctl.state });
        };

        if !inner.probe.authorization().permits_capture() {
            warn!("{}: camera permission denied", inner.id);
            return Err(StartError::PermissionDenied);
        }
        let device = inner
            .probe
            .select(&InputSelector::Id(device.id.clone()))
            .ok_or(StartError::DeviceUnavailable(device.id))?;
        let lease = inner
            .registry
            .try_acquire(&device.id, inner.id)
            .map_err(|holder| {
                warn!("{}: `{}` is held by {holder}", inner.id, device.id);
                StartError::DeviceBusy {
                    device: device.id.clone(),
                    holder,
                }
            })?;
        let opened = inner.probe.backend().open(&device, &config.symbologies)?;

        let previous = ctl.state;
        let previous_epoch = ctl.epoch;
        if previous == SessionState::Stopped {
            ctl.epoch += 1;
        }
        // published before the worker exists so no result precedes it
        inner.set_state(&mut ctl, SessionState::Running);

        let running = Arc::new(AtomicBool::new(true));
        let worker = Worker {
            session: inner.id,
            epoch: ctl.epoch,
            stream: opened.stream,
            symbologies: config.symbologies,
            mask: Arc::clone(&inner.mask),
            running: Arc::clone(&running),
            events: inner.events_tx.clone(),
            owner: Arc::downgrade(inner),
        };
        let thread = match thread::Builder::new()
            .name(worker::THREAD_NAME.to_string())
            .spawn(move || worker.run())
        {
            Ok(thread) => thread,
            Err(err) => {
                ctl.epoch = previous_epoch;
                inner.set_state(&mut ctl, previous);
                return Err(StartError::Spawn(err));
            }
        };

        ctl.torch = TorchState {
            available: device.has_torch && opened.torch.is_some(),
            engaged: false,
        };
        ctl.torch_control = opened.torch;
        ctl.lease = Some(lease);
        ctl.run = Some(RunHandle { running, thread });
        info!("{} running on `{}` (epoch {})", inner.id, device.id, ctl.epoch);
        ctl.device = Some(device);
        Ok(())
    }

    /// Stop streaming and release the device. No-op unless running.
    ///
    /// Waits for the worker to finish its current poll, except when called
    /// from the worker thread itself.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self), fields(session = %self.inner.id))
    )]
    pub fn stop(&self) {
        let inner = &self.inner;
        let run = {
            let mut ctl = inner.control.lock();
            if ctl.state != SessionState::Running {
                debug!("{}: stop ignored in {}", inner.id, ctl.state);
                return;
            }
            let run = inner.release(&mut ctl);
            inner.set_state(&mut ctl, SessionState::Stopped);
            info!("{} stopped (epoch {})", inner.id, ctl.epoch);
            run
        };
        if let Some(run) = run {
            run.halt();
        }
    }

    /// Replace the region mask.
    ///
    /// While running the worker picks it up at the next frame. In any other
    /// state it is stored and applies once streaming starts.
    pub fn update_region(&self, mask: RegionMask) {
        let mut ctl = self.inner.control.lock();
        self.inner.mask.replace(mask);
        if let Some(config) = ctl.config.as_mut() {
            config.mask = mask;
        }
        if ctl.state == SessionState::Running {
            debug!("{}: region mask swapped: {mask:?}", self.inner.id);
        } else {
            debug!("{}: region mask queued in {}: {mask:?}", self.inner.id, ctl.state);
        }
    }

    /// Force the session into `Faulted`. Only `configure` is accepted next.
    pub fn fault(&self, fault: RuntimeFault) {
        let run = {
            let mut ctl = self.inner.control.lock();
            self.inner.enter_fault(&mut ctl, fault)
        };
        if let Some(run) = run {
            run.halt();
        }
    }

    /// Flip the torch. Returns the new `engaged` value.
    pub fn toggle_torch(&self) -> Result<bool, TorchError> {
        let mut ctl = self.inner.control.lock();
        if ctl.state != SessionState::Running {
            return Err(TorchError::NotRunning { state: ctl.state });
        }
        if !ctl.torch.available {
            return Err(TorchError::Unsupported);
        }
        let control = ctl.torch_control.clone().ok_or(TorchError::Unsupported)?;
        let engaged = !ctl.torch.engaged;
        control.set_torch(engaged)?;
        ctl.torch.engaged = engaged;
        debug!("{}: torch {}", self.inner.id, if engaged { "on" } else { "off" });
        Ok(engaged)
    }
}
