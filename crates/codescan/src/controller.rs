//! Top-level scan orchestration.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use codescan_core::{PreviewGeometry, RegionMask, ScanRegion, Size, SymbologySet};
use codescan_session::{
    CameraBackend, CapabilityProbe, CaptureSession, ConfigureError, DeviceRegistry, InputSelector,
    SessionConfig, SessionState, TorchState,
};
use crossbeam_channel::Sender;
use log::{debug, info, warn};
use parking_lot::Mutex;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::error::ScanError;
use crate::listener::{DeliveryContext, Inline, ScanListener};
use crate::options::ScannerOptions;
use crate::relay::{Relay, RelayMsg, Shared};

/// What the last `configure` asked for, kept to re-derive the mask.
#[derive(Clone, Debug)]
struct Setup {
    region: ScanRegion,
    geometry: PreviewGeometry,
    one_shot: bool,
    input: InputSelector,
    show_torch_button: bool,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            region: ScanRegion::Full,
            geometry: PreviewGeometry::new(Size::ZERO, Size::ZERO),
            one_shot: true,
            input: InputSelector::Default,
            show_torch_button: false,
        }
    }
}

/// Owns a [`CaptureSession`] and forwards its results to one listener.
///
/// Decoded results reach the listener through the controller's
/// [`DeliveryContext`], never on the capture thread. In one-shot mode the
/// session is stopped before the single result is handed over.
///
/// [`update_scan_region`](Self::update_scan_region) must not be called from
/// inside the listener; post it to another context instead. `stop` and
/// `cancel` may be called from anywhere, the listener included.
pub struct ScanController {
    shared: Arc<Shared>,
    setup: Mutex<Setup>,
    relay_tx: Sender<RelayMsg>,
    relay: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ScanController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanController")
            .field("session", &self.shared.session)
            .finish_non_exhaustive()
    }
}

impl ScanController {
    /// Controller over a new session, delivering on the relay thread.
    pub fn new(backend: Arc<dyn CameraBackend>) -> Result<Self, ScanError> {
        Self::with_session(CaptureSession::new(backend), Arc::new(Inline))
    }

    /// Controller with a private device registry and delivery context.
    pub fn with_registry(
        backend: Arc<dyn CameraBackend>,
        registry: DeviceRegistry,
        delivery: Arc<dyn DeliveryContext>,
    ) -> Result<Self, ScanError> {
        Self::with_session(CaptureSession::with_registry(backend, registry), delivery)
    }

    /// Take over `session`. The controller becomes the only consumer of its
    /// events.
    pub fn with_session(
        session: CaptureSession,
        delivery: Arc<dyn DeliveryContext>,
    ) -> Result<Self, ScanError> {
        let events = session.events();
        let shared = Arc::new(Shared::new(session, delivery));
        let (relay_tx, relay) = Relay::spawn(Arc::clone(&shared), events).map_err(ScanError::Relay)?;
        Ok(Self {
            shared,
            setup: Mutex::new(Setup::default()),
            relay_tx,
            relay: Some(relay),
        })
    }

    pub fn session(&self) -> &CaptureSession {
        &self.shared.session
    }

    pub fn probe(&self) -> &CapabilityProbe {
        self.shared.session.probe()
    }

    pub fn state(&self) -> SessionState {
        self.shared.session.state()
    }

    /// Register the listener, replacing any previous one.
    pub fn on_decode(&self, listener: impl ScanListener + 'static) {
        self.shared.set_listener(Some(Box::new(listener)));
    }

    pub fn clear_listener(&self) {
        self.shared.set_listener(None);
    }

    /// Validate and apply a scan configuration. Returns the new epoch.
    ///
    /// The region is mapped against the last preview geometry given to
    /// [`update_preview_geometry`](Self::update_preview_geometry). Any region
    /// other than [`ScanRegion::Full`] fails with
    /// [`ScanError::PreviewGeometryUnknown`] until a usable geometry is set.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, symbologies, region), fields(symbologies = %symbologies))
    )]
    pub fn configure(
        &self,
        symbologies: SymbologySet,
        region: ScanRegion,
        one_shot: bool,
    ) -> Result<u64, ScanError> {
        if symbologies.is_empty() {
            return Err(ConfigureError::EmptySymbologySet.into());
        }
        let probe = self.probe();
        if !probe.supports(&symbologies) {
            let unsupported = probe.unsupported(&symbologies);
            return Err(ConfigureError::UnsupportedSymbologies { unsupported }.into());
        }

        let mut setup = self.setup.lock();
        if !region.is_full() && setup.geometry.display_to_sensor().is_none() {
            return Err(ScanError::PreviewGeometryUnknown);
        }
        let mask = RegionMask::for_region(&region, &setup.geometry);
        let config = SessionConfig::new(symbologies)
            .with_mask(mask)
            .with_input(setup.input.clone());
        let epoch = self.shared.session.configure(config)?;

        self.shared.reset_delivery(one_shot);
        setup.region = region;
        setup.one_shot = one_shot;
        info!("scan configured (epoch {epoch}, one-shot {one_shot}, mask {mask:?})");
        Ok(epoch)
    }

    /// Apply `options` and preview `geometry`; start right away when
    /// `start_scanning_at_load` is set.
    pub fn configure_with_options(
        &self,
        options: &ScannerOptions,
        geometry: PreviewGeometry,
    ) -> Result<u64, ScanError> {
        {
            let mut setup = self.setup.lock();
            setup.geometry = geometry;
            setup.input = options.input.clone();
            setup.show_torch_button = options.show_torch_button;
        }
        let epoch = self.configure(
            options.symbologies.clone(),
            ScanRegion::centered(options.scan_region_size),
            options.one_shot,
        )?;
        if options.start_scanning_at_load {
            self.start()?;
        }
        Ok(epoch)
    }

    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self)))]
    pub fn start(&self) -> Result<(), ScanError> {
        self.shared.session.start()?;
        Ok(())
    }

    /// Stop scanning. Results not yet handed to the listener are dropped.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self)))]
    pub fn stop(&self) {
        let session = &self.shared.session;
        let running = (session.state() == SessionState::Running).then(|| session.epoch());
        self.shared.invalidate(running);
        session.stop();
    }

    /// User cancellation: stop, and tell the listener once if a scan was
    /// running.
    pub fn cancel(&self) {
        let active = self.state() == SessionState::Running;
        self.stop();
        if !active {
            debug!("cancel with no active scan");
            return;
        }
        let generation = self.shared.generation();
        if self
            .relay_tx
            .send(RelayMsg::Cancelled { generation })
            .is_err()
        {
            warn!("relay gone, cancellation not delivered");
        }
    }

    /// Map a new region under the current preview geometry and apply it.
    ///
    /// Without a usable preview geometry the region is only stored; it takes
    /// effect on the next [`update_preview_geometry`](Self::update_preview_geometry).
    pub fn update_scan_region(&self, region: ScanRegion) {
        let mut setup = self.setup.lock();
        setup.region = region;
        if !region.is_full() && setup.geometry.display_to_sensor().is_none() {
            warn!("scan region {region:?} deferred until the preview geometry is known");
            return;
        }
        let mask = RegionMask::for_region(&setup.region, &setup.geometry);
        self.shared.session.update_region(mask);
    }

    /// Re-derive the mask after rotation or a preview resize.
    pub fn update_preview_geometry(&self, geometry: PreviewGeometry) {
        let mut setup = self.setup.lock();
        setup.geometry = geometry;
        let mask = RegionMask::for_region(&setup.region, &setup.geometry);
        debug!("preview geometry {geometry:?} -> mask {mask:?}");
        self.shared.session.update_region(mask);
    }

    pub fn scan_region(&self) -> ScanRegion {
        self.setup.lock().region
    }

    pub fn is_one_shot(&self) -> bool {
        self.setup.lock().one_shot
    }

    pub fn preview_geometry(&self) -> PreviewGeometry {
        self.setup.lock().geometry
    }

    /// Camera to use from the next `configure` on.
    pub fn select_input(&self, input: InputSelector) {
        self.setup.lock().input = input;
    }

    pub fn toggle_torch(&self) -> Result<bool, ScanError> {
        Ok(self.shared.session.toggle_torch()?)
    }

    pub fn torch_state(&self) -> TorchState {
        self.shared.session.torch_state()
    }

    /// The torch button is wanted and the current input has a torch.
    pub fn should_show_torch_button(&self) -> bool {
        if !self.setup.lock().show_torch_button {
            return false;
        }
        let probe = self.probe();
        match self.shared.session.device() {
            Some(device) => probe.is_torch_available(&device),
            None => probe.default_input().is_some_and(|d| probe.is_torch_available(&d)),
        }
    }
}

impl Drop for ScanController {
    fn drop(&mut self) {
        self.shared.invalidate(None);
        self.shared.session.stop();
        let _ = self.relay_tx.send(RelayMsg::Shutdown);
        if let Some(relay) = self.relay.take() {
            if relay.thread().id() != thread::current().id() && relay.join().is_err() {
                warn!("result relay panicked");
            }
        }
    }
}
