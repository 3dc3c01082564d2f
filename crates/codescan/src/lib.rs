//! Camera code scanning.
//!
//! `codescan` drives a capture session, restricts recognition to a scan
//! region drawn on the preview and hands decoded payloads to a single
//! listener. The camera is injected through
//! [`CameraBackend`]; [`sim::SimulatedCamera`] stands in for real hardware.
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use codescan::sim::{SimFrame, SimScenario, SimulatedCamera};
//! use codescan::{DeviceRegistry, ListenerQueue, ScanController, ScanOutcome, ScanRegion,
//!     Symbology, SymbologySet};
//!
//! let camera = SimulatedCamera::new(SimScenario::default());
//! let queue = ListenerQueue::new();
//! let controller = ScanController::with_registry(
//!     Arc::new(camera.clone()),
//!     DeviceRegistry::new(),
//!     Arc::new(queue.clone()),
//! )?;
//!
//! let (tx, rx) = std::sync::mpsc::channel();
//! controller.on_decode(move |outcome: ScanOutcome| {
//!     let _ = tx.send(outcome);
//! });
//! controller.configure(SymbologySet::single(Symbology::Qr), ScanRegion::Full, true)?;
//! controller.start()?;
//! camera.push_frame(SimFrame::qr("https://example.com"));
//!
//! // the host pumps the queue on its own thread
//! for _ in 0..100 {
//!     queue.pump_timeout(Duration::from_millis(50));
//!     if let Ok(outcome) = rx.try_recv() {
//!         assert_eq!(outcome.payload.as_deref(), Some("https://example.com"));
//!         break;
//!     }
//! }
//! # Ok::<(), codescan::ScanError>(())
//! ```

mod controller;
mod error;
mod listener;
mod options;
mod relay;

pub use controller::ScanController;
pub use error::ScanError;
pub use listener::{
    DeliveryContext, Inline, ListenerQueue, ScanListener, ScanOutcome, Task, CANCELLED,
};
pub use options::{OptionsError, ScannerOptions};

pub use codescan_core::{
    denormalize, init_with_level, map_to_normalized, ContentMode, NormalizedRect, Orientation,
    PreviewGeometry, Rect, RegionMask, ScanRegion, Size, Symbology, SymbologySet,
};
#[cfg(feature = "tracing")]
pub use codescan_core::{init_tracing, init_tracing_with_default};

pub use codescan_session::{
    sim, Authorization, BackendError, CameraBackend, CapabilityProbe, CapabilityReport,
    CaptureSession, ConfigureError, DecodeResult, Detection, DeviceId, DevicePosition,
    DeviceRegistry, FaultKind, InputDevice, InputSelector, MetadataStream, RuntimeFault,
    SessionEvent, SessionState, StartError, TorchError, TorchState,
};
