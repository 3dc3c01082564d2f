//! Capture session runtime for camera code scanning.
//!
//! The host injects its camera subsystem as a [`CameraBackend`]. On top of it
//! this crate provides:
//!
//! - [`CapabilityProbe`]: side-effect-free availability and support queries,
//! - [`DeviceRegistry`]: exclusive device ownership with RAII leases,
//! - [`CaptureSession`]: the configure/start/stop state machine with its
//!   capture worker, region masking and torch control,
//! - [`sim`]: a scripted backend for tests and demos.
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use codescan_core::{Symbology, SymbologySet};
//! use codescan_session::sim::{SimFrame, SimScenario, SimulatedCamera};
//! use codescan_session::{CaptureSession, DeviceRegistry, SessionConfig, SessionEvent};
//!
//! let camera = SimulatedCamera::new(SimScenario::default());
//! let session = CaptureSession::with_registry(Arc::new(camera.clone()), DeviceRegistry::new());
//! let events = session.events();
//!
//! session.configure(SessionConfig::new(SymbologySet::single(Symbology::Qr))).unwrap();
//! session.start().unwrap();
//! camera.push_frame(SimFrame::qr("hello"));
//!
//! let decoded = loop {
//!     match events.recv_timeout(Duration::from_secs(2)).unwrap() {
//!         SessionEvent::Decoded(result) => break result,
//!         _ => continue,
//!     }
//! };
//! assert_eq!(decoded.payload, "hello");
//! session.stop();
//! ```

mod backend;
mod probe;
mod registry;
mod session;
pub mod sim;

pub use backend::{
    Authorization, BackendError, CameraBackend, Detection, DeviceId, DevicePosition, FaultKind,
    Frame, FrameSource, InputDevice, MetadataFrame, MetadataStream, OpenedInput,
    RecognizingStream, Recognizer, RuntimeFault, StreamEvent, TorchControl,
};
pub use probe::{CapabilityProbe, CapabilityReport, InputSelector};
pub use registry::{DeviceLease, DeviceRegistry, SessionId};
pub use session::{
    filter_frame, CaptureSession, ConfigureError, DecodeResult, SessionConfig, SessionEvent,
    SessionState, StartError, TorchError, TorchState,
};
