//! Host capability traits.
//!
//! A capture session never talks to camera hardware directly. The host
//! injects a [`CameraBackend`] that enumerates inputs and opens them into a
//! [`MetadataStream`] of recognizer output. The recognizer itself is a black
//! box: it reports `(payload, symbology, bounds)` per frame. Hosts that only
//! have raw frames and a separate decoder can glue them together with
//! [`RecognizingStream`].

use std::fmt;
use std::sync::Arc;

use codescan_core::{NormalizedRect, Symbology, SymbologySet};
use serde::{Deserialize, Serialize};

/// Opaque host identifier of a capture input.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePosition {
    #[default]
    Back,
    Front,
    External,
}

/// A capture-capable input as the host reports it right now.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDevice {
    pub id: DeviceId,
    #[serde(default)]
    pub position: DevicePosition,
    /// Illumination control (torch) is present.
    #[serde(default)]
    pub has_torch: bool,
}

impl InputDevice {
    pub fn new(id: impl Into<DeviceId>, position: DevicePosition, has_torch: bool) -> Self {
        Self {
            id: id.into(),
            position,
            has_torch,
        }
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Camera permission as granted by the user or the platform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authorization {
    #[default]
    Authorized,
    /// Not asked yet; the platform prompts on first use.
    NotDetermined,
    Denied,
    /// Blocked by policy, the user cannot grant it.
    Restricted,
}

impl Authorization {
    pub fn permits_capture(self) -> bool {
        matches!(self, Authorization::Authorized | Authorization::NotDetermined)
    }
}

/// One recognizer match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub payload: String,
    pub symbology: Symbology,
    /// Bounding rectangle in normalized sensor space.
    pub bounds: NormalizedRect,
}

impl Detection {
    pub fn new(payload: impl Into<String>, symbology: Symbology, bounds: NormalizedRect) -> Self {
        Self {
            payload: payload.into(),
            symbology,
            bounds,
        }
    }
}

/// Recognizer output for one processed frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFrame {
    pub sequence: u64,
    pub detections: Vec<Detection>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// The OS interrupted the capture session.
    Interrupted,
    /// The input device disappeared.
    DeviceRemoved,
    /// The stream ended without being asked to.
    StreamEnded,
    Other,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FaultKind::Interrupted => "capture interrupted",
            FaultKind::DeviceRemoved => "device removed",
            FaultKind::StreamEnded => "stream ended",
            FaultKind::Other => "capture fault",
        };
        f.write_str(s)
    }
}

/// Unrecoverable device error observed after the triggering call returned.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {detail}")]
pub struct RuntimeFault {
    pub kind: FaultKind,
    #[serde(default)]
    pub detail: String,
}

impl RuntimeFault {
    pub fn new(kind: FaultKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// What one poll of a [`MetadataStream`] produced.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    Frame(MetadataFrame),
    /// Nothing arrived within the poll interval.
    Idle,
    Fault(RuntimeFault),
}

/// Failure reported by the host backend.
#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error("input device `{0}` not found")]
    DeviceNotFound(DeviceId),
    #[error("input device `{device}` is unavailable: {reason}")]
    DeviceUnavailable { device: DeviceId, reason: String },
    #[error("input device `{0}` has no torch")]
    NoTorch(DeviceId),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

/// Streaming recognizer output of an opened input.
///
/// `next_event` must return within a bounded poll interval, yielding
/// [`StreamEvent::Idle`] when no frame arrived. The capture worker checks its
/// stop flag between polls.
pub trait MetadataStream: Send {
    fn next_event(&mut self) -> StreamEvent;
}

/// Illumination control of an opened input.
pub trait TorchControl: Send + Sync {
    fn set_torch(&self, engaged: bool) -> Result<(), BackendError>;
}

/// An input opened for streaming.
pub struct OpenedInput {
    pub stream: Box<dyn MetadataStream>,
    /// `None` when the device has no torch.
    pub torch: Option<Arc<dyn TorchControl>>,
}

impl fmt::Debug for OpenedInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenedInput")
            .field("torch", &self.torch.is_some())
            .finish_non_exhaustive()
    }
}

/// The host's camera subsystem.
///
/// Every query re-asks the host; implementations must not cache device lists
/// across calls since inputs come and go.
pub trait CameraBackend: Send + Sync {
    /// Capture-capable inputs present right now.
    fn inputs(&self) -> Vec<InputDevice>;

    /// Symbologies the recognizer can report.
    fn supported_symbologies(&self) -> SymbologySet;

    fn authorization(&self) -> Authorization {
        Authorization::Authorized
    }

    /// Open `device` with a recognizer restricted to `symbologies`.
    fn open(
        &self,
        device: &InputDevice,
        symbologies: &SymbologySet,
    ) -> Result<OpenedInput, BackendError>;
}

/// A raw frame from a camera that does not recognize codes on its own.
#[derive(Clone, Debug)]
pub struct Frame {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    /// Row-major 8-bit luminance, `width * height` bytes.
    pub luma: Arc<[u8]>,
}

/// Source of raw frames. `Ok(None)` means nothing within the poll interval.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<Frame>, RuntimeFault>;
}

/// A code recognizer over raw frames.
pub trait Recognizer: Send {
    fn recognize(&mut self, frame: &Frame, symbologies: &SymbologySet) -> Vec<Detection>;
}

/// [`MetadataStream`] that runs a [`Recognizer`] over a [`FrameSource`].
pub struct RecognizingStream<F, R> {
    source: F,
    recognizer: R,
    symbologies: SymbologySet,
}

impl<F: FrameSource, R: Recognizer> RecognizingStream<F, R> {
    pub fn new(source: F, recognizer: R, symbologies: SymbologySet) -> Self {
        Self {
            source,
            recognizer,
            symbologies,
        }
    }
}

impl<F: FrameSource, R: Recognizer> MetadataStream for RecognizingStream<F, R> {
    fn next_event(&mut self) -> StreamEvent {
        match self.source.next_frame() {
            Ok(Some(frame)) => {
                let detections = self.recognizer.recognize(&frame, &self.symbologies);
                StreamEvent::Frame(MetadataFrame {
                    sequence: frame.sequence,
                    detections,
                })
            }
            Ok(None) => StreamEvent::Idle,
            Err(fault) => StreamEvent::Fault(fault),
        }
    }
}
