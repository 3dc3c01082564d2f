//! Scripted camera backend.
//!
//! [`SimulatedCamera`] plays back recognizer output from a queue. Frames are
//! pushed up front from a [`SimScenario`] or at any time from a test, and
//! the device list, permission and torch can be changed while a session is
//! streaming. Useful for tests and for the demo CLI; it never touches real
//! hardware.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use codescan_core::{NormalizedRect, Symbology, SymbologySet};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::backend::{
    Authorization, BackendError, CameraBackend, Detection, DeviceId, DevicePosition, FaultKind,
    InputDevice, MetadataFrame, MetadataStream, OpenedInput, RuntimeFault, StreamEvent,
    TorchControl,
};

#[derive(thiserror::Error, Debug)]
pub enum ScenarioError {
    #[error("failed to read scenario: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid scenario: {0}")]
    Json(#[from] serde_json::Error),
}

/// One scripted frame. A frame with a `fault` ends the stream with that fault.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimFrame {
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<RuntimeFault>,
}

impl SimFrame {
    pub fn with_detections(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            fault: None,
        }
    }

    /// A frame with one QR code over the whole sensor.
    pub fn qr(payload: &str) -> Self {
        Self::with_detections(vec![Detection::new(payload, Symbology::Qr, NormalizedRect::FULL)])
    }

    pub fn fault(fault: RuntimeFault) -> Self {
        Self {
            detections: Vec::new(),
            fault: Some(fault),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimScenario {
    pub inputs: Vec<InputDevice>,
    pub supported: SymbologySet,
    pub authorization: Authorization,
    /// Upper bound on how long a stream poll blocks.
    pub poll_interval_ms: u64,
    pub frames: Vec<SimFrame>,
}

impl Default for SimScenario {
    fn default() -> Self {
        Self {
            inputs: vec![
                InputDevice::new("back", DevicePosition::Back, true),
                InputDevice::new("front", DevicePosition::Front, false),
            ],
            supported: SymbologySet::all(),
            authorization: Authorization::Authorized,
            poll_interval_ms: 10,
            frames: Vec::new(),
        }
    }
}

impl SimScenario {
    pub fn from_json_str(json: &str) -> Result<Self, ScenarioError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

struct Hardware {
    inputs: Vec<InputDevice>,
    supported: SymbologySet,
    authorization: Authorization,
    torch: HashMap<DeviceId, bool>,
    opened: u64,
}

impl Hardware {
    fn has(&self, id: &DeviceId) -> bool {
        self.inputs.iter().any(|device| &device.id == id)
    }
}

struct Shared {
    hardware: Mutex<Hardware>,
    frames_tx: Sender<SimFrame>,
    frames_rx: Receiver<SimFrame>,
    poll: Duration,
}

#[derive(Clone)]
pub struct SimulatedCamera {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SimulatedCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedCamera")
            .field("pending_frames", &self.pending_frames())
            .finish_non_exhaustive()
    }
}

impl SimulatedCamera {
    pub fn new(scenario: SimScenario) -> Self {
        let (frames_tx, frames_rx) = crossbeam_channel::unbounded();
        for frame in scenario.frames {
            // both ends are alive, cannot fail
            let _ = frames_tx.send(frame);
        }
        Self {
            shared: Arc::new(Shared {
                hardware: Mutex::new(Hardware {
                    inputs: scenario.inputs,
                    supported: scenario.supported,
                    authorization: scenario.authorization,
                    torch: HashMap::new(),
                    opened: 0,
                }),
                frames_tx,
                frames_rx,
                poll: Duration::from_millis(scenario.poll_interval_ms.max(1)),
            }),
        }
    }

    /// Queue a frame for whichever stream polls next.
    pub fn push_frame(&self, frame: SimFrame) {
        let _ = self.shared.frames_tx.send(frame);
    }

    pub fn push_detections(&self, detections: Vec<Detection>) {
        self.push_frame(SimFrame::with_detections(detections));
    }

    /// Queue an OS interruption.
    pub fn interrupt(&self, detail: &str) {
        self.push_frame(SimFrame::fault(RuntimeFault::new(FaultKind::Interrupted, detail)));
    }

    pub fn pending_frames(&self) -> usize {
        self.shared.frames_rx.len()
    }

    pub fn add_input(&self, device: InputDevice) {
        let mut hw = self.shared.hardware.lock();
        hw.inputs.retain(|d| d.id != device.id);
        hw.inputs.push(device);
    }

    /// Unplug a device. Streams open on it fault on their next poll.
    pub fn remove_input(&self, id: &DeviceId) {
        let mut hw = self.shared.hardware.lock();
        hw.inputs.retain(|d| &d.id != id);
        hw.torch.remove(id);
    }

    pub fn set_authorization(&self, authorization: Authorization) {
        self.shared.hardware.lock().authorization = authorization;
    }

    pub fn set_supported(&self, supported: SymbologySet) {
        self.shared.hardware.lock().supported = supported;
    }

    pub fn torch_engaged(&self, id: &DeviceId) -> bool {
        self.shared
            .hardware
            .lock()
            .torch
            .get(id)
            .copied()
            .unwrap_or(false)
    }

    /// How many times an input was opened.
    pub fn open_count(&self) -> u64 {
        self.shared.hardware.lock().opened
    }
}

impl CameraBackend for SimulatedCamera {
    fn inputs(&self) -> Vec<InputDevice> {
        self.shared.hardware.lock().inputs.clone()
    }

    fn supported_symbologies(&self) -> SymbologySet {
        self.shared.hardware.lock().supported.clone()
    }

    fn authorization(&self) -> Authorization {
        self.shared.hardware.lock().authorization
    }

    fn open(
        &self,
        device: &InputDevice,
        _symbologies: &SymbologySet,
    ) -> Result<OpenedInput, BackendError> {
        let mut hw = self.shared.hardware.lock();
        let Some(found) = hw.inputs.iter().find(|d| d.id == device.id).cloned() else {
            return Err(BackendError::DeviceNotFound(device.id.clone()));
        };
        hw.opened += 1;
        let torch: Option<Arc<dyn TorchControl>> = if found.has_torch {
            Some(Arc::new(SimTorch {
                shared: Arc::clone(&self.shared),
                device: found.id.clone(),
            }))
        } else {
            None
        };
        Ok(OpenedInput {
            stream: Box::new(SimStream {
                shared: Arc::clone(&self.shared),
                device: found.id,
                sequence: 0,
            }),
            torch,
        })
    }
}

struct SimStream {
    shared: Arc<Shared>,
    device: DeviceId,
    sequence: u64,
}

impl MetadataStream for SimStream {
    fn next_event(&mut self) -> StreamEvent {
        if !self.shared.hardware.lock().has(&self.device) {
            return StreamEvent::Fault(RuntimeFault::new(
                FaultKind::DeviceRemoved,
                format!("`{}` disconnected", self.device),
            ));
        }
        match self.shared.frames_rx.recv_timeout(self.shared.poll) {
            Ok(SimFrame {
                fault: Some(fault), ..
            }) => StreamEvent::Fault(fault),
            Ok(frame) => {
                self.sequence += 1;
                StreamEvent::Frame(MetadataFrame {
                    sequence: self.sequence,
                    detections: frame.detections,
                })
            }
            Err(RecvTimeoutError::Timeout) => StreamEvent::Idle,
            Err(RecvTimeoutError::Disconnected) => {
                StreamEvent::Fault(RuntimeFault::new(FaultKind::StreamEnded, "frame queue closed"))
            }
        }
    }
}

struct SimTorch {
    shared: Arc<Shared>,
    device: DeviceId,
}

impl TorchControl for SimTorch {
    fn set_torch(&self, engaged: bool) -> Result<(), BackendError> {
        let mut hw = self.shared.hardware.lock();
        if !hw.has(&self.device) {
            return Err(BackendError::DeviceUnavailable {
                device: self.device.clone(),
                reason: "disconnected".to_string(),
            });
        }
        hw.torch.insert(self.device.clone(), engaged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_json_fills_defaults() {
        let scenario = SimScenario::from_json_str(
            r#"{
                "supported": ["qr"],
                "frames": [
                    { "detections": [
                        { "payload": "hello", "symbology": "qr",
                          "bounds": { "x": 0.2, "y": 0.2, "width": 0.3, "height": 0.3 } }
                    ] },
                    { "fault": { "kind": "interrupted", "detail": "call" } }
                ]
            }"#,
        )
        .expect("parse");
        assert_eq!(scenario.inputs.len(), 2);
        assert_eq!(scenario.poll_interval_ms, 10);
        assert_eq!(scenario.frames.len(), 2);
        assert_eq!(scenario.frames[0].detections[0].payload, "hello");
        assert!(scenario.frames[1].fault.is_some());
    }

    #[test]
    fn scenario_loads_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scenario.json");
        std::fs::write(&path, r#"{ "authorization": "denied", "inputs": [] }"#).expect("write");
        let scenario = SimScenario::load_json(&path).expect("load");
        assert_eq!(scenario.authorization, Authorization::Denied);
        assert!(scenario.inputs.is_empty());

        let missing = SimScenario::load_json(dir.path().join("absent.json"));
        assert!(matches!(missing, Err(ScenarioError::Io(_))));
    }

    #[test]
    fn stream_plays_queue_then_idles() {
        let sim = SimulatedCamera::new(SimScenario {
            frames: vec![SimFrame::qr("one")],
            poll_interval_ms: 1,
            ..SimScenario::default()
        });
        let back = sim.inputs()[0].clone();
        let mut opened = sim.open(&back, &SymbologySet::all()).expect("open");
        assert!(opened.torch.is_some());

        match opened.stream.next_event() {
            StreamEvent::Frame(frame) => {
                assert_eq!(frame.sequence, 1);
                assert_eq!(frame.detections[0].payload, "one");
            }
            other => panic!("expected frame, got {other:?}"),
        }
        assert_eq!(opened.stream.next_event(), StreamEvent::Idle);

        sim.remove_input(&back.id);
        assert!(matches!(
            opened.stream.next_event(),
            StreamEvent::Fault(RuntimeFault {
                kind: FaultKind::DeviceRemoved,
                ..
            })
        ));
    }

    #[test]
    fn opening_a_missing_device_fails() {
        let sim = SimulatedCamera::new(SimScenario::default());
        let ghost = InputDevice::new("ghost", DevicePosition::External, false);
        assert!(matches!(
            sim.open(&ghost, &SymbologySet::all()),
            Err(BackendError::DeviceNotFound(_))
        ));
        assert_eq!(sim.open_count(), 0);
    }

    #[test]
    fn torch_writes_are_recorded() {
        let sim = SimulatedCamera::new(SimScenario::default());
        let back = sim.inputs()[0].clone();
        let torch = sim
            .open(&back, &SymbologySet::all())
            .expect("open")
            .torch
            .expect("back camera has a torch");
        torch.set_torch(true).expect("torch on");
        assert!(sim.torch_engaged(&back.id));
        sim.remove_input(&back.id);
        assert!(torch.set_torch(false).is_err());
    }
}
