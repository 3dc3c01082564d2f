use codescan_core::Symbology;

use super::state::SessionState;
use crate::backend::{BackendError, DeviceId};
use crate::registry::SessionId;

#[derive(thiserror::Error, Debug)]
pub enum ConfigureError {
    #[error("no capture input device available")]
    NoInputDevice,
    #[error("symbology set is empty")]
    EmptySymbologySet,
    #[error("unsupported symbologies: {unsupported:?}")]
    UnsupportedSymbologies { unsupported: Vec<Symbology> },
    #[error("session is running; stop it before reconfiguring")]
    SessionRunning,
}

#[derive(thiserror::Error, Debug)]
pub enum StartError {
    #[error("session is {state}; configure it before starting")]
    NotConfigured { state: SessionState },
    #[error("device `{device}` is held by {holder}")]
    DeviceBusy { device: DeviceId, holder: SessionId },
    #[error("device `{0}` is no longer available")]
    DeviceUnavailable(DeviceId),
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("failed to spawn capture worker: {0}")]
    Spawn(#[source] std::io::Error),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(thiserror::Error, Debug)]
pub enum TorchError {
    #[error("torch is only available while running (session is {state})")]
    NotRunning { state: SessionState },
    #[error("current input has no torch")]
    Unsupported,
    #[error(transparent)]
    Device(#[from] BackendError),
}
