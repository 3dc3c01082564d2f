use std::time::SystemTime;

use codescan_core::{NormalizedRect, Symbology};
use serde::{Deserialize, Serialize};

use super::state::SessionState;
use crate::backend::RuntimeFault;

/// A decoded symbol that passed the symbology filter and the region mask.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecodeResult {
    pub payload: String,
    pub symbology: Symbology,
    pub timestamp: SystemTime,
    /// Configuration epoch the result was produced under.
    pub epoch: u64,
    /// Sequence number of the frame that carried it.
    pub frame: u64,
    pub bounds: NormalizedRect,
}

/// Everything a session publishes, in processing order.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    Decoded(DecodeResult),
    StateChanged { state: SessionState, epoch: u64 },
    Fault { epoch: u64, fault: RuntimeFault },
}

impl SessionEvent {
    pub fn epoch(&self) -> u64 {
        match self {
            SessionEvent::Decoded(result) => result.epoch,
            SessionEvent::StateChanged { epoch, .. } | SessionEvent::Fault { epoch, .. } => *epoch,
        }
    }
}
