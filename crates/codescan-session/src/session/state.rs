use std::fmt;

use codescan_core::{RegionMask, SymbologySet};
use serde::{Deserialize, Serialize};

use crate::probe::InputSelector;

/// Lifecycle of a [`CaptureSession`](super::CaptureSession).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Configuring,
    Running,
    Stopped,
    Faulted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Configuring => "configuring",
            SessionState::Running => "running",
            SessionState::Stopped => "stopped",
            SessionState::Faulted => "faulted",
        };
        f.write_str(s)
    }
}

/// Torch capability and switch position.
///
/// `engaged` only means something while the session is running; it drops
/// back to false whenever streaming ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorchState {
    pub available: bool,
    pub engaged: bool,
}

/// What a session is asked to recognize and where.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub symbologies: SymbologySet,
    #[serde(default)]
    pub mask: RegionMask,
    #[serde(default)]
    pub input: InputSelector,
}

impl SessionConfig {
    pub fn new(symbologies: SymbologySet) -> Self {
        Self {
            symbologies,
            mask: RegionMask::Unrestricted,
            input: InputSelector::Default,
        }
    }

    pub fn with_mask(mut self, mask: RegionMask) -> Self {
        self.mask = mask;
        self
    }

    pub fn with_input(mut self, input: InputSelector) -> Self {
        self.input = input;
        self
    }
}
