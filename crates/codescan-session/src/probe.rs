//! Capability queries.
//!
//! Every answer is computed from a fresh backend query. Devices come and go
//! (front/back switch, external cameras), so nothing is cached here.

use std::sync::Arc;

use codescan_core::{Symbology, SymbologySet};
use serde::{Deserialize, Serialize};

use crate::backend::{Authorization, CameraBackend, DevicePosition, InputDevice};

/// Which input a session should open.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum InputSelector {
    /// Back camera if present, otherwise the first input.
    #[default]
    Default,
    Position(DevicePosition),
    Id(crate::backend::DeviceId),
}

#[derive(Clone)]
pub struct CapabilityProbe {
    backend: Arc<dyn CameraBackend>,
}

impl std::fmt::Debug for CapabilityProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityProbe").finish_non_exhaustive()
    }
}

impl CapabilityProbe {
    pub fn new(backend: Arc<dyn CameraBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn CameraBackend> {
        &self.backend
    }

    /// At least one capture-capable input exists.
    pub fn is_scanning_available(&self) -> bool {
        !self.backend.inputs().is_empty()
    }

    /// Every member of `symbologies` is reportable. Vacuously true for the
    /// empty set.
    pub fn supports(&self, symbologies: &SymbologySet) -> bool {
        symbologies.is_subset(&self.backend.supported_symbologies())
    }

    pub fn supports_qr_code(&self) -> bool {
        self.supports(&SymbologySet::single(Symbology::Qr))
    }

    pub fn supported_symbologies(&self) -> SymbologySet {
        self.backend.supported_symbologies()
    }

    /// Members of `symbologies` the recognizer cannot report.
    pub fn unsupported(&self, symbologies: &SymbologySet) -> Vec<Symbology> {
        symbologies.missing_from(&self.backend.supported_symbologies())
    }

    /// Torch capability of `input`, looked up again by id.
    ///
    /// An input that has since disappeared has no torch.
    pub fn is_torch_available(&self, input: &InputDevice) -> bool {
        self.backend
            .inputs()
            .into_iter()
            .any(|device| device.id == input.id && device.has_torch)
    }

    /// Preferred back-facing input, falling back to the first one listed.
    pub fn default_input(&self) -> Option<InputDevice> {
        let inputs = self.backend.inputs();
        inputs
            .iter()
            .find(|device| device.position == DevicePosition::Back)
            .or_else(|| inputs.first())
            .cloned()
    }

    pub fn front_input(&self) -> Option<InputDevice> {
        self.backend
            .inputs()
            .into_iter()
            .find(|device| device.position == DevicePosition::Front)
    }

    pub fn select(&self, selector: &InputSelector) -> Option<InputDevice> {
        match selector {
            InputSelector::Default => self.default_input(),
            InputSelector::Position(DevicePosition::Front) => self.front_input(),
            InputSelector::Position(position) => self
                .backend
                .inputs()
                .into_iter()
                .find(|device| device.position == *position),
            InputSelector::Id(id) => self
                .backend
                .inputs()
                .into_iter()
                .find(|device| &device.id == id),
        }
    }

    pub fn authorization(&self) -> Authorization {
        self.backend.authorization()
    }

    /// Snapshot of everything above, for diagnostics.
    pub fn report(&self) -> CapabilityReport {
        let inputs = self.backend.inputs();
        let default_input = self.default_input().map(|device| device.id);
        CapabilityReport {
            scanning_available: !inputs.is_empty(),
            authorization: self.backend.authorization(),
            qr_code: self.supports_qr_code(),
            torch: inputs.iter().any(|device| device.has_torch),
            default_input,
            inputs,
            symbologies: self.backend.supported_symbologies(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapabilityReport {
    pub scanning_available: bool,
    pub authorization: Authorization,
    pub qr_code: bool,
    /// Some input has a torch.
    pub torch: bool,
    pub default_input: Option<crate::backend::DeviceId>,
    pub inputs: Vec<InputDevice>,
    pub symbologies: SymbologySet,
}
