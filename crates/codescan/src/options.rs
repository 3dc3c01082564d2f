//! Scanner options.
//!
//! Some knobs only matter to a UI layer (button titles, overlay); they are
//! carried here so hosts can keep one options file. The rest feeds
//! [`ScanController::configure_with_options`](crate::ScanController::configure_with_options).

use std::path::Path;

use codescan_core::{Size, Symbology, SymbologySet};
use codescan_session::InputSelector;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum OptionsError {
    #[error("failed to read options: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid options: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerOptions {
    pub cancel_button_title: String,
    /// Start scanning as soon as the options are applied.
    pub start_scanning_at_load: bool,
    pub show_cancel_button: bool,
    /// Only shown when the current input actually has a torch.
    pub show_torch_button: bool,
    pub show_overlay_view: bool,
    /// Size of the centered scan region. Zero means the whole preview.
    pub scan_region_size: Size,
    pub symbologies: SymbologySet,
    /// Stop after the first decoded payload.
    pub one_shot: bool,
    pub input: InputSelector,
}

impl Default for ScannerOptions {
    fn default() -> Self {
        Self {
            cancel_button_title: "Cancel".to_string(),
            start_scanning_at_load: true,
            show_cancel_button: true,
            show_torch_button: false,
            show_overlay_view: true,
            scan_region_size: Size::ZERO,
            symbologies: SymbologySet::single(Symbology::Qr),
            one_shot: true,
            input: InputSelector::Default,
        }
    }
}

impl ScannerOptions {
    /// Defaults adjusted by `build`.
    ///
    /// ```
    /// use codescan::{ScannerOptions, Size};
    ///
    /// let options = ScannerOptions::build(|o| {
    ///     o.show_torch_button = true;
    ///     o.scan_region_size = Size::new(250.0, 250.0);
    /// });
    /// assert!(options.one_shot);
    /// ```
    pub fn build(build: impl FnOnce(&mut ScannerOptions)) -> Self {
        let mut options = Self::default();
        build(&mut options);
        options
    }

    pub fn from_json_str(json: &str) -> Result<Self, OptionsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, OptionsError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}
