//! Core types for camera code scanning.
//!
//! This crate is small and purely geometric. It knows nothing about cameras
//! or threads: it defines the symbology vocabulary, the preview geometry and
//! the mapping from a scan region drawn on the preview to the normalized
//! rectangle of interest a capture pipeline understands.
//!
//! ```
//! use codescan_core::{map_to_normalized, PreviewGeometry, Rect, ScanRegion, Size};
//!
//! let preview = PreviewGeometry::new(Size::new(375.0, 667.0), Size::new(1920.0, 1080.0));
//! let region = ScanRegion::from_rect(Rect::new(62.5, 208.5, 250.0, 250.0), preview.display_size);
//! let roi = map_to_normalized(&region, &preview).expect("not the whole frame");
//! assert!(!roi.is_empty());
//! ```

mod geometry;
mod logger;
mod preview;
mod region;
mod symbology;

pub use geometry::{DisplayTransform, NormalizedRect, Rect, Size};
pub use preview::{ContentMode, Orientation, PreviewGeometry};
pub use region::{denormalize, map_to_normalized, RegionMask, ScanRegion};
pub use symbology::{ParseSymbologyError, Symbology, SymbologySet};

#[cfg(feature = "tracing")]
pub use logger::{init_tracing, init_tracing_with_default};

pub use logger::init_with_level;
