//! Scan-region mapping from preview display space into the sensor's
//! normalized space.
//!
//! The mapping is a pure function of the region and the [`PreviewGeometry`];
//! callers re-run it whenever the orientation, display size or content mode
//! changes. Nothing here fails: bad input degrades to the empty rectangle,
//! which the capture session reads as "scan nothing".

use serde::{Deserialize, Serialize};

use crate::geometry::{NormalizedRect, Rect, Size};
use crate::preview::PreviewGeometry;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Region of the preview where codes are accepted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanRegion {
    /// Whole frame, no masking.
    #[default]
    Full,
    /// Explicit rectangle in display points, given against `display_size`.
    ///
    /// If the preview is later resized the rectangle is rescaled
    /// proportionally. A zero `display_size` means "use the rectangle as is".
    Rect { rect: Rect, display_size: Size },
    /// Rectangle of fixed size centered in whatever the preview currently is.
    Centered { size: Size },
}

impl ScanRegion {
    /// Explicit region. A `0×0` rectangle is the whole-frame sentinel.
    pub fn from_rect(rect: Rect, display_size: Size) -> Self {
        if rect.width == 0.0 && rect.height == 0.0 {
            ScanRegion::Full
        } else {
            ScanRegion::Rect { rect, display_size }
        }
    }

    /// Centered region. A zero size is the whole-frame sentinel.
    pub fn centered(size: Size) -> Self {
        if size.is_zero() {
            ScanRegion::Full
        } else {
            ScanRegion::Centered { size }
        }
    }

    /// True for the sentinel, in any of its spellings.
    pub fn is_full(&self) -> bool {
        match self {
            ScanRegion::Full => true,
            ScanRegion::Rect { rect, .. } => rect.width == 0.0 && rect.height == 0.0,
            ScanRegion::Centered { size } => size.is_zero(),
        }
    }

    /// Resolve into a rectangle in the coordinates of a display of size
    /// `display`. `None` for the whole-frame sentinel.
    pub fn resolve(&self, display: Size) -> Option<Rect> {
        if self.is_full() {
            return None;
        }
        match *self {
            ScanRegion::Full => None,
            ScanRegion::Rect { rect, display_size } => {
                if display_size.is_degenerate() || display_size == display {
                    Some(rect)
                } else {
                    Some(rect.scaled(
                        display.width / display_size.width,
                        display.height / display_size.height,
                    ))
                }
            }
            ScanRegion::Centered { size } => Some(Rect::new(
                (display.width - size.width) * 0.5,
                (display.height - size.height) * 0.5,
                size.width,
                size.height,
            )),
        }
    }
}

/// Map a scan region into the sensor's normalized rectangle of interest.
///
/// Returns `None` for the whole-frame sentinel. Otherwise the region is
/// clipped to the visible preview, pushed through the content-mode and
/// orientation transform and clamped to `[0,1]`. A region that ends up with
/// no area, including one entirely off-screen or a non-finite one, yields
/// [`NormalizedRect::EMPTY`].
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip(geometry)))]
pub fn map_to_normalized(region: &ScanRegion, geometry: &PreviewGeometry) -> Option<NormalizedRect> {
    let rect = region.resolve(geometry.display_size)?;
    if !rect.is_finite() {
        log::warn!("non-finite scan region {rect:?}; scanning disabled");
        return Some(NormalizedRect::EMPTY);
    }
    let Some(visible) = rect
        .standardized()
        .intersection(&Rect::from_size(geometry.display_size))
    else {
        log::debug!("scan region {rect:?} is outside the preview");
        return Some(NormalizedRect::EMPTY);
    };
    let Some(transform) = geometry.display_to_sensor() else {
        log::warn!("degenerate preview geometry {geometry:?}; scanning disabled");
        return Some(NormalizedRect::EMPTY);
    };
    Some(NormalizedRect::clamped(transform.map_rect(&visible)))
}

/// Inverse of [`map_to_normalized`]: sensor-normalized rectangle back into
/// display points. `None` when the geometry is degenerate.
pub fn denormalize(rect: &NormalizedRect, geometry: &PreviewGeometry) -> Option<Rect> {
    let inverse = geometry.display_to_sensor()?.inverse()?;
    Some(inverse.map_rect(rect.as_rect()))
}

/// The mask a capture session applies to recognizer output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "rect", rename_all = "snake_case")]
pub enum RegionMask {
    #[default]
    Unrestricted,
    /// Only matches intersecting this rectangle pass. An empty rectangle
    /// rejects everything.
    Restricted(NormalizedRect),
}

impl RegionMask {
    pub fn from_mapping(mapped: Option<NormalizedRect>) -> Self {
        match mapped {
            None => RegionMask::Unrestricted,
            Some(rect) => RegionMask::Restricted(rect),
        }
    }

    /// Map `region` under `geometry` and wrap the result.
    pub fn for_region(region: &ScanRegion, geometry: &PreviewGeometry) -> Self {
        Self::from_mapping(map_to_normalized(region, geometry))
    }

    /// Whether a match with these bounds is inside the mask.
    pub fn admits(&self, bounds: &NormalizedRect) -> bool {
        match self {
            RegionMask::Unrestricted => true,
            RegionMask::Restricted(rect) => !rect.is_empty() && rect.intersects(bounds),
        }
    }

    /// The mask rejects every match.
    pub fn is_disabled(&self) -> bool {
        matches!(self, RegionMask::Restricted(rect) if rect.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::{ContentMode, Orientation};
    use approx::assert_abs_diff_eq;

    fn phone() -> PreviewGeometry {
        PreviewGeometry::new(Size::new(375.0, 667.0), Size::new(1920.0, 1080.0))
    }

    fn assert_rect_close(a: &Rect, b: &Rect, eps: f64) {
        assert_abs_diff_eq!(a.x, b.x, epsilon = eps);
        assert_abs_diff_eq!(a.y, b.y, epsilon = eps);
        assert_abs_diff_eq!(a.width, b.width, epsilon = eps);
        assert_abs_diff_eq!(a.height, b.height, epsilon = eps);
    }

    #[test]
    fn sentinel_is_unmasked_for_every_geometry() {
        for orientation in Orientation::ALL {
            for mode in [ContentMode::Stretch, ContentMode::AspectFit, ContentMode::AspectFill] {
                let g = phone().with_orientation(orientation).with_content_mode(mode);
                let region = ScanRegion::from_rect(Rect::ZERO, g.display_size);
                assert_eq!(region, ScanRegion::Full);
                assert!(map_to_normalized(&region, &g).is_none());
                assert!(map_to_normalized(&ScanRegion::centered(Size::ZERO), &g).is_none());
            }
        }
        let degenerate = PreviewGeometry::new(Size::ZERO, Size::ZERO);
        assert!(map_to_normalized(&ScanRegion::Full, &degenerate).is_none());
    }

    #[test]
    fn round_trip_inside_preview() {
        let regions = [
            Rect::new(60.0, 200.0, 250.0, 250.0),
            Rect::new(0.0, 0.0, 375.0, 667.0),
            Rect::new(10.5, 600.25, 30.0, 40.0),
        ];
        for orientation in Orientation::ALL {
            for mode in [ContentMode::Stretch, ContentMode::AspectFill] {
                for mirrored in [false, true] {
                    let g = phone()
                        .with_orientation(orientation)
                        .with_content_mode(mode)
                        .with_mirrored(mirrored);
                    for rect in regions {
                        let region = ScanRegion::from_rect(rect, g.display_size);
                        let n = map_to_normalized(&region, &g).expect("masked");
                        let back = denormalize(&n, &g).expect("invertible");
                        assert_rect_close(&back, &rect, 1e-6);
                    }
                }
            }
        }
    }

    #[test]
    fn round_trip_inside_letterboxed_content() {
        let g = phone().with_content_mode(ContentMode::AspectFit);
        let frame = g.content_frame().expect("frame");
        let rect = Rect::new(frame.x + 5.0, frame.y + 5.0, frame.width - 10.0, 100.0);
        let n = map_to_normalized(&ScanRegion::from_rect(rect, g.display_size), &g).expect("masked");
        assert_rect_close(&denormalize(&n, &g).expect("invertible"), &rect, 1e-6);
    }

    #[test]
    fn portrait_swaps_axes() {
        let g = PreviewGeometry::new(Size::new(1080.0, 1920.0), Size::new(1920.0, 1080.0))
            .with_content_mode(ContentMode::Stretch);
        // Left half of the portrait display, top quarter.
        let rect = Rect::new(0.0, 0.0, 540.0, 480.0);
        let n = map_to_normalized(&ScanRegion::from_rect(rect, g.display_size), &g).expect("masked");
        assert_abs_diff_eq!(n.x(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(n.y(), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(n.width(), 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(n.height(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn outside_preview_maps_to_empty() {
        let g = phone();
        let off = ScanRegion::from_rect(Rect::new(500.0, 900.0, 50.0, 50.0), g.display_size);
        let n = map_to_normalized(&off, &g).expect("masked");
        assert!(n.is_empty());
        assert!(RegionMask::from_mapping(Some(n)).is_disabled());
    }

    #[test]
    fn letterbox_only_region_maps_to_empty() {
        let g = PreviewGeometry::new(Size::new(400.0, 400.0), Size::new(1920.0, 1080.0))
            .with_content_mode(ContentMode::AspectFit);
        let frame = g.content_frame().expect("frame");
        assert!(frame.x > 1.0);
        let bar = ScanRegion::from_rect(Rect::new(0.0, 0.0, frame.x * 0.5, 400.0), g.display_size);
        assert!(map_to_normalized(&bar, &g).expect("masked").is_empty());
    }

    #[test]
    fn partially_visible_region_is_clipped() {
        let g = phone().with_content_mode(ContentMode::Stretch);
        let r = Rect::new(-100.0, -100.0, 200.0, 200.0);
        let n = map_to_normalized(&ScanRegion::from_rect(r, g.display_size), &g).expect("masked");
        let back = denormalize(&n, &g).expect("invertible");
        assert_rect_close(&back, &Rect::new(0.0, 0.0, 100.0, 100.0), 1e-6);
    }

    #[test]
    fn non_finite_and_flat_regions_disable_scanning() {
        let g = phone();
        let nan = ScanRegion::from_rect(Rect::new(f64::NAN, 0.0, 10.0, 10.0), g.display_size);
        assert!(map_to_normalized(&nan, &g).expect("masked").is_empty());
        let flat = ScanRegion::from_rect(Rect::new(10.0, 10.0, 0.0, 50.0), g.display_size);
        assert!(map_to_normalized(&flat, &g).expect("masked").is_empty());
    }

    #[test]
    fn centered_region_follows_rotation() {
        let region = ScanRegion::centered(Size::new(250.0, 250.0));
        let portrait = phone();
        let landscape = PreviewGeometry::new(Size::new(667.0, 375.0), Size::new(1920.0, 1080.0))
            .with_orientation(Orientation::LandscapeRight);
        let p = region.resolve(portrait.display_size).expect("rect");
        let l = region.resolve(landscape.display_size).expect("rect");
        assert_abs_diff_eq!(p.x, 62.5);
        assert_abs_diff_eq!(l.x, 208.5);
        assert_ne!(
            map_to_normalized(&region, &portrait),
            map_to_normalized(&region, &landscape)
        );
    }

    #[test]
    fn explicit_region_rescales_with_display() {
        let region = ScanRegion::from_rect(Rect::new(10.0, 20.0, 100.0, 200.0), Size::new(200.0, 400.0));
        let r = region.resolve(Size::new(400.0, 800.0)).expect("rect");
        assert_rect_close(&r, &Rect::new(20.0, 40.0, 200.0, 400.0), 1e-12);
    }

    #[test]
    fn mask_admission() {
        let mask = RegionMask::Restricted(NormalizedRect::new(0.25, 0.25, 0.5, 0.5));
        assert!(mask.admits(&NormalizedRect::new(0.4, 0.4, 0.1, 0.1)));
        assert!(mask.admits(&NormalizedRect::new(0.7, 0.7, 0.2, 0.2)));
        assert!(!mask.admits(&NormalizedRect::new(0.0, 0.0, 0.1, 0.1)));
        assert!(RegionMask::Unrestricted.admits(&NormalizedRect::new(0.0, 0.0, 0.1, 0.1)));
        assert!(!RegionMask::Restricted(NormalizedRect::EMPTY).admits(&NormalizedRect::FULL));
    }
}
