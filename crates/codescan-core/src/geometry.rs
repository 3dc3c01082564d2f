use nalgebra::{Matrix3, Point2, Vector3};
use serde::{Deserialize, Serialize};

/// Width/height pair in display points or sensor pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const ZERO: Size = Size {
        width: 0.0,
        height: 0.0,
    };

    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Both extents are exactly zero.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.width == 0.0 && self.height == 0.0
    }

    /// True when the size cannot contain any area (zero, negative or non-finite).
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        !(self.width.is_finite() && self.height.is_finite())
            || self.width <= 0.0
            || self.height <= 0.0
    }

    /// Swap width and height.
    #[inline]
    pub fn transposed(self) -> Self {
        Self::new(self.height, self.width)
    }
}

/// Axis-aligned rectangle with a top-left origin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const ZERO: Rect = Rect {
        x: 0.0,
        y: 0.0,
        width: 0.0,
        height: 0.0,
    };

    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle at the origin covering `size`.
    pub fn from_size(size: Size) -> Self {
        Self::new(0.0, 0.0, size.width, size.height)
    }

    /// Smallest rectangle containing both points.
    pub fn from_corners(a: Point2<f64>, b: Point2<f64>) -> Self {
        let x0 = a.x.min(b.x);
        let y0 = a.y.min(b.y);
        Self::new(x0, y0, a.x.max(b.x) - x0, a.y.max(b.y) - y0)
    }

    #[inline]
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    #[inline]
    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    #[inline]
    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }

    /// No area: zero or negative extent on either axis.
    #[inline]
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Same rectangle with non-negative width and height.
    pub fn standardized(&self) -> Self {
        let (x, width) = if self.width < 0.0 {
            (self.x + self.width, -self.width)
        } else {
            (self.x, self.width)
        };
        let (y, height) = if self.height < 0.0 {
            (self.y + self.height, -self.height)
        } else {
            (self.y, self.height)
        };
        Self::new(x, y, width, height)
    }

    /// Overlapping part of two rectangles, `None` when they do not overlap.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.max_x().min(other.max_x());
        let y1 = self.max_y().min(other.max_y());
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Rect::new(x0, y0, x1 - x0, y1 - y0))
    }

    /// Closed-interval overlap test; touching edges and degenerate (point or
    /// line) rectangles count as intersecting.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x <= other.max_x()
            && other.x <= self.max_x()
            && self.y <= other.max_y()
            && other.y <= self.max_y()
    }

    pub fn scaled(&self, sx: f64, sy: f64) -> Self {
        Self::new(self.x * sx, self.y * sy, self.width * sx, self.height * sy)
    }
}

/// Rectangle in the sensor's normalized `[0,1]×[0,1]` space.
///
/// Construction always clamps into the unit square, so a value of this type
/// never leaves it. An empty rectangle is a valid value and means "nothing".
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "Rect", from = "Rect")]
pub struct NormalizedRect(Rect);

impl NormalizedRect {
    pub const FULL: NormalizedRect = NormalizedRect(Rect::new(0.0, 0.0, 1.0, 1.0));
    pub const EMPTY: NormalizedRect = NormalizedRect(Rect::ZERO);

    /// Clamp `rect` into the unit square. Non-finite input collapses to [`Self::EMPTY`].
    pub fn clamped(rect: Rect) -> Self {
        if !rect.is_finite() {
            return Self::EMPTY;
        }
        let r = rect.standardized();
        let x0 = r.x.clamp(0.0, 1.0);
        let y0 = r.y.clamp(0.0, 1.0);
        let x1 = r.max_x().clamp(0.0, 1.0);
        let y1 = r.max_y().clamp(0.0, 1.0);
        if x1 <= x0 || y1 <= y0 {
            return Self::EMPTY;
        }
        Self(Rect::new(x0, y0, x1 - x0, y1 - y0))
    }

    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::clamped(Rect::new(x, y, width, height))
    }

    #[inline]
    pub fn as_rect(&self) -> &Rect {
        &self.0
    }

    #[inline]
    pub fn x(&self) -> f64 {
        self.0.x
    }

    #[inline]
    pub fn y(&self) -> f64 {
        self.0.y
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.0.width
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.0.height
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn intersects(&self, other: &NormalizedRect) -> bool {
        self.0.intersects(&other.0)
    }
}

impl From<NormalizedRect> for Rect {
    fn from(value: NormalizedRect) -> Self {
        value.0
    }
}

impl From<Rect> for NormalizedRect {
    fn from(value: Rect) -> Self {
        NormalizedRect::clamped(value)
    }
}

/// 2D affine transform stored as a homogeneous 3×3 matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayTransform {
    pub m: Matrix3<f64>,
}

impl DisplayTransform {
    pub fn identity() -> Self {
        Self {
            m: Matrix3::identity(),
        }
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self {
            m: Matrix3::new(1.0, 0.0, tx, 0.0, 1.0, ty, 0.0, 0.0, 1.0),
        }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self {
            m: Matrix3::new(sx, 0.0, 0.0, 0.0, sy, 0.0, 0.0, 0.0, 1.0),
        }
    }

    pub fn from_rows(rows: [[f64; 3]; 2]) -> Self {
        Self {
            m: Matrix3::new(
                rows[0][0], rows[0][1], rows[0][2], //
                rows[1][0], rows[1][1], rows[1][2], //
                0.0, 0.0, 1.0,
            ),
        }
    }

    /// Compose: apply `self` first, then `next`.
    #[inline]
    pub fn then(self, next: DisplayTransform) -> Self {
        Self { m: next.m * self.m }
    }

    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Point2<f64> {
        let v = self.m * Vector3::new(p.x, p.y, 1.0);
        Point2::new(v[0], v[1])
    }

    pub fn inverse(&self) -> Option<Self> {
        self.m.try_inverse().map(|m| Self { m })
    }

    /// Map a rectangle through the transform.
    ///
    /// Only exact for transforms made of scales, translations and quarter
    /// turns; the result is the bounding box of the two mapped corners.
    pub fn map_rect(&self, rect: &Rect) -> Rect {
        let a = self.apply(Point2::new(rect.x, rect.y));
        let b = self.apply(Point2::new(rect.max_x(), rect.max_y()));
        Rect::from_corners(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn standardized_flips_negative_extents() {
        let r = Rect::new(10.0, 20.0, -4.0, -6.0).standardized();
        assert_eq!(r, Rect::new(6.0, 14.0, 4.0, 6.0));
    }

    #[test]
    fn intersection_of_disjoint_rects_is_none() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, 20.0, 5.0, 5.0);
        assert!(a.intersection(&b).is_none());
        assert!(!a.intersects(&b));
    }

    #[test]
    fn point_rect_intersects_when_inside() {
        let mask = Rect::new(0.25, 0.25, 0.5, 0.5);
        assert!(mask.intersects(&Rect::new(0.5, 0.5, 0.0, 0.0)));
        assert!(!mask.intersects(&Rect::new(0.9, 0.9, 0.0, 0.0)));
    }

    #[test]
    fn normalized_rect_clamps_into_unit_square() {
        let n = NormalizedRect::new(-0.5, 0.5, 1.0, 1.0);
        assert_abs_diff_eq!(n.x(), 0.0);
        assert_abs_diff_eq!(n.y(), 0.5);
        assert_abs_diff_eq!(n.width(), 0.5);
        assert_abs_diff_eq!(n.height(), 0.5);
    }

    #[test]
    fn normalized_rect_outside_is_empty() {
        assert!(NormalizedRect::new(1.5, 0.0, 0.3, 0.3).is_empty());
        assert!(NormalizedRect::new(f64::NAN, 0.0, 0.3, 0.3).is_empty());
    }

    #[test]
    fn transform_inverse_round_trips_points() {
        let t = DisplayTransform::translation(-12.0, 30.0)
            .then(DisplayTransform::scale(0.5, 0.25))
            .then(DisplayTransform::from_rows([[0.0, 1.0, 0.0], [-1.0, 0.0, 1.0]]));
        let inv = t.inverse().expect("invertible");
        for p in [Point2::new(0.0, 0.0), Point2::new(33.0, -7.5), Point2::new(320.0, 200.0)] {
            let back = inv.apply(t.apply(p));
            assert_abs_diff_eq!(back.x, p.x, epsilon = 1e-9);
            assert_abs_diff_eq!(back.y, p.y, epsilon = 1e-9);
        }
    }
}
