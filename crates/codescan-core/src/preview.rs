use serde::{Deserialize, Serialize};

use crate::geometry::{DisplayTransform, Rect, Size};

/// Interface orientation of the device while the preview is shown.
///
/// The sensor's native frame is `LandscapeRight`; every other orientation
/// rotates the displayed image relative to the sensor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
}

impl Orientation {
    pub const ALL: [Orientation; 4] = [
        Orientation::Portrait,
        Orientation::PortraitUpsideDown,
        Orientation::LandscapeLeft,
        Orientation::LandscapeRight,
    ];

    #[inline]
    pub fn is_portrait(self) -> bool {
        matches!(self, Orientation::Portrait | Orientation::PortraitUpsideDown)
    }

    /// Maps oriented content coordinates `(u, v)` to sensor coordinates.
    fn content_to_sensor(self) -> DisplayTransform {
        match self {
            Orientation::LandscapeRight => DisplayTransform::identity(),
            // (1 - u, 1 - v)
            Orientation::LandscapeLeft => {
                DisplayTransform::from_rows([[-1.0, 0.0, 1.0], [0.0, -1.0, 1.0]])
            }
            // (v, 1 - u)
            Orientation::Portrait => DisplayTransform::from_rows([[0.0, 1.0, 0.0], [-1.0, 0.0, 1.0]]),
            // (1 - v, u)
            Orientation::PortraitUpsideDown => {
                DisplayTransform::from_rows([[0.0, -1.0, 1.0], [1.0, 0.0, 0.0]])
            }
        }
    }
}

/// How the preview layer fits the video into its bounds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentMode {
    /// Stretch to the bounds, ignoring aspect ratio.
    Stretch,
    /// Keep aspect ratio, letterbox inside the bounds.
    AspectFit,
    /// Keep aspect ratio, crop to cover the bounds.
    #[default]
    AspectFill,
}

/// Everything the region mapper needs to know about the live preview.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PreviewGeometry {
    /// Size of the preview surface in display points.
    pub display_size: Size,
    /// Video frame size in the sensor's native (landscape) orientation.
    pub sensor_size: Size,
    #[serde(default)]
    pub content_mode: ContentMode,
    #[serde(default)]
    pub orientation: Orientation,
    /// Front cameras are previewed mirrored.
    #[serde(default)]
    pub mirrored: bool,
}

impl PreviewGeometry {
    pub fn new(display_size: Size, sensor_size: Size) -> Self {
        Self {
            display_size,
            sensor_size,
            content_mode: ContentMode::default(),
            orientation: Orientation::default(),
            mirrored: false,
        }
    }

    pub fn with_content_mode(mut self, content_mode: ContentMode) -> Self {
        self.content_mode = content_mode;
        self
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_mirrored(mut self, mirrored: bool) -> Self {
        self.mirrored = mirrored;
        self
    }

    /// Video size as it appears on screen after rotation.
    pub fn oriented_video_size(&self) -> Size {
        if self.orientation.is_portrait() {
            self.sensor_size.transposed()
        } else {
            self.sensor_size
        }
    }

    /// Where the video content lands inside the display, in display points.
    ///
    /// With `AspectFill` the frame is larger than the display and has a
    /// negative origin; with `AspectFit` it is letterboxed inside it.
    pub fn content_frame(&self) -> Option<Rect> {
        let display = self.display_size;
        let video = self.oriented_video_size();
        if display.is_degenerate() || video.is_degenerate() {
            return None;
        }
        let (w, h) = match self.content_mode {
            ContentMode::Stretch => (display.width, display.height),
            ContentMode::AspectFit | ContentMode::AspectFill => {
                let sx = display.width / video.width;
                let sy = display.height / video.height;
                let s = if self.content_mode == ContentMode::AspectFit {
                    sx.min(sy)
                } else {
                    sx.max(sy)
                };
                (video.width * s, video.height * s)
            }
        };
        Some(Rect::new(
            (display.width - w) * 0.5,
            (display.height - h) * 0.5,
            w,
            h,
        ))
    }

    /// Transform from display points to the sensor's normalized space.
    pub fn display_to_sensor(&self) -> Option<DisplayTransform> {
        let frame = self.content_frame()?;
        let mut t = DisplayTransform::translation(-frame.x, -frame.y)
            .then(DisplayTransform::scale(1.0 / frame.width, 1.0 / frame.height));
        if self.mirrored {
            t = t.then(DisplayTransform::from_rows([[-1.0, 0.0, 1.0], [0.0, 1.0, 0.0]]));
        }
        Some(t.then(self.orientation.content_to_sensor()))
    }
}
