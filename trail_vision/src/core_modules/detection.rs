// THEORY:
// `Detection` is a plain data container: where one tracked class was found in a
// single frame. It is rebuilt from scratch every frame and only its center outlives
// the frame, by being pushed into the class's trail.

use serde::{Deserialize, Serialize};

/// A pixel coordinate in the working frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<Point> for (i32, i32) {
    fn from(point: Point) -> Self {
        (point.x, point.y)
    }
}

/// Axis-aligned box; `x`/`y` is the top-left pixel, sizes count pixels inclusively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Scales width and height, keeping the top-left corner in place.
    pub fn scaled(&self, width_scale: f32, height_scale: f32) -> Self {
        Self {
            x: self.x,
            y: self.y,
            width: (self.width as f32 * width_scale) as u32,
            height: (self.height as f32 * height_scale) as u32,
        }
    }
}

/// The dominant blob of one class in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Detection {
    /// Reported position of the object, `None` when the mask held no contour.
    pub center: Option<Point>,
    /// Center of the minimum enclosing circle, in sub-pixel coordinates.
    pub circle_center: Option<(f32, f32)>,
    /// Radius of the minimum enclosing circle; 0 when nothing was found.
    pub radius: f32,
    /// Raw bounding box of the dominant contour.
    pub bounding_box: Option<BoundingBox>,
}

impl Detection {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_found(&self) -> bool {
        self.center.is_some()
    }

    /// True when the object is large enough to be annotated.
    pub fn exceeds(&self, min_radius: f32) -> bool {
        self.is_found() && self.radius > min_radius
    }
}
