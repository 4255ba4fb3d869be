// THEORY:
// Trails are kept in two deliberately separate places.
//
// 1.  **TrailBuffer**: a rolling window of the 64 most recent centers of one
//     class, newest first. A frame without a detection inserts `None`, which
//     breaks the line: segments are only drawn between two consecutive known
//     positions, never interpolated across a gap.
// 2.  **OverlayLayer**: a persistent image the size of the working frame. Every
//     frame, the whole visible window of every trail is drawn onto it again.
//     Nothing is ever erased, so segments that have scrolled out of the rolling
//     window stay baked in until the session is reset.
//
// The buffer decides *what* to draw, the overlay remembers *everything drawn*.

use crate::core_modules::detection::Point;
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    BresenhamLineIter, draw_antialiased_line_segment_mut, draw_filled_circle_mut,
    draw_line_segment_mut,
};
use imageproc::pixelops::interpolate;
use std::collections::VecDeque;

/// Number of positions a trail remembers.
pub const TRAIL_CAPACITY: usize = 64;

/// A line segment between two consecutive known positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub from: Point,
    pub to: Point,
}

/// Bounded history of one class's centers, newest first.
#[derive(Debug, Clone, Default)]
pub struct TrailBuffer {
    positions: VecDeque<Option<Point>>,
}

impl TrailBuffer {
    pub fn new() -> Self {
        Self {
            positions: VecDeque::with_capacity(TRAIL_CAPACITY),
        }
    }

    /// Inserts `center` as the newest entry, evicting the oldest past capacity,
    /// and returns every segment of the visible trail.
    pub fn record(&mut self, center: Option<Point>) -> Vec<Segment> {
        self.positions.push_front(center);
        if self.positions.len() > TRAIL_CAPACITY {
            self.positions.pop_back();
        }
        self.segments()
    }

    /// Segments between each adjacent pair where both positions are known.
    pub fn segments(&self) -> Vec<Segment> {
        self.positions
            .iter()
            .zip(self.positions.iter().skip(1))
            .filter_map(|pair| match pair {
                (Some(newer), Some(older)) => Some(Segment {
                    from: *newer,
                    to: *older,
                }),
                _ => None,
            })
            .collect()
    }

    pub fn newest(&self) -> Option<Point> {
        self.positions.front().copied().flatten()
    }

    /// Positions from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &Option<Point>> {
        self.positions.iter()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }
}

/// Stroke parameters for trail segments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineStroke {
    pub color: Rgb<u8>,
    pub thickness: u32,
    pub antialiased: bool,
}

/// Persistent, append-only layer of every trail segment drawn since the last reset.
#[derive(Debug, Clone)]
pub struct OverlayLayer {
    image: RgbImage,
}

impl OverlayLayer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbImage::new(width, height),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn draw_segments(&mut self, segments: &[Segment], stroke: LineStroke) {
        for segment in segments {
            self.draw_segment(segment, stroke);
        }
    }

    fn draw_segment(&mut self, segment: &Segment, stroke: LineStroke) {
        let from = (segment.from.x, segment.from.y);
        let to = (segment.to.x, segment.to.y);

        if stroke.thickness <= 1 {
            if stroke.antialiased {
                draw_antialiased_line_segment_mut(&mut self.image, from, to, stroke.color, interpolate);
            } else {
                draw_line_segment_mut(
                    &mut self.image,
                    (from.0 as f32, from.1 as f32),
                    (to.0 as f32, to.1 as f32),
                    stroke.color,
                );
            }
            return;
        }

        // Thick strokes are stamped as disks along the center line, which also
        // gives them round caps.
        let radius = (stroke.thickness / 2) as i32;
        let line = BresenhamLineIter::new((from.0 as f32, from.1 as f32), (to.0 as f32, to.1 as f32));
        for (x, y) in line {
            draw_filled_circle_mut(&mut self.image, (x, y), radius, stroke.color);
        }
        if stroke.antialiased {
            draw_antialiased_line_segment_mut(&mut self.image, from, to, stroke.color, interpolate);
        }
    }

    /// Wipes every drawn segment, keeping the dimensions.
    pub fn clear(&mut self) {
        self.image.pixels_mut().for_each(|pixel| *pixel = Rgb([0, 0, 0]));
    }

    pub fn is_blank(&self) -> bool {
        self.image.pixels().all(|pixel| pixel.0 == [0, 0, 0])
    }
}
