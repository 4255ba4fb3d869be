// THEORY:
// Annotations are drawn on the live frame only, never on the persistent overlay,
// so they follow the objects instead of accumulating.
//
// - Ball: enclosing circle plus a filled dot on the reported center, once its
//   radius exceeds the class's minimum radius.
// - Robot: bounding box once its radius exceeds the minimum radius times the
//   robot size factor. The box keeps the raw width and is stretched downward,
//   because the color marker only covers the top of the chassis.
// - Start: a filled dot where the ball was first seen since the last reset.
//
// Each drawn shape is also returned as an `Annotation` with its caption, so the
// presentation layer can render text labels with whatever fonts it has.

use crate::config::LocatorGeometry;
use crate::core_modules::detection::{BoundingBox, Detection, Point};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};

pub const BALL_OUTLINE: Rgb<u8> = Rgb([255, 255, 0]);
pub const BALL_CENTER: Rgb<u8> = Rgb([255, 165, 0]);
pub const ROBOT_OUTLINE: Rgb<u8> = Rgb([255, 0, 255]);
pub const START_MARKER: Rgb<u8> = Rgb([0, 255, 0]);

pub const BALL_LABEL: &str = "Ball";
pub const ROBOT_LABEL: &str = "Robot";
pub const START_LABEL: &str = "Start";

const OUTLINE_THICKNESS: i32 = 2;
const DOT_RADIUS: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AnnotationShape {
    Circle { center: Point, radius: i32 },
    Box(BoundingBox),
    Dot(Point),
}

/// One shape drawn on a frame, with the caption that belongs next to it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Annotation {
    pub label: &'static str,
    pub shape: AnnotationShape,
    pub color: [u8; 3],
    /// Where the caption goes: just above and left of the shape.
    pub label_anchor: Point,
}

fn draw_thick_circle(frame: &mut RgbImage, center: (i32, i32), radius: i32, color: Rgb<u8>) {
    for inset in 0..OUTLINE_THICKNESS {
        let r = radius - inset;
        if r >= 0 {
            draw_hollow_circle_mut(frame, center, r, color);
        }
    }
}

fn draw_thick_rect(frame: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    for inset in 0..OUTLINE_THICKNESS {
        let shrink = 2 * inset as u32;
        if bbox.width <= shrink || bbox.height <= shrink {
            break;
        }
        let rect = Rect::at(bbox.x + inset, bbox.y + inset)
            .of_size(bbox.width - shrink, bbox.height - shrink);
        draw_hollow_rect_mut(frame, rect, color);
    }
}

/// Draws the ball's circle and center when it is larger than `min_radius`.
pub fn annotate_ball(frame: &mut RgbImage, detection: &Detection, min_radius: f32) -> Option<Annotation> {
    if !detection.exceeds(min_radius) {
        return None;
    }
    let center = detection.center?;
    let (cx, cy) = detection.circle_center?;
    let circle_center = Point::new(cx as i32, cy as i32);
    let radius = detection.radius as i32;

    draw_thick_circle(frame, circle_center.into(), radius, BALL_OUTLINE);
    draw_filled_circle_mut(frame, center.into(), DOT_RADIUS, BALL_CENTER);

    Some(Annotation {
        label: BALL_LABEL,
        shape: AnnotationShape::Circle {
            center: circle_center,
            radius,
        },
        color: BALL_CENTER.0,
        label_anchor: Point::new(circle_center.x - 10, circle_center.y - 10),
    })
}

/// Draws the robot's stretched bounding box when it is large enough.
pub fn annotate_robot(
    frame: &mut RgbImage,
    detection: &Detection,
    min_radius: f32,
    geometry: &LocatorGeometry,
) -> Option<Annotation> {
    if !detection.exceeds(min_radius * geometry.robot_size_factor) {
        return None;
    }
    let bbox = detection
        .bounding_box?
        .scaled(geometry.robot_box_width_scale, geometry.robot_box_height_scale);
    draw_thick_rect(frame, &bbox, ROBOT_OUTLINE);

    Some(Annotation {
        label: ROBOT_LABEL,
        shape: AnnotationShape::Box(bbox),
        color: ROBOT_OUTLINE.0,
        label_anchor: Point::new(bbox.x, bbox.y - 10),
    })
}

/// Marks where the ball's trail began.
pub fn annotate_start(frame: &mut RgbImage, start: Point) -> Annotation {
    draw_filled_circle_mut(frame, start.into(), DOT_RADIUS, START_MARKER);
    Annotation {
        label: START_LABEL,
        shape: AnnotationShape::Dot(start),
        color: START_MARKER.0,
        label_anchor: start,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(radius: f32) -> Detection {
        Detection {
            center: Some(Point::new(50, 50)),
            circle_center: Some((50.0, 50.0)),
            radius,
            bounding_box: Some(BoundingBox {
                x: 40,
                y: 40,
                width: 20,
                height: 10,
            }),
        }
    }

    #[test]
    fn small_ball_is_not_annotated() {
        let mut frame = RgbImage::new(100, 100);
        for radius in [1.0, 9.5, 10.0] {
            assert!(annotate_ball(&mut frame, &detection(radius), 10.0).is_none());
        }
        assert!(frame.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn large_ball_gets_circle_and_dot() {
        let mut frame = RgbImage::new(100, 100);
        let annotation = annotate_ball(&mut frame, &detection(20.0), 10.0).unwrap();
        assert_eq!(annotation.label, BALL_LABEL);
        assert_eq!(frame.get_pixel(50, 50), &BALL_CENTER);
        assert_eq!(frame.get_pixel(70, 50), &BALL_OUTLINE);
    }

    #[test]
    fn robot_needs_twice_the_min_radius() {
        let geometry = LocatorGeometry::default();
        let mut frame = RgbImage::new(100, 100);
        assert!(annotate_robot(&mut frame, &detection(15.0), 10.0, &geometry).is_none());
        assert!(annotate_robot(&mut frame, &detection(20.0), 10.0, &geometry).is_none());
        assert!(annotate_robot(&mut frame, &detection(20.5), 10.0, &geometry).is_some());
    }

    #[test]
    fn robot_box_is_stretched_downward_only() {
        let geometry = LocatorGeometry::default();
        let mut frame = RgbImage::new(100, 100);
        let annotation = annotate_robot(&mut frame, &detection(25.0), 10.0, &geometry).unwrap();
        assert_eq!(
            annotation.shape,
            AnnotationShape::Box(BoundingBox {
                x: 40,
                y: 40,
                width: 20,
                height: 20
            })
        );
        assert_eq!(frame.get_pixel(40, 59), &ROBOT_OUTLINE);
        assert_eq!(frame.get_pixel(50, 50), &Rgb([0, 0, 0]));
    }

    #[test]
    fn undetected_objects_are_never_annotated() {
        let mut frame = RgbImage::new(10, 10);
        let geometry = LocatorGeometry::default();
        assert!(annotate_ball(&mut frame, &Detection::none(), 0.5).is_none());
        assert!(annotate_robot(&mut frame, &Detection::none(), 0.5, &geometry).is_none());
    }

    #[test]
    fn start_marker_is_a_green_dot() {
        let mut frame = RgbImage::new(20, 20);
        let annotation = annotate_start(&mut frame, Point::new(10, 10));
        assert_eq!(annotation.label, START_LABEL);
        assert_eq!(frame.get_pixel(10, 10), &START_MARKER);
    }
}
