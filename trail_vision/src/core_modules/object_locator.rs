// THEORY:
// The `object_locator` reduces a binary mask to a single `Detection`. It is a
// stateless utility with no memory of earlier frames.
//
// Algorithm:
// 1.  **Contours**: trace every border in the mask and keep the outer borders of
//     top-level regions only (holes and nested regions are ignored).
// 2.  **Dominant region**: pick the contour with the largest enclosed polygon
//     area. On a tie the first contour in trace order wins.
// 3.  **Geometry**: compute first-order moments of that polygon (area-weighted
//     centroid), its minimum enclosing circle and its bounding box.
// 4.  **Center**: the centroid is reported by default. It stays stable when part
//     of the enclosing circle is occluded. The circle center can be selected
//     instead through `CenterStrategy`.
//
// Size filtering is not done here: a tiny blob still yields a center so the
// trail keeps its continuity, and the caller decides whether to annotate it.

use crate::config::CenterStrategy;
use crate::core_modules::detection::{BoundingBox, Detection, Point};
use image::GrayImage;
use imageproc::contours::{BorderType, Contour, find_contours};
use imageproc::geometry::convex_hull;
use imageproc::point::Point as ContourPoint;

const CIRCLE_EPSILON: f64 = 1e-7;

/// First-order polygon moments of a contour.
///
/// The Green's theorem sums are kept unscaled (twice the area, six times the
/// first moments) so they stay exact integers and the centroid of a symmetric
/// region lands exactly on its axis of symmetry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moments {
    double_area: f64,
    sum_x: f64,
    sum_y: f64,
}

impl Moments {
    /// Moments of the polygon traced by `points`. The traversal direction is
    /// normalized so the area is never negative.
    pub fn of_polygon(points: &[ContourPoint<i32>]) -> Self {
        let mut moments = Moments {
            double_area: 0.0,
            sum_x: 0.0,
            sum_y: 0.0,
        };
        let Some(last) = points.last() else {
            return moments;
        };

        let (mut prev_x, mut prev_y) = (last.x as f64, last.y as f64);
        for point in points {
            let (x, y) = (point.x as f64, point.y as f64);
            let cross = prev_x * y - x * prev_y;
            moments.double_area += cross;
            moments.sum_x += cross * (prev_x + x);
            moments.sum_y += cross * (prev_y + y);
            prev_x = x;
            prev_y = y;
        }

        if moments.double_area < 0.0 {
            moments.double_area = -moments.double_area;
            moments.sum_x = -moments.sum_x;
            moments.sum_y = -moments.sum_y;
        }
        moments
    }

    /// Zeroth moment, the enclosed area.
    pub fn area(&self) -> f64 {
        self.double_area / 2.0
    }

    pub fn m10(&self) -> f64 {
        self.sum_x / 6.0
    }

    pub fn m01(&self) -> f64 {
        self.sum_y / 6.0
    }

    /// Area-weighted centroid, `None` for a degenerate polygon.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.double_area == 0.0 {
            None
        } else {
            let denominator = 3.0 * self.double_area;
            Some((self.sum_x / denominator, self.sum_y / denominator))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
}

impl Circle {
    fn at(point: (f64, f64)) -> Self {
        Self {
            x: point.0,
            y: point.1,
            radius: 0.0,
        }
    }

    fn through_two(a: (f64, f64), b: (f64, f64)) -> Self {
        let x = (a.0 + b.0) / 2.0;
        let y = (a.1 + b.1) / 2.0;
        Self {
            x,
            y,
            radius: distance((x, y), a),
        }
    }

    fn through_three(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> Self {
        let (bx, by) = (b.0 - a.0, b.1 - a.1);
        let (cx, cy) = (c.0 - a.0, c.1 - a.1);
        let determinant = 2.0 * (bx * cy - by * cx);

        if determinant.abs() < CIRCLE_EPSILON {
            // Collinear: the widest pair spans the other point.
            return [Self::through_two(a, b), Self::through_two(a, c), Self::through_two(b, c)]
                .into_iter()
                .fold(Self::at(a), |widest, circle| {
                    if circle.radius > widest.radius { circle } else { widest }
                });
        }

        let b_norm = bx * bx + by * by;
        let c_norm = cx * cx + cy * cy;
        let ux = (cy * b_norm - by * c_norm) / determinant;
        let uy = (bx * c_norm - cx * b_norm) / determinant;
        Self {
            x: a.0 + ux,
            y: a.1 + uy,
            radius: (ux * ux + uy * uy).sqrt(),
        }
    }

    fn contains(&self, point: (f64, f64)) -> bool {
        distance((self.x, self.y), point) <= self.radius + CIRCLE_EPSILON * self.radius.max(1.0)
    }
}

fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// Smallest circle containing every point (incremental Welzl construction).
pub fn min_enclosing_circle(points: &[(f64, f64)]) -> Option<Circle> {
    let (&first, rest) = points.split_first()?;
    let mut circle = Circle::at(first);

    for (i, &p) in rest.iter().enumerate() {
        if circle.contains(p) {
            continue;
        }
        circle = Circle::at(p);
        // `points[..=i]` are the points before `p`.
        for (j, &q) in points[..=i].iter().enumerate() {
            if circle.contains(q) {
                continue;
            }
            circle = Circle::through_two(p, q);
            for &r in &points[..j] {
                if !circle.contains(r) {
                    circle = Circle::through_three(p, q, r);
                }
            }
        }
    }
    Some(circle)
}

fn bounding_box(points: &[ContourPoint<i32>]) -> Option<BoundingBox> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for point in points {
        min_x = min_x.min(point.x);
        min_y = min_y.min(point.y);
        max_x = max_x.max(point.x);
        max_y = max_y.max(point.y);
    }
    Some(BoundingBox {
        x: min_x,
        y: min_y,
        width: (max_x - min_x + 1) as u32,
        height: (max_y - min_y + 1) as u32,
    })
}

/// Outer borders of the top-level regions of `mask`.
pub fn external_contours(mask: &GrayImage) -> Vec<Contour<i32>> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|contour| matches!(contour.border_type, BorderType::Outer) && contour.parent.is_none())
        .collect()
}

/// Finds the dominant region of `mask` and describes it.
pub fn locate(mask: &GrayImage, strategy: CenterStrategy) -> Detection {
    if mask.width() == 0 || mask.height() == 0 {
        return Detection::none();
    }

    let contours = external_contours(mask);

    let mut dominant: Option<(&Contour<i32>, Moments)> = None;
    for contour in &contours {
        let moments = Moments::of_polygon(&contour.points);
        match dominant {
            Some((_, best)) if moments.area() <= best.area() => {}
            _ => dominant = Some((contour, moments)),
        }
    }
    let Some((contour, moments)) = dominant else {
        return Detection::none();
    };

    let hull_points = if contour.points.len() >= 3 {
        convex_hull(contour.points.as_slice())
    } else {
        contour.points.clone()
    };
    let hull: Vec<(f64, f64)> = hull_points.iter().map(|p| (p.x as f64, p.y as f64)).collect();
    let circle = min_enclosing_circle(&hull).unwrap_or(Circle::at((
        contour.points[0].x as f64,
        contour.points[0].y as f64,
    )));

    let centroid = moments.centroid().unwrap_or_else(|| {
        // A line or single pixel has no area; fall back to the mean boundary point.
        let count = contour.points.len() as f64;
        let (sum_x, sum_y) = contour
            .points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x as f64, sy + p.y as f64));
        (sum_x / count, sum_y / count)
    });

    let reported = match strategy {
        CenterStrategy::Centroid => centroid,
        CenterStrategy::EnclosingCircle => (circle.x, circle.y),
    };

    Detection {
        center: Some(Point::new(reported.0 as i32, reported.1 as i32)),
        circle_center: Some((circle.x as f32, circle.y as f32)),
        radius: circle.radius as f32,
        bounding_box: bounding_box(&contour.points),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
    use imageproc::rect::Rect;

    const FOREGROUND: Luma<u8> = Luma([255]);

    #[test]
    fn empty_mask_has_no_center() {
        let mask = GrayImage::new(50, 50);
        let detection = locate(&mask, CenterStrategy::Centroid);
        assert_eq!(detection.center, None);
        assert_eq!(detection.radius, 0.0);
        assert!(!detection.is_found());
    }

    #[test]
    fn largest_region_wins() {
        let mut mask = GrayImage::new(100, 60);
        // 5x10 = 50 pixels.
        draw_filled_rect_mut(&mut mask, Rect::at(5, 5).of_size(5, 10), FOREGROUND);
        // 10x20 = 200 pixels.
        draw_filled_rect_mut(&mut mask, Rect::at(40, 10).of_size(10, 20), FOREGROUND);

        let detection = locate(&mask, CenterStrategy::Centroid);
        assert_eq!(detection.center, Some(Point::new(44, 19)));
        assert_eq!(
            detection.bounding_box,
            Some(BoundingBox {
                x: 40,
                y: 10,
                width: 10,
                height: 20
            })
        );
    }

    #[test]
    fn nested_regions_are_not_external() {
        let mut mask = GrayImage::new(60, 60);
        draw_filled_rect_mut(&mut mask, Rect::at(10, 10).of_size(40, 40), FOREGROUND);
        draw_filled_rect_mut(&mut mask, Rect::at(20, 20).of_size(20, 20), Luma([0]));
        draw_filled_rect_mut(&mut mask, Rect::at(27, 27).of_size(6, 6), FOREGROUND);

        let contours = external_contours(&mask);
        assert_eq!(contours.len(), 1);
    }

    #[test]
    fn disk_reports_centroid_and_radius() {
        let mut mask = GrayImage::new(100, 100);
        draw_filled_circle_mut(&mut mask, (50, 40), 15, FOREGROUND);

        let detection = locate(&mask, CenterStrategy::Centroid);
        assert_eq!(detection.center, Some(Point::new(50, 40)));
        assert!((detection.radius - 15.0).abs() < 1.0, "radius {}", detection.radius);
        let (cx, cy) = detection.circle_center.unwrap();
        assert!((cx - 50.0).abs() < 1.0 && (cy - 40.0).abs() < 1.0);
    }

    #[test]
    fn enclosing_circle_strategy_reports_circle_center() {
        // An L-shaped region: centroid and circle center differ.
        let mut mask = GrayImage::new(100, 100);
        draw_filled_rect_mut(&mut mask, Rect::at(10, 10).of_size(60, 10), FOREGROUND);
        draw_filled_rect_mut(&mut mask, Rect::at(10, 10).of_size(10, 60), FOREGROUND);

        let by_centroid = locate(&mask, CenterStrategy::Centroid);
        let by_circle = locate(&mask, CenterStrategy::EnclosingCircle);
        assert_ne!(by_centroid.center, by_circle.center);

        let (cx, cy) = by_circle.circle_center.unwrap();
        assert_eq!(by_circle.center, Some(Point::new(cx as i32, cy as i32)));
    }

    #[test]
    fn single_pixel_region_falls_back_to_its_position() {
        let mut mask = GrayImage::new(20, 20);
        mask.put_pixel(7, 9, FOREGROUND);
        let detection = locate(&mask, CenterStrategy::Centroid);
        assert_eq!(detection.center, Some(Point::new(7, 9)));
        assert_eq!(detection.radius, 0.0);
    }

    #[test]
    fn rectangle_moments_match_closed_form() {
        let square = [
            ContourPoint::new(0, 0),
            ContourPoint::new(4, 0),
            ContourPoint::new(4, 2),
            ContourPoint::new(0, 2),
        ];
        let moments = Moments::of_polygon(&square);
        assert_eq!(moments.area(), 8.0);
        assert_eq!(moments.centroid(), Some((2.0, 1.0)));

        let reversed: Vec<_> = square.iter().rev().copied().collect();
        assert_eq!(Moments::of_polygon(&reversed).area(), 8.0);
    }

    #[test]
    fn enclosing_circle_of_square_corners() {
        let corners = [(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0)];
        let circle = min_enclosing_circle(&corners).unwrap();
        assert!((circle.x - 1.0).abs() < 1e-9);
        assert!((circle.y - 1.0).abs() < 1e-9);
        assert!((circle.radius - 2f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn enclosing_circle_of_collinear_points() {
        let line = [(0.0, 0.0), (1.0, 0.0), (4.0, 0.0)];
        let circle = min_enclosing_circle(&line).unwrap();
        assert!((circle.x - 2.0).abs() < 1e-9);
        assert!((circle.radius - 2.0).abs() < 1e-9);
        assert!(min_enclosing_circle(&[]).is_none());
    }
}
