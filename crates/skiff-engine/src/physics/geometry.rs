//! Contact geometry for the naive backend and point queries.
//!
//! Every shape is treated as a capsule: a core segment (zero length for
//! circles) inflated by a radius. Two capsules touch when the distance between
//! their core segments is at most the sum of their radii.

use crate::body::{BodyState, ShapeGeometry};
use crate::math::Vec2;

/// Contact between two capsules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactGeometry {
    /// Unit normal from the first shape towards the second.
    pub normal: Vec2,
    pub depth: f64,
    /// Midpoint between the two surfaces.
    pub point: Vec2,
}

/// Closest point to `p` on segment `ab`.
pub fn closest_point_on_segment(p: Vec2, a: Vec2, b: Vec2) -> Vec2 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= f64::EPSILON {
        return a;
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

/// Closest points between segments `p1q1` and `p2q2`.
///
/// After Ericson, *Real-Time Collision Detection*, 5.1.9.
pub fn closest_points_between_segments(p1: Vec2, q1: Vec2, p2: Vec2, q2: Vec2) -> (Vec2, Vec2) {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.length_squared();
    let e = d2.length_squared();
    let f = d2.dot(r);

    if a <= f64::EPSILON && e <= f64::EPSILON {
        return (p1, p2);
    }
    let (s, t) = if a <= f64::EPSILON {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(r);
        if e <= f64::EPSILON {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(d2);
            let denom = a * e - b * b;
            let mut s = if denom > f64::EPSILON {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };
    (p1 + d1 * s, p2 + d2 * t)
}

/// Contact between two shapes, or `None` if they do not touch.
pub fn contact(
    shape_a: &ShapeGeometry,
    state_a: &BodyState,
    shape_b: &ShapeGeometry,
    state_b: &BodyState,
) -> Option<ContactGeometry> {
    let (a0, a1, ra) = shape_a.world_capsule(state_a);
    let (b0, b1, rb) = shape_b.world_capsule(state_b);
    let (ca, cb) = closest_points_between_segments(a0, a1, b0, b1);
    let delta = cb - ca;
    let distance = delta.length();
    let reach = ra + rb;
    if distance > reach {
        return None;
    }
    let normal = if distance > f64::EPSILON {
        Vec2::new(delta.x / distance, delta.y / distance)
    } else {
        // Core segments cross: fall back to the body centers, then to +y.
        let centers = (state_b.position - state_a.position).normalize_or_zero();
        if centers == Vec2::ZERO {
            Vec2::new(0.0, 1.0)
        } else {
            centers
        }
    };
    Some(ContactGeometry {
        normal,
        depth: reach - distance,
        point: ca + normal * (ra - (reach - distance) * 0.5),
    })
}

/// Distance from `point` to the surface of a shape. Zero inside the shape.
pub fn point_distance(shape: &ShapeGeometry, state: &BodyState, point: Vec2) -> f64 {
    let (a, b, radius) = shape.world_capsule(state);
    let closest = closest_point_on_segment(point, a, b);
    (closest.distance(point) - radius).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle(radius: f64) -> ShapeGeometry {
        ShapeGeometry::Circle {
            radius,
            offset: Vec2::ZERO,
        }
    }

    #[test]
    fn overlapping_circles_report_depth_and_normal() {
        let c = contact(
            &circle(1.0),
            &BodyState::at(Vec2::new(0.0, 0.0)),
            &circle(1.0),
            &BodyState::at(Vec2::new(1.5, 0.0)),
        )
        .unwrap();
        assert!((c.depth - 0.5).abs() < 1e-12);
        assert_eq!(c.normal, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn separated_circles_do_not_touch() {
        assert!(contact(
            &circle(1.0),
            &BodyState::at(Vec2::ZERO),
            &circle(1.0),
            &BodyState::at(Vec2::new(2.5, 0.0)),
        )
        .is_none());
    }

    #[test]
    fn circle_resting_on_floor_segment() {
        let floor = ShapeGeometry::Segment {
            a: Vec2::new(-10.0, 0.0),
            b: Vec2::new(10.0, 0.0),
            radius: 0.5,
        };
        let c = contact(
            &floor,
            &BodyState::default(),
            &circle(1.0),
            &BodyState::at(Vec2::new(3.0, 1.25)),
        )
        .unwrap();
        assert_eq!(c.normal, Vec2::new(0.0, 1.0));
        assert!((c.depth - 0.25).abs() < 1e-12);
    }

    #[test]
    fn crossing_segments_have_zero_distance() {
        let (a, b) = closest_points_between_segments(
            Vec2::new(-1.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, -1.0),
            Vec2::new(0.0, 1.0),
        );
        assert!(a.distance(b) < 1e-12);
    }

    #[test]
    fn coincident_centers_pick_a_normal() {
        let c = contact(
            &circle(1.0),
            &BodyState::default(),
            &circle(1.0),
            &BodyState::default(),
        )
        .unwrap();
        assert!((c.normal.length() - 1.0).abs() < 1e-12);
        assert!((c.depth - 2.0).abs() < 1e-12);
    }

    #[test]
    fn point_distance_to_capsule() {
        let floor = ShapeGeometry::Segment {
            a: Vec2::new(0.0, 0.0),
            b: Vec2::new(10.0, 0.0),
            radius: 1.0,
        };
        let state = BodyState::default();
        assert!((point_distance(&floor, &state, Vec2::new(5.0, 4.0)) - 3.0).abs() < 1e-12);
        assert_eq!(point_distance(&floor, &state, Vec2::new(5.0, 0.5)), 0.0);
        assert!((point_distance(&floor, &state, Vec2::new(13.0, 4.0)) - 4.0).abs() < 1e-12);
    }
}
