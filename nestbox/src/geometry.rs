// Copyright 2025 the Nestbox Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pure rectangle helpers shared by the zone store, the resolvers, and the avatar.
//!
//! Conventions used throughout the crate:
//! - Rectangles are [`kurbo::Rect`] with `x0 <= x1` and `y0 <= y1`; `y` grows downward, so
//!   `y0` is the top edge and `y1` the bottom edge.
//! - Intersection is strict: two rectangles that only share an edge do not intersect.
//!   A region resting exactly on a platform is touching it, not overlapping it.
//! - Containment is inclusive: a rectangle contains itself.

use kurbo::{Point, Rect, Size};
use smallvec::SmallVec;

/// Returns `true` if `rect` has finite coordinates and strictly positive width and height.
pub fn is_valid(rect: Rect) -> bool {
    rect.x0.is_finite()
        && rect.y0.is_finite()
        && rect.x1.is_finite()
        && rect.y1.is_finite()
        && rect.width() > 0.0
        && rect.height() > 0.0
}

/// Returns `true` if `size` is finite and strictly positive on both axes.
pub fn is_valid_size(size: Size) -> bool {
    size.width.is_finite() && size.height.is_finite() && size.width > 0.0 && size.height > 0.0
}

/// Strict overlap test; shared edges do not count.
#[inline]
pub fn intersects(a: Rect, b: Rect) -> bool {
    a.x0 < b.x1 && b.x0 < a.x1 && a.y0 < b.y1 && b.y0 < a.y1
}

/// The overlapping rectangle of `a` and `b`, or `None` if they do not strictly intersect.
pub fn intersection(a: Rect, b: Rect) -> Option<Rect> {
    intersects(a, b).then(|| a.intersect(b))
}

/// Returns `true` if `inner` lies entirely within `outer` (edges inclusive).
#[inline]
pub fn contains_rect(outer: Rect, inner: Rect) -> bool {
    outer.x0 <= inner.x0 && outer.y0 <= inner.y0 && inner.x1 <= outer.x1 && inner.y1 <= outer.y1
}

/// Returns `true` if `point` lies within `rect`.
///
/// Half-open like [`Rect::contains`]: the left and top edges are inside, the right and
/// bottom edges are not, so two regions sharing an edge never both claim a point.
#[inline]
pub fn contains_point(rect: Rect, point: Point) -> bool {
    rect.contains(point)
}

/// The smallest rectangle enclosing both inputs.
#[inline]
pub fn union(a: Rect, b: Rect) -> Rect {
    a.union(b)
}

/// Clamp `value` into `[min, max]`; if the range is inverted, `min` wins.
#[inline]
pub fn clamp_axis(value: f64, min: f64, max: f64) -> f64 {
    if max < min { min } else { value.clamp(min, max) }
}

/// Translate `inner` so it lies within `outer` on each axis where it fits.
///
/// When `inner` is larger than `outer` on an axis it is aligned to `outer`'s near edge.
pub fn clamp_within(inner: Rect, outer: Rect) -> Rect {
    let x = clamp_axis(inner.x0, outer.x0, outer.x1 - inner.width());
    let y = clamp_axis(inner.y0, outer.y0, outer.y1 - inner.height());
    inner.with_origin((x, y))
}

/// Directional-approach clamp of one proposed move against one obstacle.
///
/// Each axis is decided independently from where `current` sits relative to `obstacle`:
/// - entirely before the obstacle (left/above): stop flush against its near edge;
/// - entirely after it (right/below): stop flush against its far edge;
/// - otherwise the axis already overlaps, so it holds at `current`.
///
/// The caller decides whether the obstacle is relevant; this function does not check that
/// `proposed` intersects it.
pub fn approach_clamp(current: Rect, proposed: Rect, obstacle: Rect) -> Rect {
    let width = proposed.width();
    let height = proposed.height();

    let x = if current.x1 <= obstacle.x0 {
        obstacle.x0 - width
    } else if current.x0 >= obstacle.x1 {
        obstacle.x1
    } else {
        current.x0
    };
    let y = if current.y1 <= obstacle.y0 {
        obstacle.y0 - height
    } else if current.y0 >= obstacle.y1 {
        obstacle.y1
    } else {
        current.y0
    };
    Rect::from_origin_size((x, y), (width, height))
}

/// Shrink a growing size so the region stops at an obstacle to its right or below.
///
/// Only axes where `proposed` is larger than `current` are touched. The result on a shrunk
/// axis is the gap between `current`'s origin and the obstacle's near edge, floored at `min`.
pub fn grow_clamp(current: Rect, proposed: Size, obstacle: Rect, min: Size) -> Size {
    let origin = current.origin();
    let mut width = proposed.width;
    let mut height = proposed.height;

    if width > current.width() && obstacle.x0 >= current.x1 {
        let grown = Rect::from_origin_size(origin, (width, current.height()));
        if intersects(grown, obstacle) {
            width = (obstacle.x0 - origin.x).max(min.width).min(width);
        }
    }
    if height > current.height() && obstacle.y0 >= current.y1 {
        let grown = Rect::from_origin_size(origin, (width, height));
        if intersects(grown, obstacle) {
            height = (obstacle.y0 - origin.y).max(min.height).min(height);
        }
    }
    Size::new(width, height)
}

/// Floor both dimensions of `size` at `min`.
#[inline]
pub fn floor_size(size: Size, min: Size) -> Size {
    Size::new(size.width.max(min.width), size.height.max(min.height))
}

/// Subtract `hole` from `rect`, returning up to four disjoint pieces.
///
/// Pieces are emitted top band, bottom band, then the left and right slivers of the middle
/// band. If the two do not intersect, `rect` is returned unchanged.
pub fn subtract(rect: Rect, hole: Rect) -> SmallVec<[Rect; 4]> {
    let mut out = SmallVec::new();
    let Some(cut) = intersection(rect, hole) else {
        out.push(rect);
        return out;
    };
    if cut.y0 > rect.y0 {
        out.push(Rect::new(rect.x0, rect.y0, rect.x1, cut.y0));
    }
    if cut.y1 < rect.y1 {
        out.push(Rect::new(rect.x0, cut.y1, rect.x1, rect.y1));
    }
    if cut.x0 > rect.x0 {
        out.push(Rect::new(rect.x0, cut.y0, cut.x0, cut.y1));
    }
    if cut.x1 < rect.x1 {
        out.push(Rect::new(cut.x1, cut.y0, rect.x1, cut.y1));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_edges_do_not_intersect() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(10.0, 0.0, 20.0, 10.0);
        assert!(!intersects(a, b));
        assert!(intersection(a, b).is_none());
        assert!(intersects(a, Rect::new(9.0, 9.0, 20.0, 20.0)));
    }

    #[test]
    fn containment_is_inclusive() {
        let outer = Rect::new(0.0, 0.0, 100.0, 100.0);
        assert!(contains_rect(outer, outer));
        assert!(contains_rect(outer, Rect::new(10.0, 10.0, 100.0, 50.0)));
        assert!(!contains_rect(outer, Rect::new(-1.0, 10.0, 50.0, 50.0)));
    }

    #[test]
    fn directional_clamp_stops_at_left_edge() {
        let current = Rect::from_origin_size((0.0, 0.0), (50.0, 50.0));
        let obstacle = Rect::from_origin_size((100.0, 0.0), (50.0, 50.0));
        let proposed = Rect::from_origin_size((90.0, 0.0), (50.0, 50.0));
        let out = approach_clamp(current, proposed, obstacle);
        assert_eq!(out.x0, 50.0);
        assert_eq!(out.y0, 0.0);
        assert!(!intersects(out, obstacle));
    }

    #[test]
    fn directional_clamp_from_right_and_below() {
        let obstacle = Rect::new(0.0, 0.0, 50.0, 50.0);
        let current = Rect::new(60.0, 60.0, 80.0, 80.0);
        let proposed = Rect::new(40.0, 40.0, 60.0, 60.0);
        let out = approach_clamp(current, proposed, obstacle);
        assert_eq!(out.origin(), Point::new(50.0, 50.0));
    }

    #[test]
    fn grow_clamp_stops_at_gap_and_respects_minimum() {
        let current = Rect::new(0.0, 0.0, 40.0, 40.0);
        let obstacle = Rect::new(70.0, 0.0, 90.0, 40.0);
        let min = Size::new(20.0, 20.0);
        let out = grow_clamp(current, Size::new(100.0, 40.0), obstacle, min);
        assert_eq!(out.width, 70.0);

        // Shrinking is never touched.
        let out = grow_clamp(current, Size::new(30.0, 30.0), obstacle, min);
        assert_eq!(out, Size::new(30.0, 30.0));
    }

    #[test]
    fn subtract_yields_disjoint_cover() {
        let rect = Rect::new(0.0, 0.0, 100.0, 100.0);
        let hole = Rect::new(40.0, 40.0, 60.0, 60.0);
        let pieces = subtract(rect, hole);
        assert_eq!(pieces.len(), 4);
        let area: f64 = pieces.iter().map(|p| p.area()).sum();
        assert_eq!(area, 100.0 * 100.0 - 20.0 * 20.0);
        for (i, a) in pieces.iter().enumerate() {
            assert!(!intersects(*a, hole), "piece {i} overlaps the hole");
            for b in &pieces[i + 1..] {
                assert!(!intersects(*a, *b), "pieces must be disjoint");
            }
        }
    }

    #[test]
    fn clamp_within_aligns_oversized_to_near_edge() {
        let outer = Rect::new(0.0, 0.0, 100.0, 50.0);
        let inner = Rect::new(-20.0, 40.0, 10.0, 120.0);
        let out = clamp_within(inner, outer);
        assert_eq!(out.origin(), Point::new(0.0, 0.0));
        assert_eq!(out.size(), inner.size());
    }
}
