// Copyright 2025 the Nestbox Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Collision and movement resolver.
//!
//! Movement is clamped in two stages: forbidden zones first, then obstacle regions. Both
//! stages use the same directional-approach rule ([`geometry::approach_clamp`]) and apply
//! obstacles one after another, each adjusting the output of the previous one. Results depend
//! on obstacle order, so callers supply obstacles in a stable order.
//!
//! Zones always win. An obstacle clamp can push the result back into a zone the proposal never
//! touched; the zone stage then runs again from the same starting bounds, and if that still
//! cannot clear every zone the offending axes hold at `current`.

use kurbo::{Point, Rect, Size, Vec2};

use crate::geometry;
use crate::region::RegionId;
use crate::stacking::StackingRegistry;
use crate::zones::ForbiddenZones;

/// Zone/obstacle alternations before zones take precedence outright.
const MAX_PASSES: usize = 4;

/// Outcome of [`collide`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Collision {
    /// Whether the rectangles strictly overlap.
    pub has_collision: bool,
    /// Area of the overlap rectangle, zero without a collision.
    pub overlap_area: f64,
    /// Advisory push for `region`, away from the obstacle.
    ///
    /// Points from the obstacle's center to the region's center and has the length of the
    /// overlap rectangle's smaller side. Coincident centers push straight up.
    pub separation: Vec2,
}

impl Collision {
    /// No contact.
    pub const NONE: Self = Self {
        has_collision: false,
        overlap_area: 0.0,
        separation: Vec2::ZERO,
    };
}

/// Overlap test between `region` and `obstacle`.
pub fn collide(region: Rect, obstacle: Rect) -> Collision {
    let Some(overlap) = geometry::intersection(region, obstacle) else {
        return Collision::NONE;
    };
    let depth = overlap.width().min(overlap.height());
    let dir = region.center() - obstacle.center();
    let len = dir.hypot();
    let separation = if len > 0.0 {
        dir * (depth / len)
    } else {
        Vec2::new(0.0, -depth)
    };
    Collision {
        has_collision: true,
        overlap_area: overlap.area(),
        separation,
    }
}

/// Clamps moves and resizes against forbidden zones and obstacle rectangles.
#[derive(Copy, Clone, Debug)]
pub struct CollisionResolver<'a> {
    zones: &'a ForbiddenZones,
}

impl<'a> CollisionResolver<'a> {
    /// A resolver consulting `zones` before any obstacle.
    pub fn new(zones: &'a ForbiddenZones) -> Self {
        Self { zones }
    }

    /// The nearest legal bounds for moving from `current` toward `proposed`.
    ///
    /// Zones are applied first, then every obstacle that intersects the running result, in
    /// the order given. The result never intersects a zone that `current` stays clear of.
    pub fn clamp_position(&self, current: Rect, proposed: Rect, obstacles: &[Rect]) -> Rect {
        let mut out = self.zones.clamp_position(current, proposed);
        for _ in 0..MAX_PASSES {
            for obstacle in obstacles {
                if geometry::intersects(out, *obstacle) {
                    out = geometry::approach_clamp(current, out, *obstacle);
                }
            }
            if !self.zones.intersects_any(out) {
                break;
            }
            out = self.zones.clamp_position(current, out);
            if obstacles.iter().all(|o| !geometry::intersects(out, *o)) {
                break;
            }
        }
        if self.zones.intersects_any(out) {
            out = self.hold_axes(current, out);
        }
        if out != proposed {
            tracing::trace!(?current, ?proposed, clamped = ?out, "movement clamped");
        }
        out
    }

    /// Fall back to `current` on whichever axes keep `out` inside a zone.
    fn hold_axes(&self, current: Rect, out: Rect) -> Rect {
        let y_only = out.with_origin((current.x0, out.y0));
        let x_only = out.with_origin((out.x0, current.y0));
        if !self.zones.intersects_any(y_only) {
            y_only
        } else if !self.zones.intersects_any(x_only) {
            x_only
        } else {
            tracing::debug!(?current, ?out, "zones leave no legal move; holding position");
            out.with_origin(current.origin())
        }
    }

    /// The nearest legal size for resizing `current` toward `proposed`.
    ///
    /// Growth toward a zone or obstacle to the right or below stops at the gap; the result is
    /// never smaller than the zone store's minimum size.
    pub fn clamp_size(&self, current: Rect, proposed: Size, obstacles: &[Rect]) -> Size {
        let min = self.zones.min_size();
        let mut out = self.zones.clamp_size(current, proposed);
        for obstacle in obstacles {
            out = geometry::grow_clamp(current, out, *obstacle, min);
        }
        geometry::floor_size(out, min)
    }
}

/// The frontmost of `regions` whose bounds contain `point`.
pub fn topmost_at<I>(point: Point, regions: I, stacking: &StackingRegistry) -> Option<RegionId>
where
    I: IntoIterator<Item = (RegionId, Rect)>,
{
    stacking.frontmost(
        regions
            .into_iter()
            .filter(|(_, bounds)| geometry::contains_point(*bounds, point))
            .map(|(id, _)| id),
    )
}
