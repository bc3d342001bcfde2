// Copyright 2025 the Nestbox Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Forbidden zones: static rectangles no region or avatar may occupy.
//!
//! Zones have no identity beyond their bounds and are kept in registration order, which is
//! also the order [`ForbiddenZones::clamp_position`] applies them in. Each zone adjusts the
//! output of the previous one, so multi-zone corners resolve reproducibly rather than
//! optimally.

use kurbo::{Rect, Size};
use smallvec::SmallVec;

use crate::error::EngineError;
use crate::geometry;

/// Ordered store of forbidden zones.
#[derive(Clone, Debug)]
pub struct ForbiddenZones {
    zones: Vec<Rect>,
    min_size: Size,
}

impl ForbiddenZones {
    /// Create an empty store. `min_size` floors every size produced by
    /// [`ForbiddenZones::clamp_size`].
    pub fn new(min_size: Size) -> Self {
        Self {
            zones: Vec::new(),
            min_size,
        }
    }

    /// Add a zone. Zero-area or non-finite zones are rejected and nothing changes.
    pub fn add_zone(&mut self, zone: Rect) -> Result<(), EngineError> {
        if !geometry::is_valid(zone) {
            tracing::warn!(?zone, "rejecting forbidden zone with no area");
            return Err(EngineError::InvalidGeometry(zone));
        }
        self.zones.push(zone);
        tracing::debug!(?zone, total = self.zones.len(), "forbidden zone added");
        Ok(())
    }

    /// Remove the first zone equal to `zone`. Returns `false` if there was none.
    pub fn remove_zone(&mut self, zone: Rect) -> bool {
        let Some(pos) = self.zones.iter().position(|z| *z == zone) else {
            return false;
        };
        self.zones.remove(pos);
        true
    }

    /// Zones in registration order.
    pub fn zones(&self) -> &[Rect] {
        &self.zones
    }

    /// Number of zones.
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Whether there are no zones.
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Size floor applied by [`ForbiddenZones::clamp_size`].
    pub fn min_size(&self) -> Size {
        self.min_size
    }

    /// Whether `bounds` strictly intersects any zone.
    pub fn intersects_any(&self, bounds: Rect) -> bool {
        self.zones.iter().any(|z| geometry::intersects(bounds, *z))
    }

    /// Move `proposed` back out of every zone it would enter, judged from `current`.
    ///
    /// Returns `proposed` untouched when it is clear of all zones.
    pub fn clamp_position(&self, current: Rect, proposed: Rect) -> Rect {
        if !self.intersects_any(proposed) {
            return proposed;
        }
        let mut out = proposed;
        for zone in &self.zones {
            if geometry::intersects(out, *zone) {
                out = geometry::approach_clamp(current, out, *zone);
            }
        }
        tracing::trace!(?current, ?proposed, clamped = ?out, "zone clamp");
        out
    }

    /// Shrink a growing `proposed` size so the region stops short of zones to its right or
    /// below, and floor the result at the minimum size.
    pub fn clamp_size(&self, current: Rect, proposed: Size) -> Size {
        let mut out = proposed;
        for zone in &self.zones {
            out = geometry::grow_clamp(current, out, *zone, self.min_size);
        }
        geometry::floor_size(out, self.min_size)
    }

    /// The part of `area` not covered by any zone.
    pub fn movable_area(&self, area: Rect) -> ClipRegion {
        let mut pieces: SmallVec<[Rect; 8]> = SmallVec::new();
        if geometry::is_valid(area) {
            pieces.push(area);
        }
        for zone in &self.zones {
            if !pieces.iter().any(|p| geometry::intersects(*p, *zone)) {
                continue;
            }
            pieces = pieces
                .into_iter()
                .flat_map(|p| geometry::subtract(p, *zone))
                .collect();
        }
        ClipRegion { bounds: area, pieces }
    }
}

/// A rectangle with holes, stored as disjoint rectangular pieces.
///
/// Produced by [`ForbiddenZones::movable_area`]; subtracting zones from a rectangle is not
/// generally a rectangle.
#[derive(Clone, Debug)]
pub struct ClipRegion {
    bounds: Rect,
    pieces: SmallVec<[Rect; 8]>,
}

impl ClipRegion {
    /// The rectangle the zones were subtracted from.
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Disjoint pieces whose union is the region.
    pub fn pieces(&self) -> &[Rect] {
        &self.pieces
    }

    /// Whether nothing is left.
    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// Whether `rect` lies entirely inside the region.
    pub fn covers(&self, rect: Rect) -> bool {
        if !geometry::contains_rect(self.bounds, rect) {
            return false;
        }
        let area = rect.area();
        if area <= 0.0 {
            return self.pieces.iter().any(|p| geometry::contains_rect(*p, rect));
        }
        // Pieces are disjoint, so their overlaps with `rect` add up to its area iff covered.
        let covered: f64 = self
            .pieces
            .iter()
            .filter_map(|p| geometry::intersection(*p, rect))
            .map(|r| r.area())
            .sum();
        (area - covered).abs() <= area * 1e-9
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ForbiddenZones {
        ForbiddenZones::new(Size::new(20.0, 20.0))
    }

    #[test]
    fn rejects_empty_zones() {
        let mut zones = store();
        let err = zones.add_zone(Rect::new(10.0, 10.0, 10.0, 50.0));
        assert_eq!(
            err,
            Err(EngineError::InvalidGeometry(Rect::new(10.0, 10.0, 10.0, 50.0)))
        );
        assert!(zones.is_empty());
        assert!(!zones.remove_zone(Rect::new(0.0, 0.0, 1.0, 1.0)));
    }

    #[test]
    fn clamp_is_identity_when_clear() {
        let mut zones = store();
        zones.add_zone(Rect::new(100.0, 100.0, 200.0, 200.0)).unwrap();
        let current = Rect::new(0.0, 0.0, 10.0, 10.0);
        let proposed = Rect::new(20.0, 0.0, 30.0, 10.0);
        assert_eq!(zones.clamp_position(current, proposed), proposed);
    }

    #[test]
    fn falling_into_zone_stops_on_top() {
        let mut zones = store();
        zones.add_zone(Rect::new(0.0, 100.0, 300.0, 120.0)).unwrap();
        let current = Rect::new(10.0, 50.0, 30.0, 80.0);
        let proposed = Rect::new(15.0, 90.0, 35.0, 120.0);
        let out = zones.clamp_position(current, proposed);
        assert_eq!(out, Rect::new(10.0, 70.0, 30.0, 100.0));
        assert!(!zones.intersects_any(out));
    }

    #[test]
    fn zones_apply_in_registration_order() {
        let mut zones = store();
        zones.add_zone(Rect::new(50.0, 0.0, 60.0, 100.0)).unwrap();
        zones.add_zone(Rect::new(40.0, 0.0, 45.0, 100.0)).unwrap();
        let current = Rect::new(0.0, 10.0, 20.0, 30.0);
        let proposed = Rect::new(45.0, 10.0, 65.0, 30.0);
        // First zone pushes to x = 30, which then overlaps the second zone, pushing to x = 20.
        let out = zones.clamp_position(current, proposed);
        assert_eq!(out.x0, 20.0);
    }

    #[test]
    fn clamp_size_shrinks_growth_toward_zone() {
        let mut zones = store();
        zones.add_zone(Rect::new(100.0, 0.0, 120.0, 100.0)).unwrap();
        let current = Rect::new(40.0, 10.0, 80.0, 50.0);
        let size = zones.clamp_size(current, Size::new(200.0, 40.0));
        assert_eq!(size, Size::new(60.0, 40.0));
        // Below the minimum is floored even without zones in the way.
        let size = zones.clamp_size(current, Size::new(5.0, 5.0));
        assert_eq!(size, Size::new(20.0, 20.0));
    }

    #[test]
    fn movable_area_excludes_zones() {
        let mut zones = store();
        zones.add_zone(Rect::new(40.0, 40.0, 60.0, 60.0)).unwrap();
        let area = zones.movable_area(Rect::new(0.0, 0.0, 100.0, 100.0));
        assert!(area.covers(Rect::new(0.0, 0.0, 40.0, 100.0)));
        assert!(area.covers(Rect::new(0.0, 0.0, 100.0, 40.0)));
        assert!(!area.covers(Rect::new(30.0, 30.0, 50.0, 50.0)));
        assert!(!area.covers(Rect::new(90.0, 90.0, 110.0, 110.0)));
        // Spans several pieces without touching the hole.
        assert!(area.covers(Rect::new(0.0, 30.0, 40.0, 70.0)));
    }
}
