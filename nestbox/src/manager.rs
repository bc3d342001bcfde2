// Copyright 2025 the Nestbox Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Region manager: registration, mutation, and the per-frame update.
//!
//! The manager owns every service (stacking registry, containment forest, zone store,
//! spatial index, event bus) and is the only path through which region geometry changes.
//! Every mutation follows the same sequence:
//!
//! 1. validate input (invalid geometry and stale ids are rejected with no state change);
//! 2. clamp against forbidden zones, then any obstacles the caller supplied;
//! 3. write the bounds and commit the spatial index, accumulating [`Damage`];
//! 4. re-derive containment for the region and everything it can influence;
//! 5. flush change notifications, hierarchy events before stacking events.
//!
//! Obstacles are named by the caller. Of those, minimized regions, the mover itself, its
//! ancestors, its descendants, and any region that already encloses it are ignored; the rest
//! apply in the order given.

use std::sync::Arc;

use hashbrown::HashMap;
use kurbo::{Point, Rect, Size};

use crate::collision::{self, CollisionResolver};
use crate::config::EngineConfig;
use crate::containment::{Containment, ParentChange, RegionLookup};
use crate::error::{EngineError, ListenerError, SyncError};
use crate::events::{EventBus, RegionEvent, SubscriptionId};
use crate::frame::{self, FrameReport, Job, MutationGateway, MutationKind, RegionBehavior};
use crate::geometry;
use crate::region::{Region, RegionDesc, RegionId};
use crate::spatial::{Backend, Damage, FlatVec, Grid, SpatialIndex};
use crate::stacking::{StackingRegistry, StackingSink};
use crate::zones::ForbiddenZones;

/// Owner of all regions and the services that relate them.
///
/// The backend parameter selects the spatial index used for candidate lookup and
/// hit-testing. [`FlatVec`] suits a few dozen regions; [`Grid`] suits large levels.
pub struct RegionManager<B: Backend = FlatVec> {
    config: EngineConfig,
    slots: Vec<Option<Region>>,
    generations: Vec<u32>,
    free_list: Vec<usize>,
    /// Live regions in registration order.
    order: Vec<RegionId>,
    stacking: StackingRegistry,
    containment: Containment,
    zones: ForbiddenZones,
    index: SpatialIndex<RegionId, B>,
    events: EventBus,
    behaviors: HashMap<RegionId, Arc<dyn RegionBehavior>>,
    damage: Damage,
    frame: u64,
}

impl<B: Backend + core::fmt::Debug> core::fmt::Debug for RegionManager<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RegionManager")
            .field("regions", &self.order.len())
            .field("zones", &self.zones.len())
            .field("behaviors", &self.behaviors.len())
            .field("frame", &self.frame)
            .field("stacking", &self.stacking)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl RegionManager {
    /// Create a manager with the flat-vector spatial backend and empty services.
    pub fn new(config: EngineConfig) -> Self {
        let zones = ForbiddenZones::new(config.min_region_size);
        Self::with_services(config, zones, StackingRegistry::new(), FlatVec::default())
    }
}

impl RegionManager<Grid> {
    /// Create a manager backed by a uniform grid sized from
    /// [`EngineConfig::spatial_cell_size`].
    pub fn with_grid(config: EngineConfig) -> Self {
        let zones = ForbiddenZones::new(config.min_region_size);
        let grid = Grid::new(config.spatial_cell_size);
        Self::with_services(config, zones, StackingRegistry::new(), grid)
    }
}

impl<B: Backend> RegionManager<B> {
    /// Create a manager from explicit services.
    ///
    /// `stacking` must not contain regions; any it does are dropped, since the manager can
    /// only stack regions it owns.
    pub fn with_services(
        config: EngineConfig,
        zones: ForbiddenZones,
        stacking: StackingRegistry,
        backend: B,
    ) -> Self {
        let stacking = if stacking.is_empty() {
            stacking
        } else {
            tracing::warn!(
                stale = stacking.len(),
                "discarding regions from a pre-populated stacking registry"
            );
            StackingRegistry::new()
        };
        Self {
            config,
            slots: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            order: Vec::new(),
            stacking,
            containment: Containment::new(),
            zones,
            index: SpatialIndex::with_backend(backend),
            events: EventBus::new(),
            behaviors: HashMap::new(),
            damage: Damage::default(),
            frame: 0,
        }
    }

    // --- registration ---

    /// Register a region, placing it in front of its tier peers and resolving its parent.
    pub fn register_region(&mut self, desc: RegionDesc) -> Result<RegionId, EngineError> {
        if !geometry::is_valid(desc.bounds) {
            tracing::warn!(bounds = ?desc.bounds, "rejecting region with invalid bounds");
            return Err(EngineError::InvalidGeometry(desc.bounds));
        }
        let (idx, generation) = if let Some(idx) = self.free_list.pop() {
            let generation = self.generations[idx].saturating_add(1);
            self.generations[idx] = generation;
            self.slots[idx] = Some(Region::new(generation, &desc));
            (idx, generation)
        } else {
            self.slots.push(Some(Region::new(1, &desc)));
            self.generations.push(1);
            (self.slots.len() - 1, 1)
        };
        #[allow(
            clippy::cast_possible_truncation,
            reason = "RegionId uses 32-bit indices."
        )]
        let id = RegionId::new(idx as u32, generation);

        let key = self.index.insert(desc.bounds, id);
        if let Some(region) = self.slots[idx].as_mut() {
            region.index_key = Some(key);
        }
        self.commit_index();
        self.order.push(id);
        self.stacking.register(id, desc.tier);
        self.events.push(RegionEvent::Added(id));
        tracing::debug!(region = ?id, bounds = ?desc.bounds, tier = ?desc.tier, "region registered");

        self.refresh(id);
        self.events.flush();
        Ok(id)
    }

    /// Unregister a region. Its children are detached and re-resolved against what remains.
    pub fn unregister_region(&mut self, id: RegionId) -> Result<(), EngineError> {
        let region = self.take_region(id)?;
        if let Some(key) = region.index_key {
            self.index.remove(key);
        }
        self.commit_index();
        self.order.retain(|r| *r != id);
        self.stacking.unregister(id);
        self.behaviors.remove(&id);
        self.free_list.push(id.idx());

        let detached = self.containment.remove_from_hierarchy(id);
        self.events.push(RegionEvent::Removed(id));
        for child in detached.children {
            self.events.push(RegionEvent::ParentChanged {
                region: child,
                old: Some(id),
                new: None,
            });
            self.refresh(child);
        }
        tracing::debug!(region = ?id, "region unregistered");
        self.events.flush();
        Ok(())
    }

    // --- geometry mutation ---

    /// Move a region toward `proposed`, clamped against forbidden zones.
    ///
    /// Returns the bounds actually applied.
    pub fn move_region(&mut self, id: RegionId, proposed: Rect) -> Result<Rect, EngineError> {
        self.move_region_against(id, proposed, &[])
    }

    /// Move a region toward `proposed`, clamped against zones and then `obstacles`.
    ///
    /// Unknown or minimized obstacles are skipped, as are the region's own ancestors and
    /// descendants and anything that already encloses it.
    pub fn move_region_against(
        &mut self,
        id: RegionId,
        proposed: Rect,
        obstacles: &[RegionId],
    ) -> Result<Rect, EngineError> {
        if !geometry::is_valid(proposed) {
            tracing::warn!(region = ?id, ?proposed, "rejecting move to invalid bounds");
            return Err(EngineError::InvalidGeometry(proposed));
        }
        let current = self.bounds_or_not_found(id)?;
        let obstacles = self.obstacle_bounds(id, current, obstacles);
        let clamped = self
            .resolver()
            .clamp_position(current, proposed, &obstacles);
        self.place_region(id, clamped)?;
        Ok(clamped)
    }

    /// Resize a region toward `proposed`, keeping its origin.
    ///
    /// Growth stops at zones to the right or below; the result is never smaller than
    /// [`EngineConfig::min_region_size`].
    pub fn resize_region(&mut self, id: RegionId, proposed: Size) -> Result<Rect, EngineError> {
        self.resize_region_against(id, proposed, &[])
    }

    /// Like [`RegionManager::resize_region`], but growth also stops at `obstacles`, filtered
    /// as in [`RegionManager::move_region_against`].
    pub fn resize_region_against(
        &mut self,
        id: RegionId,
        proposed: Size,
        obstacles: &[RegionId],
    ) -> Result<Rect, EngineError> {
        if !geometry::is_valid_size(proposed) {
            tracing::warn!(region = ?id, ?proposed, "rejecting resize to invalid size");
            return Err(EngineError::InvalidSize(proposed));
        }
        let current = self.bounds_or_not_found(id)?;
        let obstacles = self.obstacle_bounds(id, current, obstacles);
        let size = self.resolver().clamp_size(current, proposed, &obstacles);
        let bounds = Rect::from_origin_size(current.origin(), size);
        self.place_region(id, bounds)?;
        Ok(bounds)
    }

    /// Re-validate bounds reported by the windowing layer after a drag or resize.
    ///
    /// Takes the same clamp path as [`RegionManager::resize_region`] followed by
    /// [`RegionManager::move_region`]; the caller should push the returned bounds back to the
    /// window if they differ from what it reported.
    pub fn apply_external_bounds(
        &mut self,
        id: RegionId,
        reported: Rect,
    ) -> Result<Rect, EngineError> {
        if !geometry::is_valid(reported) {
            tracing::warn!(region = ?id, ?reported, "rejecting external bounds");
            return Err(EngineError::InvalidGeometry(reported));
        }
        let current = self.bounds_or_not_found(id)?;
        let resized = if reported.size() == current.size() {
            current
        } else {
            self.resize_region(id, reported.size())?
        };
        self.move_region(id, Rect::from_origin_size(reported.origin(), resized.size()))
    }

    /// Minimize or restore a region. Returns `true` if the state changed.
    ///
    /// A minimized region has no parent or children and is invisible to hit-testing,
    /// collision, and containment until restored.
    pub fn set_minimized(&mut self, id: RegionId, minimized: bool) -> Result<bool, EngineError> {
        let region = self.region_mut(id).ok_or(EngineError::NotFound(id))?;
        if region.minimized == minimized {
            return Ok(false);
        }
        region.minimized = minimized;
        let bounds = region.bounds;
        let old_key = region.index_key.take();
        if let Some(key) = old_key {
            self.index.remove(key);
        }
        if !minimized {
            let key = self.index.insert(bounds, id);
            if let Some(region) = self.region_mut(id) {
                region.index_key = Some(key);
            }
        }
        self.commit_index();
        tracing::debug!(region = ?id, minimized, "minimize state changed");
        self.refresh(id);
        self.events.flush();
        Ok(true)
    }

    /// Write `bounds` without clamping, then re-derive containment.
    pub(crate) fn place_region(&mut self, id: RegionId, bounds: Rect) -> Result<(), EngineError> {
        let region = self.region_mut(id).ok_or(EngineError::NotFound(id))?;
        if region.bounds == bounds {
            return Ok(());
        }
        region.bounds = bounds;
        if let Some(key) = region.index_key {
            self.index.update(key, bounds);
        }
        self.commit_index();
        self.refresh(id);
        self.events.flush();
        Ok(())
    }

    // --- stacking ---

    /// Bring a region in front of its tier peers. Returns `true` if the order changed.
    pub fn bring_to_front(&mut self, id: RegionId) -> Result<bool, EngineError> {
        self.restack(id, true)
    }

    /// Send a region behind its tier peers. Returns `true` if the order changed.
    pub fn send_to_back(&mut self, id: RegionId) -> Result<bool, EngineError> {
        self.restack(id, false)
    }

    fn restack(&mut self, id: RegionId, front: bool) -> Result<bool, EngineError> {
        let tier = self.region(id).ok_or(EngineError::NotFound(id))?.tier;
        let changed = if front {
            self.stacking.bring_to_front(id)
        } else {
            self.stacking.send_to_back(id)
        };
        if changed {
            self.events
                .push(RegionEvent::StackingChanged { region: id, tier });
            // Tie-breaks between containers may have flipped.
            self.refresh(id);
            self.events.flush();
        }
        Ok(changed)
    }

    /// Fully re-derive the hierarchy, then push the active back-to-front order to `sink`.
    ///
    /// A sink failure is logged and returned; the abstract order is unaffected.
    pub fn update_all_orders(&mut self, sink: &mut dyn StackingSink) -> Result<(), SyncError> {
        self.rebuild_hierarchy();
        let order: Vec<RegionId> = self
            .stacking
            .iter_back_to_front()
            .filter(|id| self.is_active(*id))
            .collect();
        sink.apply_order(&order).inspect_err(|err| {
            tracing::warn!(%err, regions = order.len(), "failed to sync stacking order");
        })
    }

    /// Clear the hierarchy and resolve every region again, back to front.
    ///
    /// Returns the number of parent links that changed.
    pub fn rebuild_hierarchy(&mut self) -> usize {
        let order: Vec<RegionId> = self.stacking.iter_back_to_front().collect();
        let view = View {
            slots: &self.slots,
            index: &self.index,
        };
        let changes = self.containment.rebuild(order, &view, &self.stacking);
        let count = changes.len();
        self.push_changes(changes);
        self.events.flush();
        count
    }

    // --- forbidden zones ---

    /// Add a forbidden zone. Existing regions are not moved; the zone applies from the next
    /// move or resize.
    pub fn add_forbidden_zone(&mut self, zone: Rect) -> Result<(), EngineError> {
        self.zones.add_zone(zone)
    }

    /// Remove a forbidden zone. Returns `false` if no such zone exists.
    pub fn remove_forbidden_zone(&mut self, zone: Rect) -> bool {
        self.zones.remove_zone(zone)
    }

    /// The zone store.
    pub fn zones(&self) -> &ForbiddenZones {
        &self.zones
    }

    // --- queries ---

    /// Configuration the manager was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns `true` if `id` refers to a registered region.
    pub fn is_alive(&self, id: RegionId) -> bool {
        self.region(id).is_some()
    }

    /// A registered region, or `None` for unknown or stale ids.
    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.slots
            .get(id.idx())
            .and_then(|s| s.as_ref())
            .filter(|r| r.generation == id.1)
    }

    /// Every registered region, in registration order.
    pub fn get_all_regions(&self) -> impl Iterator<Item = (RegionId, &Region)> + '_ {
        self.order
            .iter()
            .filter_map(|id| self.region(*id).map(|r| (*id, r)))
    }

    /// Registered regions that are not minimized, in registration order.
    pub fn get_active_regions(&self) -> impl Iterator<Item = (RegionId, &Region)> + '_ {
        self.get_all_regions().filter(|(_, r)| !r.minimized)
    }

    /// Number of registered regions.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no region is registered.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Resolved parent of a region.
    pub fn parent_of(&self, id: RegionId) -> Option<RegionId> {
        self.containment.parent_of(id)
    }

    /// Resolved children of a region.
    pub fn children_of(&self, id: RegionId) -> &[RegionId] {
        self.containment.children_of(id)
    }

    /// The containment forest.
    pub fn containment(&self) -> &Containment {
        &self.containment
    }

    /// The stacking registry.
    pub fn stacking(&self) -> &StackingRegistry {
        &self.stacking
    }

    /// Frontmost active region containing `point`, optionally ignoring one region
    /// (typically the one being dragged).
    pub fn topmost_at(&self, point: Point, exclude: Option<RegionId>) -> Option<RegionId> {
        let hits = self
            .index
            .query_point(point)
            .into_iter()
            .filter(|id| Some(*id) != exclude)
            .filter_map(|id| self.region(id).map(|r| (id, r.bounds)));
        collision::topmost_at(point, hits, &self.stacking)
    }

    /// Damage accumulated since the last call.
    pub fn take_damage(&mut self) -> Damage {
        core::mem::take(&mut self.damage)
    }

    // --- events ---

    /// Subscribe to change notifications.
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&RegionEvent) -> Result<(), ListenerError> + Send + 'static,
    {
        self.events.subscribe(listener)
    }

    /// Remove a subscription. Returns `false` if it did not exist.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    // --- per-frame update ---

    /// Attach (or replace) the per-frame behavior of a region.
    pub fn attach_behavior(
        &mut self,
        id: RegionId,
        behavior: Arc<dyn RegionBehavior>,
    ) -> Result<(), EngineError> {
        if !self.is_alive(id) {
            return Err(EngineError::NotFound(id));
        }
        self.behaviors.insert(id, behavior);
        Ok(())
    }

    /// Remove a region's behavior. Returns `false` if it had none.
    pub fn detach_behavior(&mut self, id: RegionId) -> bool {
        self.behaviors.remove(&id).is_some()
    }

    /// Run one frame: fan out every region's behavior, wait for all of them, then apply the
    /// mutations they requested.
    ///
    /// Behaviors run concurrently against a snapshot; this call returns only once the frame
    /// has settled. Mutations are applied in registration order of the requesting region.
    /// A mutation whose requester or target was unregistered earlier in the frame is skipped.
    pub fn update_frame(&mut self, dt: f64) -> FrameReport {
        self.frame += 1;
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        let jobs: Vec<Job> = self
            .order
            .iter()
            .filter_map(|id| {
                let behavior = self.behaviors.get(id)?;
                let region = self.region(*id)?;
                Some(Job {
                    region: *id,
                    bounds: region.bounds,
                    tier: region.tier,
                    behavior: behavior.clone(),
                })
            })
            .collect();

        let gateway = MutationGateway::default();
        let failures = frame::fan_out(
            &jobs,
            dt,
            self.frame,
            self.config.worker_threads,
            &gateway,
        );

        let mut report = FrameReport {
            frame: self.frame,
            updated: jobs.len(),
            failures,
            ..FrameReport::default()
        };
        for m in gateway.into_ordered() {
            if !self.is_alive(m.source) || !self.is_alive(m.target) {
                tracing::debug!(source = ?m.source, target = ?m.target, "dropping mutation for unregistered region");
                report.skipped += 1;
                continue;
            }
            let result = match m.kind {
                MutationKind::MoveTo(r) => self.move_region(m.target, r).map(drop),
                MutationKind::Resize(s) => self.resize_region(m.target, s).map(drop),
                MutationKind::SetMinimized(v) => self.set_minimized(m.target, v).map(drop),
                MutationKind::BringToFront => self.bring_to_front(m.target).map(drop),
                MutationKind::SendToBack => self.send_to_back(m.target).map(drop),
                MutationKind::Unregister => self.unregister_region(m.target),
            };
            match result {
                Ok(()) => report.applied += 1,
                Err(err) => {
                    tracing::warn!(source = ?m.source, target = ?m.target, %err, "frame mutation rejected");
                    report.skipped += 1;
                }
            }
        }
        report
    }

    // --- crate-internal helpers ---

    /// Bounds of the `candidates` that can block `id`, in the order given.
    fn obstacle_bounds(&self, id: RegionId, current: Rect, candidates: &[RegionId]) -> Vec<Rect> {
        if candidates.is_empty() {
            return Vec::new();
        }
        let descendants = self.containment.descendants(id);
        candidates
            .iter()
            .filter(|other| {
                **other != id
                    && !self.containment.is_ancestor(**other, id)
                    && !descendants.contains(*other)
            })
            .filter_map(|other| self.region(*other).filter(|r| !r.minimized))
            .map(|r| r.bounds)
            .filter(|b| !geometry::contains_rect(*b, current))
            .collect()
    }

    /// Active regions whose bounds touch `rect` (edges inclusive).
    pub(crate) fn regions_overlapping(&self, rect: Rect) -> Vec<RegionId> {
        let mut hits = self.index.query_rect(rect);
        hits.retain(|id| self.is_active(*id));
        hits
    }

    fn resolver(&self) -> CollisionResolver<'_> {
        CollisionResolver::new(&self.zones)
    }

    fn is_active(&self, id: RegionId) -> bool {
        self.region(id).is_some_and(|r| !r.minimized)
    }

    fn region_mut(&mut self, id: RegionId) -> Option<&mut Region> {
        self.slots
            .get_mut(id.idx())
            .and_then(|s| s.as_mut())
            .filter(|r| r.generation == id.1)
    }

    fn bounds_or_not_found(&self, id: RegionId) -> Result<Rect, EngineError> {
        self.region(id).map(|r| r.bounds).ok_or_else(|| {
            tracing::debug!(region = ?id, "operation on unregistered region");
            EngineError::NotFound(id)
        })
    }

    fn take_region(&mut self, id: RegionId) -> Result<Region, EngineError> {
        if !self.is_alive(id) {
            tracing::debug!(region = ?id, "unregister of unknown region ignored");
            return Err(EngineError::NotFound(id));
        }
        self.slots[id.idx()].take().ok_or(EngineError::NotFound(id))
    }

    fn commit_index(&mut self) {
        let damage = self.index.commit();
        self.damage.extend(damage);
    }

    /// Re-derive containment around `id` and queue the resulting events.
    fn refresh(&mut self, id: RegionId) {
        let view = View {
            slots: &self.slots,
            index: &self.index,
        };
        let changes = self
            .containment
            .update_hierarchy(id, &view, &self.stacking);
        self.push_changes(changes);
    }

    fn push_changes(&mut self, changes: Vec<ParentChange>) {
        for c in changes {
            self.events.push(RegionEvent::ParentChanged {
                region: c.region,
                old: c.old,
                new: c.new,
            });
        }
    }
}

/// Borrowed view of region storage handed to the containment resolver.
struct View<'a, B: Backend> {
    slots: &'a [Option<Region>],
    index: &'a SpatialIndex<RegionId, B>,
}

impl<B: Backend> View<'_, B> {
    fn get(&self, id: RegionId) -> Option<&Region> {
        self.slots
            .get(id.idx())
            .and_then(|s| s.as_ref())
            .filter(|r| r.generation == id.1)
    }
}

impl<B: Backend> RegionLookup for View<'_, B> {
    fn bounds_of(&self, id: RegionId) -> Option<Rect> {
        self.get(id).map(|r| r.bounds)
    }

    fn is_active(&self, id: RegionId) -> bool {
        self.get(id).is_some_and(|r| !r.minimized)
    }

    fn overlapping(&self, rect: Rect) -> Vec<RegionId> {
        let mut hits = self.index.query_rect(rect);
        hits.retain(|id| self.is_active(*id));
        hits
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::region::Tier;

    fn manager() -> RegionManager {
        RegionManager::new(EngineConfig {
            min_region_size: Size::new(10.0, 10.0),
            ..EngineConfig::default()
        })
    }

    fn add(m: &mut RegionManager, rect: Rect, tier: Tier) -> RegionId {
        m.register_region(RegionDesc::new(rect, tier)).unwrap()
    }

    #[test]
    fn registration_resolves_parent() {
        let mut m = manager();
        let window = add(&mut m, Rect::new(0.0, 0.0, 200.0, 200.0), Tier::Surface);
        let button = add(&mut m, Rect::new(10.0, 10.0, 50.0, 30.0), Tier::Control);
        assert_eq!(m.parent_of(button), Some(window));
        assert_eq!(m.children_of(window), &[button]);

        // A container registered later scoops up what it encloses.
        let panel = add(&mut m, Rect::new(5.0, 5.0, 100.0, 100.0), Tier::Surface);
        assert_eq!(m.parent_of(button), Some(panel));
        assert_eq!(m.parent_of(panel), Some(window));
    }

    #[test]
    fn invalid_bounds_are_rejected_without_change() {
        let mut m = manager();
        let bad = Rect::new(0.0, 0.0, 0.0, 10.0);
        assert_eq!(
            m.register_region(RegionDesc::new(bad, Tier::Surface)),
            Err(EngineError::InvalidGeometry(bad))
        );
        assert!(m.is_empty());
        let id = add(&mut m, Rect::new(0.0, 0.0, 10.0, 10.0), Tier::Surface);
        assert!(m.move_region(id, bad).is_err());
        assert_eq!(m.region(id).unwrap().bounds(), Rect::new(0.0, 0.0, 10.0, 10.0));
        assert_eq!(
            m.resize_region(id, Size::new(-1.0, 5.0)),
            Err(EngineError::InvalidSize(Size::new(-1.0, 5.0)))
        );
    }

    #[test]
    fn stale_ids_are_not_found() {
        let mut m = manager();
        let a = add(&mut m, Rect::new(0.0, 0.0, 10.0, 10.0), Tier::Surface);
        m.unregister_region(a).unwrap();
        let b = add(&mut m, Rect::new(0.0, 0.0, 10.0, 10.0), Tier::Surface);
        assert_eq!(a.index(), b.index(), "slot is reused");
        assert!(!m.is_alive(a));
        assert_eq!(m.unregister_region(a), Err(EngineError::NotFound(a)));
        assert_eq!(
            m.move_region(a, Rect::new(1.0, 1.0, 2.0, 2.0)),
            Err(EngineError::NotFound(a))
        );
        assert!(m.is_alive(b));
    }

    #[test]
    fn moves_are_clamped_by_supplied_obstacles_only() {
        let mut m = manager();
        let mover = add(&mut m, Rect::new(0.0, 0.0, 50.0, 50.0), Tier::Surface);
        let wall = add(&mut m, Rect::new(100.0, 0.0, 150.0, 50.0), Tier::Surface);
        let out = m
            .move_region_against(mover, Rect::new(90.0, 0.0, 140.0, 50.0), &[wall])
            .unwrap();
        assert_eq!(out, Rect::new(50.0, 0.0, 100.0, 50.0));

        // Capability bits play no part; a plain move ignores the wall.
        let out = m
            .move_region(mover, Rect::new(90.0, 0.0, 140.0, 50.0))
            .unwrap();
        assert_eq!(out.x0, 90.0);

        m.move_region(mover, Rect::new(0.0, 0.0, 50.0, 50.0)).unwrap();
        m.set_minimized(wall, true).unwrap();
        let out = m
            .move_region_against(mover, Rect::new(90.0, 0.0, 140.0, 50.0), &[wall])
            .unwrap();
        assert_eq!(out.x0, 90.0, "minimized regions do not collide");
    }

    #[test]
    fn enclosing_and_related_obstacles_are_ignored() {
        let mut m = manager();
        let window = add(&mut m, Rect::new(0.0, 0.0, 400.0, 400.0), Tier::Surface);
        let panel = add(&mut m, Rect::new(10.0, 10.0, 110.0, 110.0), Tier::Surface);
        let button = add(&mut m, Rect::new(20.0, 20.0, 40.0, 40.0), Tier::Control);
        assert_eq!(m.parent_of(panel), Some(window));
        assert_eq!(m.parent_of(button), Some(panel));

        let out = m
            .move_region_against(
                panel,
                Rect::new(60.0, 10.0, 160.0, 110.0),
                &[window, button, panel],
            )
            .unwrap();
        assert_eq!(out, Rect::new(60.0, 10.0, 160.0, 110.0));
    }

    #[test]
    fn resize_stops_at_supplied_obstacle() {
        let mut m = manager();
        let id = add(&mut m, Rect::new(0.0, 0.0, 50.0, 50.0), Tier::Surface);
        let wall = add(&mut m, Rect::new(80.0, 0.0, 100.0, 50.0), Tier::Surface);
        let out = m
            .resize_region_against(id, Size::new(200.0, 50.0), &[wall])
            .unwrap();
        assert_eq!(out, Rect::new(0.0, 0.0, 80.0, 50.0));
    }

    #[test]
    fn resize_stops_at_zone_and_floors() {
        let mut m = manager();
        m.add_forbidden_zone(Rect::new(100.0, 0.0, 120.0, 200.0))
            .unwrap();
        let id = add(&mut m, Rect::new(0.0, 0.0, 50.0, 50.0), Tier::Surface);
        let out = m.resize_region(id, Size::new(300.0, 60.0)).unwrap();
        assert_eq!(out, Rect::new(0.0, 0.0, 100.0, 60.0));
        let out = m.resize_region(id, Size::new(2.0, 2.0)).unwrap();
        assert_eq!(out.size(), Size::new(10.0, 10.0));
    }

    #[test]
    fn external_bounds_take_the_clamp_path() {
        let mut m = manager();
        m.add_forbidden_zone(Rect::new(100.0, 0.0, 120.0, 200.0))
            .unwrap();
        let id = add(&mut m, Rect::new(0.0, 0.0, 50.0, 50.0), Tier::Surface);
        let out = m
            .apply_external_bounds(id, Rect::new(80.0, 0.0, 130.0, 50.0))
            .unwrap();
        assert_eq!(out, Rect::new(50.0, 0.0, 100.0, 50.0));
        assert!(!m.zones().intersects_any(out));
    }

    #[test]
    fn minimizing_detaches_and_restoring_reattaches() {
        let mut m = manager();
        let window = add(&mut m, Rect::new(0.0, 0.0, 200.0, 200.0), Tier::Surface);
        let button = add(&mut m, Rect::new(10.0, 10.0, 50.0, 30.0), Tier::Control);
        assert!(m.set_minimized(window, true).unwrap());
        assert!(!m.set_minimized(window, true).unwrap());
        assert_eq!(m.parent_of(button), None);
        assert_eq!(m.get_active_regions().count(), 1);
        assert_eq!(m.get_all_regions().count(), 2);
        assert_eq!(m.topmost_at(Point::new(100.0, 100.0), None), None);

        m.set_minimized(window, false).unwrap();
        assert_eq!(m.parent_of(button), Some(window));
    }

    #[test]
    fn restacking_changes_parent_tie_break() {
        let mut m = manager();
        let a = add(&mut m, Rect::new(0.0, 0.0, 200.0, 200.0), Tier::Surface);
        let b = add(&mut m, Rect::new(0.0, 0.0, 200.0, 200.0), Tier::Surface);
        let item = add(&mut m, Rect::new(10.0, 10.0, 20.0, 20.0), Tier::Control);
        assert_eq!(m.parent_of(item), Some(b));
        assert_eq!(m.parent_of(a), Some(b));

        assert!(m.bring_to_front(a).unwrap());
        assert_eq!(m.parent_of(b), Some(a));
        assert_eq!(m.parent_of(a), None);
        assert_eq!(m.parent_of(item), Some(a));
        assert_eq!(m.topmost_at(Point::new(15.0, 15.0), None), Some(item));
        assert_eq!(m.topmost_at(Point::new(15.0, 15.0), Some(item)), Some(a));
    }

    #[test]
    fn sync_failures_leave_order_intact() {
        struct Failing;
        impl StackingSink for Failing {
            fn apply_order(&mut self, _: &[RegionId]) -> Result<(), SyncError> {
                Err(SyncError("window server gone".into()))
            }
        }
        struct Recording(Vec<RegionId>);
        impl StackingSink for Recording {
            fn apply_order(&mut self, order: &[RegionId]) -> Result<(), SyncError> {
                self.0 = order.to_vec();
                Ok(())
            }
        }

        let mut m = manager();
        let a = add(&mut m, Rect::new(0.0, 0.0, 10.0, 10.0), Tier::Overlay);
        let b = add(&mut m, Rect::new(0.0, 0.0, 10.0, 10.0), Tier::Background);
        let c = add(&mut m, Rect::new(50.0, 0.0, 60.0, 10.0), Tier::Background);
        m.set_minimized(c, true).unwrap();
        assert!(m.update_all_orders(&mut Failing).is_err());
        let mut rec = Recording(Vec::new());
        m.update_all_orders(&mut rec).unwrap();
        assert_eq!(rec.0, vec![b, a]);
    }

    #[test]
    fn damage_accumulates_until_taken() {
        let mut m = manager();
        let id = add(&mut m, Rect::new(0.0, 0.0, 10.0, 10.0), Tier::Surface);
        m.move_region(id, Rect::new(20.0, 0.0, 30.0, 10.0)).unwrap();
        let damage = m.take_damage();
        assert_eq!(damage.added, vec![Rect::new(0.0, 0.0, 10.0, 10.0)]);
        assert_eq!(
            damage.moved,
            vec![(Rect::new(0.0, 0.0, 10.0, 10.0), Rect::new(20.0, 0.0, 30.0, 10.0))]
        );
        assert!(m.take_damage().is_empty());
    }

    #[test]
    fn events_follow_hierarchy_then_stacking() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut m = manager();
        let sink = log.clone();
        m.subscribe(move |e| {
            sink.lock().unwrap().push(*e);
            Ok(())
        });
        let back = add(&mut m, Rect::new(0.0, 0.0, 100.0, 100.0), Tier::Surface);
        let front = add(&mut m, Rect::new(0.0, 0.0, 100.0, 100.0), Tier::Surface);
        log.lock().unwrap().clear();

        m.bring_to_front(back).unwrap();
        let seen = log.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                RegionEvent::ParentChanged {
                    region: back,
                    old: Some(front),
                    new: None
                },
                RegionEvent::ParentChanged {
                    region: front,
                    old: None,
                    new: Some(back)
                },
                RegionEvent::StackingChanged {
                    region: back,
                    tier: Tier::Surface
                },
            ]
        );
    }
}
