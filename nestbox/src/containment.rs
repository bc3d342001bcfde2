// Copyright 2025 the Nestbox Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Containment resolver: the derived parent/children forest.
//!
//! The hierarchy is a cache of what [`Containment::resolve`] computes, never an authority.
//! It is stored as two maps keyed by [`RegionId`] (child → parent, parent → children), so
//! there are no owning links between regions and nothing to leak on removal.
//!
//! ## Resolution rule
//!
//! A region's parent is the frontmost active region whose bounds fully contain it, excluding
//! the region's own descendants. Equal bounds count as containing, but of two regions with
//! identical bounds only the one in front can be the other's parent. Ties cannot happen
//! because stacking order is total.
//!
//! The region being resolved is treated as detached: its current parent is the thing being
//! decided, so only descendants (which would close a cycle) are excluded. Before any link is
//! made, the candidate's ancestor chain is walked again; this catches anything the up-front
//! filter missed.
//!
//! ## Incremental maintenance
//!
//! [`Containment::update_hierarchy`] re-derives everything a single region can influence:
//! its current children (which may no longer fit, or may now prefer another container), its
//! own parent, and any region it now encloses that is unattached or attached to a container
//! behind it. The last pass is what lets a moved region scoop up regions it newly encloses.

use hashbrown::{HashMap, HashSet};
use kurbo::Rect;
use smallvec::SmallVec;

use crate::error::EngineError;
use crate::geometry;
use crate::region::RegionId;
use crate::stacking::StackingRegistry;

/// Read access to region geometry needed by the resolver.
pub trait RegionLookup {
    /// Bounds of a registered region.
    fn bounds_of(&self, id: RegionId) -> Option<Rect>;

    /// Whether `id` is registered and not minimized.
    fn is_active(&self, id: RegionId) -> bool;

    /// Active regions whose bounds touch `rect`. A superset of both the containers of `rect`
    /// and the regions inside it.
    fn overlapping(&self, rect: Rect) -> Vec<RegionId>;
}

/// A parent link that changed during resolution.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ParentChange {
    /// Region whose parent changed.
    pub region: RegionId,
    /// Previous parent.
    pub old: Option<RegionId>,
    /// New parent.
    pub new: Option<RegionId>,
}

/// Links cut by [`Containment::remove_from_hierarchy`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Detached {
    /// Parent the removed region had.
    pub parent: Option<RegionId>,
    /// Children it had; each is now a root awaiting re-resolution.
    pub children: Vec<RegionId>,
}

type Children = SmallVec<[RegionId; 4]>;

/// Derived containment forest.
#[derive(Clone, Debug, Default)]
pub struct Containment {
    parent: HashMap<RegionId, RegionId>,
    children: HashMap<RegionId, Children>,
}

impl Containment {
    /// Create an empty forest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parent of `id`, or `None` for roots and unknown ids.
    pub fn parent_of(&self, id: RegionId) -> Option<RegionId> {
        self.parent.get(&id).copied()
    }

    /// Children of `id` in link order.
    pub fn children_of(&self, id: RegionId) -> &[RegionId] {
        self.children.get(&id).map_or(&[], |c| c.as_slice())
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: RegionId) -> Ancestors<'_> {
        Ancestors {
            containment: self,
            next: self.parent_of(id),
        }
    }

    /// All descendants of `id`, depth-first.
    pub fn descendants(&self, id: RegionId) -> Vec<RegionId> {
        let mut out = Vec::new();
        let mut stack: Vec<RegionId> = self.children_of(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children_of(next).iter().rev().copied());
        }
        out
    }

    /// Whether `ancestor` appears on the parent chain of `id`.
    pub fn is_ancestor(&self, ancestor: RegionId, id: RegionId) -> bool {
        self.ancestors(id).any(|a| a == ancestor)
    }

    /// Pick the parent for `region` among `candidates`.
    ///
    /// Returns `None` when no active candidate fully contains `region`, which makes it a
    /// root. Minimized candidates, `region` itself, and its descendants are never chosen.
    pub fn resolve<L, I>(
        &self,
        region: RegionId,
        candidates: I,
        lookup: &L,
        stacking: &StackingRegistry,
    ) -> Option<RegionId>
    where
        L: RegionLookup + ?Sized,
        I: IntoIterator<Item = RegionId>,
    {
        let bounds = lookup.bounds_of(region)?;
        let mut own_group: HashSet<RegionId> = self.descendants(region).into_iter().collect();
        own_group.insert(region);

        let mut best: Option<RegionId> = None;
        for candidate in candidates {
            if own_group.contains(&candidate) || !lookup.is_active(candidate) {
                continue;
            }
            let Some(cb) = lookup.bounds_of(candidate) else {
                continue;
            };
            if !geometry::contains_rect(cb, bounds) {
                continue;
            }
            // Identical bounds contain each other; only the one in front may be the parent.
            if cb == bounds && !stacking.is_in_front(candidate, region) {
                continue;
            }
            if candidate == region || self.is_ancestor(region, candidate) {
                tracing::debug!(?region, ?candidate, "containment candidate would form a cycle");
                continue;
            }
            match best {
                Some(b) if !stacking.is_in_front(candidate, b) => {}
                _ => best = Some(candidate),
            }
        }
        best
    }

    /// Link `child` under `parent` (or make it a root).
    ///
    /// Returns `Ok(true)` if the link changed. A link that would make `child` its own
    /// ancestor is rejected with [`EngineError::CycleRejected`] and the old parent is kept.
    pub fn set_parent(
        &mut self,
        child: RegionId,
        parent: Option<RegionId>,
    ) -> Result<bool, EngineError> {
        let old = self.parent_of(child);
        if old == parent {
            return Ok(false);
        }
        if let Some(p) = parent
            && (p == child || self.is_ancestor(child, p))
        {
            return Err(EngineError::CycleRejected { child, parent: p });
        }
        if let Some(o) = old {
            self.unlink(child, o);
        }
        if let Some(p) = parent {
            self.parent.insert(child, p);
            self.children.entry(p).or_default().push(child);
        }
        Ok(true)
    }

    /// Resolve `region` against `lookup` and apply the result, then re-derive every link the
    /// region can influence. Returns each change in the order it was made.
    pub fn update_hierarchy<L: RegionLookup + ?Sized>(
        &mut self,
        region: RegionId,
        lookup: &L,
        stacking: &StackingRegistry,
    ) -> Vec<ParentChange> {
        let mut changes = Vec::new();

        let Some(bounds) = lookup
            .bounds_of(region)
            .filter(|_| lookup.is_active(region))
        else {
            // Gone or minimized: it may be neither a parent nor a child.
            let detached = self.remove_from_hierarchy(region);
            if detached.parent.is_some() {
                changes.push(ParentChange {
                    region,
                    old: detached.parent,
                    new: None,
                });
            }
            for child in detached.children {
                changes.push(ParentChange {
                    region: child,
                    old: Some(region),
                    new: None,
                });
                self.reresolve(child, lookup, stacking, &mut changes);
            }
            return changes;
        };

        let nearby = lookup.overlapping(bounds);

        // 1. Current children may have left the region or prefer a different container now.
        // This runs first so a former child that now encloses the region is not excluded
        // from its candidates as a descendant.
        for child in self.children_of(region).to_vec() {
            self.reresolve(child, lookup, stacking, &mut changes);
        }

        // 2. The region's own parent.
        let parent = self.resolve(region, nearby.iter().copied(), lookup, stacking);
        self.apply(region, parent, &mut changes);

        // 3. Scoop up regions the region now encloses, back to front for determinism.
        let mut enclosed: Vec<RegionId> = nearby
            .into_iter()
            .filter(|&other| other != region && self.parent_of(other) != Some(region))
            .filter(|&other| {
                lookup
                    .bounds_of(other)
                    .is_some_and(|ob| geometry::contains_rect(bounds, ob))
            })
            .filter(|&other| match self.parent_of(other) {
                None => true,
                Some(p) => stacking.is_in_front(region, p),
            })
            .collect();
        enclosed.sort_by(|a, b| {
            stacking
                .compare(*a, *b)
                .unwrap_or(core::cmp::Ordering::Equal)
        });
        for other in enclosed {
            self.reresolve(other, lookup, stacking, &mut changes);
        }

        changes
    }

    /// Cut every link touching `region`. Former children become roots.
    pub fn remove_from_hierarchy(&mut self, region: RegionId) -> Detached {
        let parent = self.parent.remove(&region);
        if let Some(p) = parent
            && let Some(siblings) = self.children.get_mut(&p)
        {
            siblings.retain(|c| *c != region);
            if siblings.is_empty() {
                self.children.remove(&p);
            }
        }
        let children: Vec<RegionId> = self
            .children
            .remove(&region)
            .map(|c| c.into_vec())
            .unwrap_or_default();
        for child in &children {
            self.parent.remove(child);
        }
        Detached { parent, children }
    }

    /// Forget every link.
    pub fn clear(&mut self) {
        self.parent.clear();
        self.children.clear();
    }

    /// Rebuild the whole forest from scratch, resolving `order` (back to front) in turn.
    pub fn rebuild<L, I>(
        &mut self,
        order: I,
        lookup: &L,
        stacking: &StackingRegistry,
    ) -> Vec<ParentChange>
    where
        L: RegionLookup + ?Sized,
        I: IntoIterator<Item = RegionId>,
    {
        let before = self.parent.clone();
        self.clear();
        let order: Vec<RegionId> = order.into_iter().collect();
        for &region in &order {
            if !lookup.is_active(region) {
                continue;
            }
            let Some(bounds) = lookup.bounds_of(region) else {
                continue;
            };
            let parent = self.resolve(region, lookup.overlapping(bounds), lookup, stacking);
            if let Err(err) = self.set_parent(region, parent) {
                tracing::debug!(%err, "rebuild skipped a cyclic link");
            }
        }
        order
            .into_iter()
            .filter_map(|region| {
                let old = before.get(&region).copied();
                let new = self.parent_of(region);
                (old != new).then_some(ParentChange { region, old, new })
            })
            .collect()
    }

    fn reresolve<L: RegionLookup + ?Sized>(
        &mut self,
        region: RegionId,
        lookup: &L,
        stacking: &StackingRegistry,
        changes: &mut Vec<ParentChange>,
    ) {
        let parent = lookup
            .bounds_of(region)
            .filter(|_| lookup.is_active(region))
            .and_then(|b| self.resolve(region, lookup.overlapping(b), lookup, stacking));
        self.apply(region, parent, changes);
    }

    fn apply(
        &mut self,
        region: RegionId,
        parent: Option<RegionId>,
        changes: &mut Vec<ParentChange>,
    ) {
        let old = self.parent_of(region);
        match self.set_parent(region, parent) {
            Ok(true) => {
                tracing::debug!(?region, ?old, new = ?parent, "reparented");
                changes.push(ParentChange {
                    region,
                    old,
                    new: parent,
                });
            }
            Ok(false) => {}
            Err(err) => tracing::debug!(%err, "keeping existing parent"),
        }
    }

    fn unlink(&mut self, child: RegionId, parent: RegionId) {
        self.parent.remove(&child);
        if let Some(siblings) = self.children.get_mut(&parent) {
            siblings.retain(|c| *c != child);
            if siblings.is_empty() {
                self.children.remove(&parent);
            }
        }
    }
}

/// Iterator over a region's ancestors, nearest first. See [`Containment::ancestors`].
#[derive(Clone, Debug)]
pub struct Ancestors<'a> {
    containment: &'a Containment,
    next: Option<RegionId>,
}

impl Iterator for Ancestors<'_> {
    type Item = RegionId;

    fn next(&mut self) -> Option<RegionId> {
        let current = self.next?;
        self.next = self.containment.parent_of(current);
        Some(current)
    }
}
