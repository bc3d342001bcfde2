// Copyright 2025 the Nestbox Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Stacking registry: tiered z-order over registered regions.
//!
//! Each [`Tier`] holds its regions in one sequence, back to front. A region's z-index is its
//! position in that sequence, so z-indices within a tier are always unique and dense.
//! [`StackingRegistry::bring_to_front`] moves a region to the end of its tier and
//! [`StackingRegistry::send_to_back`] to the start. Tiers never mix: every region in a later
//! tier is in front of every region in an earlier one.
//!
//! The registry only produces the abstract order. Pushing it to a native window stack is
//! the job of a [`StackingSink`], driven by
//! [`RegionManager::update_all_orders`](crate::RegionManager::update_all_orders).

use core::cmp::Ordering;

use hashbrown::HashMap;

use crate::error::SyncError;
use crate::region::{RegionId, Tier};

/// Receiver of the resolved stacking order, typically a native window layer.
pub trait StackingSink {
    /// Apply the full order, back to front.
    fn apply_order(&mut self, back_to_front: &[RegionId]) -> Result<(), SyncError>;
}

/// Tiered z-order registry.
#[derive(Clone, Debug, Default)]
pub struct StackingRegistry {
    tiers: [Vec<RegionId>; Tier::COUNT],
    tier_of: HashMap<RegionId, Tier>,
}

impl StackingRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` in `tier`, in front of every current peer.
    ///
    /// Returns `false` (and changes nothing) if `id` is already registered.
    pub fn register(&mut self, id: RegionId, tier: Tier) -> bool {
        if self.tier_of.contains_key(&id) {
            return false;
        }
        self.tier_of.insert(id, tier);
        self.tiers[tier.index()].push(id);
        true
    }

    /// Remove `id`. Returns `false` if it was not registered.
    pub fn unregister(&mut self, id: RegionId) -> bool {
        let Some(tier) = self.tier_of.remove(&id) else {
            return false;
        };
        self.tiers[tier.index()].retain(|r| *r != id);
        true
    }

    /// Move `id` in front of all its tier peers. Returns `true` if the order changed.
    pub fn bring_to_front(&mut self, id: RegionId) -> bool {
        let Some((tier, pos)) = self.locate(id) else {
            return false;
        };
        let seq = &mut self.tiers[tier.index()];
        if pos + 1 == seq.len() {
            return false;
        }
        seq.remove(pos);
        seq.push(id);
        true
    }

    /// Move `id` behind all its tier peers. Returns `true` if the order changed.
    pub fn send_to_back(&mut self, id: RegionId) -> bool {
        let Some((tier, pos)) = self.locate(id) else {
            return false;
        };
        if pos == 0 {
            return false;
        }
        let seq = &mut self.tiers[tier.index()];
        seq.remove(pos);
        seq.insert(0, id);
        true
    }

    /// Order `a` relative to `b`: [`Ordering::Greater`] means `a` is more in front.
    ///
    /// Returns `None` if either region is unknown.
    pub fn compare(&self, a: RegionId, b: RegionId) -> Option<Ordering> {
        let (ta, pa) = self.locate(a)?;
        let (tb, pb) = self.locate(b)?;
        Some(ta.cmp(&tb).then(pa.cmp(&pb)))
    }

    /// Whether `a` is strictly in front of `b`. Unknown regions are never in front.
    pub fn is_in_front(&self, a: RegionId, b: RegionId) -> bool {
        self.compare(a, b) == Some(Ordering::Greater)
    }

    /// The frontmost registered region among `ids`.
    pub fn frontmost<I: IntoIterator<Item = RegionId>>(&self, ids: I) -> Option<RegionId> {
        ids.into_iter()
            .filter_map(|id| self.locate(id).map(|(tier, pos)| ((tier, pos), id)))
            .max_by_key(|(key, _)| *key)
            .map(|(_, id)| id)
    }

    /// Regions of `tier`, back to front.
    pub fn regions_in_tier(&self, tier: Tier) -> &[RegionId] {
        &self.tiers[tier.index()]
    }

    /// Tier of `id`, if registered.
    pub fn tier_of(&self, id: RegionId) -> Option<Tier> {
        self.tier_of.get(&id).copied()
    }

    /// Position of `id` within its tier (0 is furthest back).
    pub fn z_index(&self, id: RegionId) -> Option<usize> {
        self.locate(id).map(|(_, pos)| pos)
    }

    /// Every registered region, back to front.
    pub fn iter_back_to_front(&self) -> impl DoubleEndedIterator<Item = RegionId> + '_ {
        self.tiers.iter().flat_map(|seq| seq.iter().copied())
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: RegionId) -> bool {
        self.tier_of.contains_key(&id)
    }

    /// Number of registered regions.
    pub fn len(&self) -> usize {
        self.tier_of.len()
    }

    /// Whether no region is registered.
    pub fn is_empty(&self) -> bool {
        self.tier_of.is_empty()
    }

    fn locate(&self, id: RegionId) -> Option<(Tier, usize)> {
        let tier = *self.tier_of.get(&id)?;
        let pos = self.tiers[tier.index()].iter().position(|r| *r == id)?;
        Some((tier, pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> RegionId {
        RegionId::new(n, 1)
    }

    #[test]
    fn tiers_dominate_insertion_order() {
        let mut reg = StackingRegistry::new();
        reg.register(id(0), Tier::Overlay);
        reg.register(id(1), Tier::Background);
        reg.register(id(2), Tier::Background);
        assert_eq!(reg.compare(id(0), id(2)), Some(Ordering::Greater));
        assert_eq!(reg.compare(id(1), id(2)), Some(Ordering::Less));
        assert_eq!(reg.compare(id(2), id(2)), Some(Ordering::Equal));
        let order: Vec<_> = reg.iter_back_to_front().collect();
        assert_eq!(order, vec![id(1), id(2), id(0)]);
    }

    #[test]
    fn bring_to_front_and_send_to_back_stay_in_tier() {
        let mut reg = StackingRegistry::new();
        for n in 0..3 {
            reg.register(id(n), Tier::Surface);
        }
        reg.register(id(9), Tier::Control);

        assert!(reg.bring_to_front(id(0)));
        assert_eq!(reg.regions_in_tier(Tier::Surface), &[id(1), id(2), id(0)]);
        assert!(!reg.bring_to_front(id(0)), "already frontmost");
        assert!(reg.is_in_front(id(9), id(0)), "tier still wins");

        assert!(reg.send_to_back(id(0)));
        assert_eq!(reg.z_index(id(0)), Some(0));
        assert!(!reg.send_to_back(id(0)));
    }

    #[test]
    fn unknown_regions_are_not_ordered() {
        let mut reg = StackingRegistry::new();
        reg.register(id(0), Tier::Surface);
        assert_eq!(reg.compare(id(0), id(5)), None);
        assert!(!reg.bring_to_front(id(5)));
        assert!(!reg.register(id(0), Tier::Control), "double registration");
        assert_eq!(reg.tier_of(id(0)), Some(Tier::Surface));
        assert!(reg.unregister(id(0)));
        assert!(!reg.unregister(id(0)));
        assert!(reg.is_empty());
    }

    #[test]
    fn frontmost_picks_highest() {
        let mut reg = StackingRegistry::new();
        reg.register(id(0), Tier::Surface);
        reg.register(id(1), Tier::Surface);
        reg.register(id(2), Tier::Background);
        assert_eq!(reg.frontmost([id(2), id(0), id(1)]), Some(id(1)));
        reg.bring_to_front(id(0));
        assert_eq!(reg.frontmost([id(2), id(0), id(1)]), Some(id(0)));
        assert_eq!(reg.frontmost([id(7)]), None);
    }
}
