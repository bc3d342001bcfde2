// Copyright 2025 the Nestbox Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public region types: identifiers, stacking tiers, capabilities, and per-region data.

use kurbo::Rect;

/// Identifier for a registered region (generational).
///
/// The first field is the slot index and the second the slot's generation. A slot may be
/// reused after its region is unregistered, but the generation is bumped, so a stale id is
/// never mistaken for the region that now occupies the slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub(crate) u32, pub(crate) u32);

impl RegionId {
    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }

    /// Slot index of this id. Useful as a compact key in collaborator-side tables.
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Generation of the slot at the time this id was issued.
    pub const fn generation(self) -> u32 {
        self.1
    }
}

/// Coarse stacking category. Tiers are totally ordered; a region in a later tier is always
/// in front of every region in an earlier tier.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Tier {
    /// Backdrop regions (level background, wallpaper).
    Background,
    /// Ordinary window-like surfaces.
    Surface,
    /// Decorations drawn on top of surfaces.
    SurfaceMark,
    /// Interactive controls (buttons, switches).
    Control,
    /// Goals and pickups.
    Objective,
    /// The player avatar.
    Avatar,
    /// Overlays that sit above everything else.
    Overlay,
}

impl Tier {
    /// Number of tiers.
    pub const COUNT: usize = 7;

    /// All tiers, back to front.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Background,
        Self::Surface,
        Self::SurfaceMark,
        Self::Control,
        Self::Objective,
        Self::Avatar,
        Self::Overlay,
    ];

    /// Position of this tier in [`Tier::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }
}

bitflags::bitflags! {
    /// Capabilities of a region.
    ///
    /// Consulted by external behavior code only. The core never reads these; collision and
    /// containment depend on bounds, tier, stacking order, and the minimized state.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct RegionFlags: u8 {
        /// May be dragged by the player.
        const MOVABLE     = 0b0000_0001;
        /// May be resized by the player.
        const RESIZABLE   = 0b0000_0010;
        /// May be minimized.
        const MINIMIZABLE = 0b0000_0100;
        /// May be closed.
        const DELETABLE   = 0b0000_1000;
    }
}

impl Default for RegionFlags {
    fn default() -> Self {
        Self::MOVABLE | Self::RESIZABLE | Self::MINIMIZABLE | Self::DELETABLE
    }
}

/// Everything needed to register a region.
#[derive(Clone, Debug)]
pub struct RegionDesc {
    /// Initial bounds. Must have positive width and height.
    pub bounds: Rect,
    /// Stacking tier; fixed for the lifetime of the region.
    pub tier: Tier,
    /// Capability set.
    pub flags: RegionFlags,
}

impl Default for RegionDesc {
    fn default() -> Self {
        Self {
            bounds: Rect::ZERO,
            tier: Tier::Surface,
            flags: RegionFlags::default(),
        }
    }
}

impl RegionDesc {
    /// A description with the given bounds and tier and default capabilities.
    pub fn new(bounds: Rect, tier: Tier) -> Self {
        Self {
            bounds,
            tier,
            flags: RegionFlags::default(),
        }
    }

    /// Replace the capability set.
    pub fn with_flags(mut self, flags: RegionFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// A registered region as seen by readers (rendering, gameplay).
///
/// Mutation goes through [`RegionManager`](crate::RegionManager) so clamping and
/// re-resolution can never be bypassed.
#[derive(Clone, Debug)]
pub struct Region {
    pub(crate) generation: u32,
    pub(crate) bounds: Rect,
    pub(crate) tier: Tier,
    pub(crate) flags: RegionFlags,
    pub(crate) minimized: bool,
    pub(crate) index_key: Option<crate::spatial::Key>,
}

impl Region {
    pub(crate) fn new(generation: u32, desc: &RegionDesc) -> Self {
        Self {
            generation,
            bounds: desc.bounds,
            tier: desc.tier,
            flags: desc.flags,
            minimized: false,
            index_key: None,
        }
    }

    /// Current resolved bounds.
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Stacking tier.
    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Capability set.
    pub fn flags(&self) -> RegionFlags {
        self.flags
    }

    /// Whether the region is minimized (excluded from containment and collision).
    pub fn is_minimized(&self) -> bool {
        self.minimized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_are_ordered_back_to_front() {
        for pair in Tier::ALL.windows(2) {
            assert!(pair[0] < pair[1], "{:?} should be behind {:?}", pair[0], pair[1]);
        }
        assert_eq!(Tier::Overlay.index(), Tier::COUNT - 1);
    }

    #[test]
    fn default_flags_grant_every_capability() {
        let desc = RegionDesc::new(Rect::new(0.0, 0.0, 10.0, 10.0), Tier::Control);
        assert_eq!(desc.flags, RegionFlags::all());
        let fixed = desc.with_flags(RegionFlags::empty());
        assert!(fixed.flags.is_empty());
    }
}
