// Copyright 2025 the Nestbox Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Engine and physics configuration.
//!
//! Plain data with sensible defaults. With the `serde` feature enabled every type here can
//! be loaded from whatever settings store the host uses.

use kurbo::{Rect, Size};

/// Margins removed from a region's bounds to get its usable interior.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Insets {
    /// Left border.
    pub left: f64,
    /// Title bar plus top border.
    pub top: f64,
    /// Right border.
    pub right: f64,
    /// Bottom border.
    pub bottom: f64,
}

impl Insets {
    /// Equal margins on every side.
    pub const fn uniform(v: f64) -> Self {
        Self {
            left: v,
            top: v,
            right: v,
            bottom: v,
        }
    }

    /// Shrink `rect` by these margins. Collapses to a zero-area rect rather than inverting.
    pub fn apply(&self, rect: Rect) -> Rect {
        let x0 = rect.x0 + self.left;
        let y0 = rect.y0 + self.top;
        let x1 = (rect.x1 - self.right).max(x0);
        let y1 = (rect.y1 - self.bottom).max(y0);
        Rect::new(x0, y0, x1, y1)
    }
}

/// Configuration for the region manager and its services.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineConfig {
    /// Lower bound for every region size produced by a resize.
    pub min_region_size: Size,
    /// Outer boundary of the level. Acts as the enclosing area of root regions and as the
    /// last-resort floor for the avatar.
    pub play_area: Rect,
    /// Cell size used when the manager is built with the grid spatial backend.
    pub spatial_cell_size: f64,
    /// Upper bound on worker threads used to fan out per-region behaviors each frame.
    pub worker_threads: usize,
    /// Non-usable border of a region (title bar, frame) when it encloses the avatar.
    pub content_insets: Insets,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_region_size: Size::new(32.0, 32.0),
            play_area: Rect::new(0.0, 0.0, 1920.0, 1080.0),
            spatial_cell_size: 128.0,
            worker_threads: 4,
            content_insets: Insets {
                left: 4.0,
                top: 28.0,
                right: 4.0,
                bottom: 4.0,
            },
        }
    }
}

/// Tuning for the avatar's motion, in world units per second (squared for gravity).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhysicsConfig {
    /// Downward acceleration.
    pub gravity: f64,
    /// Initial upward speed of a jump.
    pub jump_speed: f64,
    /// Horizontal speed at full input.
    pub move_speed: f64,
    /// Terminal falling speed.
    pub max_fall_speed: f64,
    /// Maximum distance between the avatar's feet and a floor for it to count as grounded.
    pub ground_tolerance: f64,
    /// Height of the probe rectangle below the avatar's feet.
    pub foot_probe_height: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: 1800.0,
            jump_speed: 720.0,
            move_speed: 240.0,
            max_fall_speed: 1200.0,
            ground_tolerance: 5.0,
            foot_probe_height: 2.0,
        }
    }
}
