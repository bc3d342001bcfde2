// Copyright 2025 the Nestbox Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Avatar controller: bounded movement, jumping, and grounding.
//!
//! The avatar is an ordinary region in the [`Tier::Avatar`] tier, so it takes part in
//! containment like everything else: its parent is the region that currently encloses it.
//! Each [`AvatarController::step`]:
//!
//! 1. starts a jump if requested while grounded;
//! 2. integrates gravity (grounded forces the vertical velocity to zero);
//! 3. moves by input and velocity in sub-steps no longer than half the avatar's smaller side,
//!    horizontal then vertical, each clamped through the forbidden zones and then the
//!    enclosing region's movable area;
//! 4. probes below the feet for a floor and snaps onto it.
//!
//! Platforms are one-way. While falling, the avatar stops on the top edge of any active region
//! its feet cross from above, unless that region is the avatar itself, one of its ancestors or
//! descendants, or another avatar. Moving up through a region is never blocked.
//!
//! The movable area is the enclosing region's bounds minus
//! [`EngineConfig::content_insets`](crate::EngineConfig::content_insets), minus every
//! forbidden zone. Root avatars use the play area. When a sub-step cannot be confined, the
//! offending axis is dropped and the other axis is kept.

use kurbo::{Rect, Vec2};

use crate::collision::CollisionResolver;
use crate::config::PhysicsConfig;
use crate::error::EngineError;
use crate::geometry;
use crate::manager::RegionManager;
use crate::region::{RegionDesc, RegionFlags, RegionId, Tier};
use crate::spatial::Backend;

/// Sub-steps per step are capped so huge velocities cannot stall a frame.
const MAX_SUBSTEPS: usize = 256;

/// Feet this far below a platform top still count as above it.
const LANDING_EPSILON: f64 = 1e-6;

/// Motion state.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum AvatarState {
    /// Walking or standing; may jump when grounded.
    #[default]
    Normal,
    /// Airborne after a jump, until landing.
    Jumping,
}

/// Input sampled once per frame.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct AvatarInput {
    /// Jump requested this frame.
    pub jump: bool,
    /// Signed horizontal intent in `-1.0..=1.0`.
    pub horizontal: f64,
}

/// Result of one [`AvatarController::step`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StepOutcome {
    /// Bounds after the step.
    pub bounds: Rect,
    /// Whether the avatar ended the step on a floor.
    pub grounded: bool,
    /// Whether this step ended a fall or jump.
    pub landed: bool,
    /// State after the step.
    pub state: AvatarState,
}

/// Drives one avatar region.
#[derive(Clone, Debug)]
pub struct AvatarController {
    region: RegionId,
    physics: PhysicsConfig,
    state: AvatarState,
    vertical_velocity: f64,
    grounded: bool,
    last_valid_parent: Option<RegionId>,
}

impl AvatarController {
    /// Register an avatar region with `bounds` and return its controller.
    pub fn spawn<B: Backend>(
        manager: &mut RegionManager<B>,
        bounds: Rect,
        physics: PhysicsConfig,
    ) -> Result<Self, EngineError> {
        let desc = RegionDesc::new(bounds, Tier::Avatar).with_flags(RegionFlags::MOVABLE);
        let region = manager.register_region(desc)?;
        let mut avatar = Self::new(region, physics);
        avatar.last_valid_parent = manager.parent_of(region);
        Ok(avatar)
    }

    /// Control an already registered region.
    pub fn new(region: RegionId, physics: PhysicsConfig) -> Self {
        Self {
            region,
            physics,
            state: AvatarState::Normal,
            vertical_velocity: 0.0,
            grounded: false,
            last_valid_parent: None,
        }
    }

    /// The avatar's region.
    pub fn region(&self) -> RegionId {
        self.region
    }

    /// Current state.
    pub fn state(&self) -> AvatarState {
        self.state
    }

    /// Vertical velocity; positive is downward.
    pub fn vertical_velocity(&self) -> f64 {
        self.vertical_velocity
    }

    /// Whether the last step ended on a floor.
    pub fn is_grounded(&self) -> bool {
        self.grounded
    }

    /// The most recent enclosing region. Kept while the avatar is momentarily a root.
    pub fn last_valid_parent(&self) -> Option<RegionId> {
        self.last_valid_parent
    }

    /// Physics tuning.
    pub fn physics(&self) -> &PhysicsConfig {
        &self.physics
    }

    /// Override the vertical velocity (springs, knockback). Leaves the ground if nonzero.
    pub fn set_vertical_velocity(&mut self, velocity: f64) {
        self.vertical_velocity = velocity;
        if velocity != 0.0 {
            self.grounded = false;
        }
    }

    /// Force the motion state (scripted launches, respawn).
    pub fn set_state(&mut self, state: AvatarState) {
        self.state = state;
    }

    /// Advance the avatar by `dt` seconds.
    pub fn step<B: Backend>(
        &mut self,
        manager: &mut RegionManager<B>,
        input: AvatarInput,
        dt: f64,
    ) -> Result<StepOutcome, EngineError> {
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        let bounds = manager
            .region(self.region)
            .ok_or(EngineError::NotFound(self.region))?
            .bounds();

        if input.jump && self.grounded && self.state == AvatarState::Normal {
            self.vertical_velocity = -self.physics.jump_speed;
            self.state = AvatarState::Jumping;
            self.grounded = false;
            tracing::debug!(region = ?self.region, "jump");
        }

        if self.grounded {
            self.vertical_velocity = 0.0;
        } else {
            self.vertical_velocity = (self.vertical_velocity + self.physics.gravity * dt)
                .min(self.physics.max_fall_speed);
        }

        let delta = Vec2::new(
            input.horizontal.clamp(-1.0, 1.0) * self.physics.move_speed * dt,
            self.vertical_velocity * dt,
        );
        let target = bounds + delta;
        let moved = self.travel(manager, bounds, delta);
        if self.vertical_velocity < 0.0 && moved.y0 - target.y0 > 1e-9 {
            // Head bump.
            self.vertical_velocity = 0.0;
        }
        manager.place_region(self.region, moved)?;

        let was_grounded = self.grounded;
        let mut landed = false;
        let mut bounds = moved;
        let ascending = self.state == AvatarState::Jumping && self.vertical_velocity < 0.0;
        match self.find_floor(manager, bounds).filter(|_| !ascending) {
            Some(floor) => {
                let snapped = bounds.with_origin((bounds.x0, floor - bounds.height()));
                if snapped == bounds || !manager.zones().intersects_any(snapped) {
                    if snapped != bounds {
                        manager.place_region(self.region, snapped)?;
                        bounds = snapped;
                    }
                    self.vertical_velocity = 0.0;
                    self.grounded = true;
                    if !was_grounded || self.state == AvatarState::Jumping {
                        landed = true;
                        self.state = AvatarState::Normal;
                        tracing::debug!(region = ?self.region, floor, "landed");
                    }
                } else {
                    tracing::trace!(region = ?self.region, ?snapped, "floor snap blocked by a zone");
                    self.grounded = false;
                }
            }
            None => self.grounded = false,
        }

        if let Some(parent) = manager.parent_of(self.region) {
            self.last_valid_parent = Some(parent);
        }

        Ok(StepOutcome {
            bounds,
            grounded: self.grounded,
            landed,
            state: self.state,
        })
    }

    /// Move from `start` by `delta`, sub-stepping so thin platforms are not skipped.
    fn travel<B: Backend>(&self, manager: &RegionManager<B>, start: Rect, delta: Vec2) -> Rect {
        let max_step = (start.width().min(start.height()) * 0.5).max(1.0);
        let distance = delta.x.abs().max(delta.y.abs());
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "Distance is finite and non-negative; the count is capped."
        )]
        let steps = ((distance / max_step).ceil() as usize).clamp(1, MAX_SUBSTEPS);
        let step = delta / steps as f64;

        let platforms = if delta.y > 0.0 {
            self.platforms(manager, start.union(start + delta))
        } else {
            Vec::new()
        };
        let resolver = CollisionResolver::new(manager.zones());
        let advance = |from: Rect, by: Vec2| {
            let clamped = resolver.clamp_position(from, from + by, &[]);
            self.confine(manager, from, clamped)
        };
        let mut current = start;
        for _ in 0..steps {
            // Axes are resolved separately so a blocked axis does not stall the other.
            let after_x = advance(current, Vec2::new(step.x, 0.0));
            let dy = landing_limit(after_x, step.y, &platforms);
            let next = advance(after_x, Vec2::new(0.0, dy));
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    /// Bounds of the regions the avatar can land on within `sweep`.
    fn platforms<B: Backend>(&self, manager: &RegionManager<B>, sweep: Rect) -> Vec<Rect> {
        let containment = manager.containment();
        let descendants = containment.descendants(self.region);
        manager
            .regions_overlapping(sweep)
            .into_iter()
            .filter(|id| {
                *id != self.region
                    && !containment.is_ancestor(*id, self.region)
                    && !descendants.contains(id)
            })
            .filter_map(|id| manager.region(id))
            .filter(|r| r.tier() != Tier::Avatar)
            .map(|r| r.bounds())
            .collect()
    }

    /// Keep `proposed` inside the enclosing region's movable area.
    fn confine<B: Backend>(&self, manager: &RegionManager<B>, current: Rect, proposed: Rect) -> Rect {
        let area = self.enclosing_area(manager);
        let movable = manager.zones().movable_area(area);
        let proposed = geometry::clamp_within(proposed, area);
        if movable.covers(proposed) {
            return proposed;
        }
        let x_only = current.with_origin((proposed.x0, current.y0));
        let y_only = current.with_origin((current.x0, proposed.y0));
        if movable.covers(y_only) {
            y_only
        } else if movable.covers(x_only) {
            x_only
        } else {
            tracing::trace!(region = ?self.region, ?proposed, "move rejected by movable area");
            current
        }
    }

    fn enclosing_area<B: Backend>(&self, manager: &RegionManager<B>) -> Rect {
        let config = manager.config();
        manager
            .parent_of(self.region)
            .and_then(|p| manager.region(p))
            .map(|r| config.content_insets.apply(r.bounds()))
            .filter(|r| r.width() > 0.0 && r.height() > 0.0)
            .unwrap_or(config.play_area)
    }

    /// Top edge of the floor under `bounds`, if one is within the ground tolerance.
    fn find_floor<B: Backend>(&self, manager: &RegionManager<B>, bounds: Rect) -> Option<f64> {
        let tolerance = self.physics.ground_tolerance;
        let feet = bounds.y1;
        let probe = Rect::new(
            bounds.x0,
            feet - tolerance,
            bounds.x1,
            feet + tolerance.max(self.physics.foot_probe_height),
        );
        let containment = manager.containment();
        let descendants = containment.descendants(self.region);
        let candidates = manager
            .regions_overlapping(probe)
            .into_iter()
            .filter(|id| {
                *id != self.region
                    && !containment.is_ancestor(*id, self.region)
                    && !descendants.contains(id)
            })
            .filter_map(|id| {
                let r = manager.region(id)?;
                let b = r.bounds();
                let beside = b.x0 < bounds.x1 && bounds.x0 < b.x1;
                (r.tier() != Tier::Avatar && beside && (b.y0 - feet).abs() <= tolerance)
                    .then_some((id, b.y0))
            });

        let mut best: Option<(RegionId, f64)> = None;
        for (id, top) in candidates {
            best = match best {
                None => Some((id, top)),
                Some((bid, btop)) => {
                    let (d, bd) = ((top - feet).abs(), (btop - feet).abs());
                    if d < bd || (d == bd && manager.stacking().is_in_front(id, bid)) {
                        Some((id, top))
                    } else {
                        Some((bid, btop))
                    }
                }
            };
        }
        if let Some((_, top)) = best {
            return Some(top);
        }

        let floor = self.enclosing_area(manager).y1;
        ((floor - feet).abs() <= tolerance).then_some(floor)
    }
}

/// Shorten a downward step `dy` so the feet of `bounds` stop on the first platform top they
/// would cross.
fn landing_limit(bounds: Rect, dy: f64, platforms: &[Rect]) -> f64 {
    if dy <= 0.0 {
        return dy;
    }
    let feet = bounds.y1;
    platforms
        .iter()
        .filter(|p| p.x0 < bounds.x1 && bounds.x0 < p.x1)
        .filter(|p| feet <= p.y0 + LANDING_EPSILON && feet + dy > p.y0)
        .fold(dy, |dy, p| dy.min((p.y0 - feet).max(0.0)))
}

#[cfg(test)]
mod tests {
    use kurbo::Size;

    use super::*;
    use crate::config::EngineConfig;

    fn world() -> RegionManager {
        RegionManager::new(EngineConfig {
            min_region_size: Size::new(10.0, 10.0),
            play_area: Rect::new(0.0, 0.0, 1000.0, 1000.0),
            ..EngineConfig::default()
        })
    }

    fn slow_physics() -> PhysicsConfig {
        PhysicsConfig {
            gravity: 0.0,
            ..PhysicsConfig::default()
        }
    }

    #[test]
    fn falls_onto_platform_with_default_flags() {
        let mut m = world();
        m.register_region(RegionDesc::new(
            Rect::new(0.0, 140.0, 400.0, 400.0),
            Tier::Surface,
        ))
        .unwrap();
        let mut avatar =
            AvatarController::spawn(&mut m, Rect::new(100.0, 100.0, 120.0, 120.0), slow_physics())
                .unwrap();
        avatar.set_vertical_velocity(50.0);
        avatar.set_state(AvatarState::Jumping);

        let out = avatar.step(&mut m, AvatarInput::default(), 1.0).unwrap();
        assert_eq!(out.bounds.y0, 120.0);
        assert!(out.grounded && out.landed);
        assert_eq!(out.state, AvatarState::Normal);
        assert_eq!(avatar.vertical_velocity(), 0.0);
        assert_eq!(m.parent_of(avatar.region()), None);
    }

    #[test]
    fn jump_suspends_grounding_until_descent() {
        let mut m = world();
        let mut avatar = AvatarController::spawn(
            &mut m,
            Rect::new(100.0, 980.0, 120.0, 1000.0),
            PhysicsConfig::default(),
        )
        .unwrap();
        let out = avatar.step(&mut m, AvatarInput::default(), 0.016).unwrap();
        assert!(out.grounded, "play-area floor counts as ground");

        let jump = AvatarInput {
            jump: true,
            horizontal: 0.0,
        };
        let out = avatar.step(&mut m, jump, 0.016).unwrap();
        assert_eq!(out.state, AvatarState::Jumping);
        assert!(!out.grounded);
        assert!(out.bounds.y0 < 980.0);

        let mut landed = false;
        for _ in 0..200 {
            let out = avatar.step(&mut m, AvatarInput::default(), 0.016).unwrap();
            if out.landed {
                landed = true;
                assert_eq!(out.bounds.y1, 1000.0);
                break;
            }
        }
        assert!(landed);
        assert_eq!(avatar.state(), AvatarState::Normal);
    }

    #[test]
    fn enclosing_region_confines_movement() {
        let mut m = world();
        let window = m
            .register_region(RegionDesc::new(
                Rect::new(100.0, 100.0, 400.0, 400.0),
                Tier::Surface,
            ))
            .unwrap();
        let mut avatar =
            AvatarController::spawn(&mut m, Rect::new(200.0, 200.0, 220.0, 220.0), slow_physics())
                .unwrap();
        assert_eq!(avatar.last_valid_parent(), Some(window));

        let right = AvatarInput {
            jump: false,
            horizontal: 1.0,
        };
        let out = avatar.step(&mut m, right, 5.0).unwrap();
        // Right content edge is 400 - 4.
        assert_eq!(out.bounds.x1, 396.0);
        assert_eq!(m.parent_of(avatar.region()), Some(window));
    }

    #[test]
    fn forbidden_zone_blocks_one_axis_only() {
        let mut m = world();
        m.add_forbidden_zone(Rect::new(300.0, 0.0, 320.0, 1000.0))
            .unwrap();
        let mut avatar = AvatarController::spawn(
            &mut m,
            Rect::new(200.0, 500.0, 220.0, 520.0),
            slow_physics(),
        )
        .unwrap();
        avatar.set_vertical_velocity(20.0);
        let right = AvatarInput {
            jump: false,
            horizontal: 1.0,
        };
        let out = avatar.step(&mut m, right, 1.0).unwrap();
        assert_eq!(out.bounds.x1, 300.0);
        assert_eq!(out.bounds.y0, 520.0);
        assert!(!m.zones().intersects_any(out.bounds));
    }

    #[test]
    fn platforms_are_one_way() {
        let mut m = world();
        m.register_region(RegionDesc::new(
            Rect::new(0.0, 500.0, 400.0, 510.0),
            Tier::SurfaceMark,
        ))
        .unwrap();
        let mut avatar =
            AvatarController::spawn(&mut m, Rect::new(100.0, 520.0, 120.0, 540.0), slow_physics())
                .unwrap();

        avatar.set_vertical_velocity(-40.0);
        avatar.set_state(AvatarState::Jumping);
        let out = avatar.step(&mut m, AvatarInput::default(), 1.0).unwrap();
        assert_eq!(out.bounds.y0, 480.0, "rises through the platform");
        assert!(!out.grounded);

        avatar.set_vertical_velocity(10.0);
        let out = avatar.step(&mut m, AvatarInput::default(), 1.0).unwrap();
        assert_eq!(out.bounds.y1, 500.0);
        assert!(out.grounded && out.landed);
    }

    #[test]
    fn floor_snap_never_enters_a_zone() {
        let mut m = world();
        m.register_region(RegionDesc::new(
            Rect::new(0.0, 140.0, 400.0, 400.0),
            Tier::Surface,
        ))
        .unwrap();
        // Snapping up onto the top at 140 would put the avatar's head inside this zone.
        m.add_forbidden_zone(Rect::new(90.0, 115.0, 130.0, 121.0))
            .unwrap();
        let start = Rect::new(100.0, 122.0, 120.0, 142.0);
        let mut avatar = AvatarController::spawn(&mut m, start, slow_physics()).unwrap();

        let out = avatar.step(&mut m, AvatarInput::default(), 0.016).unwrap();
        assert_eq!(out.bounds, start);
        assert!(!out.grounded);
        assert!(!m.zones().intersects_any(out.bounds));
    }

    #[test]
    fn landing_limit_picks_the_nearest_top_crossed() {
        let feet_at_100 = Rect::new(0.0, 80.0, 10.0, 100.0);
        let platforms = [
            Rect::new(0.0, 130.0, 50.0, 140.0),
            Rect::new(5.0, 110.0, 50.0, 120.0),
            // Beside the avatar, not under it.
            Rect::new(10.0, 101.0, 50.0, 105.0),
            // Already above the feet.
            Rect::new(0.0, 90.0, 50.0, 95.0),
        ];
        assert_eq!(landing_limit(feet_at_100, 50.0, &platforms), 10.0);
        assert_eq!(landing_limit(feet_at_100, 5.0, &platforms), 5.0);
        assert_eq!(landing_limit(feet_at_100, -5.0, &platforms), -5.0);
    }
}
