// Copyright 2025 the Nestbox Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Nestbox: the spatial core of a nested-window puzzle game.
//!
//! Regions are movable, resizable rectangles (windows, platforms, buttons) that can contain
//! one another. An avatar walks and jumps inside whichever region currently encloses it.
//! This crate keeps the relationships between them consistent while they move.
//!
//! - A derived, cycle-free containment hierarchy: each region's parent is the frontmost
//!   region fully containing it.
//! - Tiered stacking (z-order) that breaks ties between candidate parents.
//! - Directional movement clamping against forbidden zones and caller-named obstacles.
//! - Avatar movement bounded by the enclosing region, with jump and grounding logic.
//!
//! Rendering, native windows, and input are left to the host. It reads settled state
//! (bounds, parents, stacking order, [`Damage`]) and feeds back input and external bounds
//! changes.
//!
//! ## API overview
//!
//! - [`RegionManager`]: owns regions and every service; the only path for geometry changes.
//! - [`Engine`]: `Arc<Mutex<..>>` handle around a manager with explicit teardown.
//! - [`RegionDesc`], [`Region`], [`RegionId`], [`Tier`], [`RegionFlags`]: region data.
//! - [`StackingRegistry`]: per-tier back-to-front sequences; [`StackingSink`] receives them.
//! - [`Containment`]: the derived parent/children forest and its resolver.
//! - [`ForbiddenZones`] and [`ClipRegion`]: static off-limits rectangles and movable areas.
//! - [`CollisionResolver`], [`collide`], [`topmost_at`]: movement clamping and hit-testing.
//! - [`AvatarController`]: per-step avatar physics consuming all of the above.
//! - [`RegionBehavior`]: per-region frame logic run by [`RegionManager::update_frame`].
//! - [`EventBus`] / [`RegionEvent`]: change notifications.
//! - [`SpatialIndex`] with [`FlatVec`] or [`Grid`] backends: AABB queries and damage.
//!
//! ## Example
//!
//! ```
//! use kurbo::{Point, Rect};
//! use nestbox::{EngineConfig, RegionDesc, RegionManager, Tier};
//!
//! let mut manager = RegionManager::new(EngineConfig::default());
//! let window = manager
//!     .register_region(RegionDesc::new(Rect::new(0.0, 0.0, 400.0, 300.0), Tier::Surface))
//!     .unwrap();
//! let button = manager
//!     .register_region(RegionDesc::new(Rect::new(500.0, 10.0, 540.0, 30.0), Tier::Control))
//!     .unwrap();
//! assert_eq!(manager.parent_of(button), None);
//!
//! // Dragging the button into the window makes the window its parent.
//! manager.move_region(button, Rect::new(20.0, 40.0, 60.0, 60.0)).unwrap();
//! assert_eq!(manager.parent_of(button), Some(window));
//! assert_eq!(manager.topmost_at(Point::new(30.0, 50.0), None), Some(button));
//! ```
//!
//! ## Logging
//!
//! Diagnostics use [`tracing`]. Rejected input and collaborator failures are `warn`,
//! hierarchy decisions are `debug`, and per-step clamping is `trace`. The library never
//! installs a subscriber.

mod avatar;
mod collision;
mod config;
mod containment;
mod engine;
mod error;
mod events;
mod frame;
pub mod geometry;
mod manager;
mod region;
mod spatial;
mod stacking;
mod zones;

pub use avatar::{AvatarController, AvatarInput, AvatarState, StepOutcome};
pub use collision::{Collision, CollisionResolver, collide, topmost_at};
pub use config::{EngineConfig, Insets, PhysicsConfig};
pub use containment::{Ancestors, Containment, Detached, ParentChange, RegionLookup};
pub use engine::Engine;
pub use error::{BehaviorError, EngineError, ListenerError, SyncError};
pub use events::{EventBus, Listener, RegionEvent, SubscriptionId};
pub use frame::{FrameContext, FrameReport, Mutation, MutationGateway, MutationKind, RegionBehavior};
pub use manager::RegionManager;
pub use region::{Region, RegionDesc, RegionFlags, RegionId, Tier};
pub use spatial::{Backend, Damage, FlatVec, Grid, Key, SpatialIndex};
pub use stacking::{StackingRegistry, StackingSink};
pub use zones::{ClipRegion, ForbiddenZones};
