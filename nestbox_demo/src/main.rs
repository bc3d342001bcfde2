// Copyright 2025 the Nestbox Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scripted walkthrough of a small nested-window level.
//!
//! The level has a desktop, two windows, a ledge, a forbidden zone, and an avatar. A
//! patrol behavior slides the small window left for the first half while the avatar walks
//! right and hops once a second. Every few frames the hierarchy is printed.
//!
//! Run:
//! - `cargo run -p nestbox_demo`
//! - `RUST_LOG=nestbox=debug cargo run -p nestbox_demo` to see hierarchy decisions.

use std::sync::Arc;

use kurbo::{Rect, Vec2};
use nestbox::{
    AvatarController, AvatarInput, BehaviorError, EngineConfig, FrameContext, MutationKind,
    PhysicsConfig, RegionBehavior, RegionDesc, RegionId, RegionManager, StackingSink,
    SyncError, Tier,
};
use tracing_subscriber::EnvFilter;

const FRAMES: u64 = 180;
const DT: f64 = 1.0 / 60.0;

/// Prints the back-to-front order a windowing layer would apply.
struct PrintSink;

impl StackingSink for PrintSink {
    fn apply_order(&mut self, order: &[RegionId]) -> Result<(), SyncError> {
        println!("stacking (back to front): {order:?}");
        Ok(())
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn print_tree(m: &RegionManager, names: &[(RegionId, &'static str)]) {
    fn walk(
        m: &RegionManager,
        id: RegionId,
        depth: usize,
        name: &dyn Fn(RegionId) -> &'static str,
    ) {
        let Some(r) = m.region(id) else { return };
        let b = r.bounds();
        println!(
            "{:indent$}{} [{:?}] ({:.0}, {:.0}) - ({:.0}, {:.0})",
            "",
            name(id),
            r.tier(),
            b.x0,
            b.y0,
            b.x1,
            b.y1,
            indent = depth * 2
        );
        for child in m.children_of(id) {
            walk(m, *child, depth + 1, name);
        }
    }
    let name = |id: RegionId| {
        names
            .iter()
            .find(|(n, _)| *n == id)
            .map_or("?", |(_, s)| *s)
    };
    for (id, _) in m.get_all_regions() {
        if m.parent_of(id).is_none() {
            walk(m, id, 0, &name);
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let mut m = RegionManager::new(EngineConfig {
        play_area: Rect::new(0.0, 0.0, 1280.0, 720.0),
        ..EngineConfig::default()
    });
    let desktop = m.register_region(RegionDesc::new(
        Rect::new(0.0, 0.0, 1280.0, 720.0),
        Tier::Background,
    ))?;
    let big = m.register_region(RegionDesc::new(
        Rect::new(100.0, 100.0, 900.0, 600.0),
        Tier::Surface,
    ))?;
    let ledge = m.register_region(RegionDesc::new(
        Rect::new(300.0, 500.0, 500.0, 520.0),
        Tier::SurfaceMark,
    ))?;
    let small = m.register_region(RegionDesc::new(
        Rect::new(950.0, 150.0, 1150.0, 350.0),
        Tier::Surface,
    ))?;
    let key = m.register_region(RegionDesc::new(
        Rect::new(1000.0, 200.0, 1020.0, 220.0),
        Tier::Objective,
    ))?;
    m.add_forbidden_zone(Rect::new(700.0, 540.0, 760.0, 600.0))?;

    let mut avatar = AvatarController::spawn(
        &mut m,
        Rect::new(200.0, 560.0, 224.0, 596.0),
        PhysicsConfig::default(),
    )?;

    let names = [
        (desktop, "desktop"),
        (big, "big window"),
        (ledge, "ledge"),
        (small, "small window"),
        (key, "key"),
        (avatar.region(), "avatar"),
    ];

    // Slide the small window left for a while. The key stays where it is, so it drops back
    // onto the desktop once the window no longer encloses it.
    let patrol: Arc<dyn RegionBehavior> =
        Arc::new(|ctx: &FrameContext<'_>| -> Result<(), BehaviorError> {
            if ctx.frame() < 90 {
                ctx.request_self(MutationKind::MoveTo(ctx.bounds() - Vec2::new(4.0, 0.0)));
            }
            Ok(())
        });
    m.attach_behavior(small, patrol)?;

    m.subscribe(|event| {
        tracing::info!(?event, "region event");
        Ok(())
    });

    println!("== initial ==");
    print_tree(&m, &names);

    let walk_right = AvatarInput {
        jump: false,
        horizontal: 1.0,
    };
    for frame in 1..=FRAMES {
        let report = m.update_frame(DT);
        if !report.failures.is_empty() {
            tracing::warn!(failures = ?report.failures, "frame had failing behaviors");
        }
        let input = AvatarInput {
            jump: frame % 60 == 0,
            ..walk_right
        };
        let out = avatar.step(&mut m, input, DT)?;
        if frame % 60 == 0 {
            println!(
                "\n== frame {frame}: avatar at ({:.1}, {:.1}) grounded={} state={:?} ==",
                out.bounds.x0, out.bounds.y0, out.grounded, out.state
            );
            print_tree(&m, &names);
            let damage = m.take_damage();
            println!(
                "damage since last report: {} added, {} removed, {} moved",
                damage.added.len(),
                damage.removed.len(),
                damage.moved.len()
            );
        }
    }

    m.update_all_orders(&mut PrintSink)?;
    Ok(())
}
