// Copyright 2025 the Nestbox Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-frame behavior fan-out.
//!
//! Each region may carry a [`RegionBehavior`]. Once per frame the manager snapshots every
//! region with a behavior and runs the behaviors on scoped worker threads. Behaviors see only
//! their snapshot and cannot touch geometry directly: they submit [`Mutation`]s through a
//! shared [`MutationGateway`]. After every worker has joined, the manager applies the queued
//! mutations one at a time in registration order of the submitting region, re-checking that
//! both the submitter and the target are still registered.
//!
//! A behavior that fails or panics is contained and reported in the [`FrameReport`]; the rest
//! of the frame proceeds.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};

use kurbo::{Rect, Size};

use crate::error::BehaviorError;
use crate::region::{RegionId, Tier};

/// Per-region frame logic supplied by a collaborator (animation, AI, timers).
pub trait RegionBehavior: Send + Sync {
    /// Advance one frame. Geometry changes go through [`FrameContext::request`].
    fn update(&self, ctx: &FrameContext<'_>) -> Result<(), BehaviorError>;
}

impl<F> RegionBehavior for F
where
    F: Fn(&FrameContext<'_>) -> Result<(), BehaviorError> + Send + Sync,
{
    fn update(&self, ctx: &FrameContext<'_>) -> Result<(), BehaviorError> {
        self(ctx)
    }
}

/// A geometry change requested during a frame.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum MutationKind {
    /// Move toward the given bounds (clamped like any move).
    MoveTo(Rect),
    /// Resize toward the given size (clamped like any resize).
    Resize(Size),
    /// Minimize or restore.
    SetMinimized(bool),
    /// Bring in front of tier peers.
    BringToFront,
    /// Send behind tier peers.
    SendToBack,
    /// Unregister the target.
    Unregister,
}

/// A queued request from one region's behavior.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Mutation {
    /// Region whose behavior submitted the request.
    pub source: RegionId,
    /// Region to change.
    pub target: RegionId,
    /// What to change.
    pub kind: MutationKind,
}

/// Serialized queue that collects mutations from concurrently running behaviors.
#[derive(Debug, Default)]
pub struct MutationGateway {
    queue: Mutex<Vec<(usize, Mutation)>>,
}

impl MutationGateway {
    fn submit(&self, slot: usize, mutation: Mutation) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((slot, mutation));
    }

    /// Drain the queue, ordered by submitter slot and then by submission order.
    pub(crate) fn into_ordered(self) -> Vec<Mutation> {
        let mut queue = self
            .queue
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        queue.sort_by_key(|(slot, _)| *slot);
        queue.into_iter().map(|(_, m)| m).collect()
    }
}

/// What a behavior sees of its region during a frame.
#[derive(Debug)]
pub struct FrameContext<'a> {
    region: RegionId,
    bounds: Rect,
    tier: Tier,
    dt: f64,
    frame: u64,
    slot: usize,
    gateway: &'a MutationGateway,
}

impl FrameContext<'_> {
    /// The region this behavior belongs to.
    pub fn region(&self) -> RegionId {
        self.region
    }

    /// Bounds at the start of the frame.
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Stacking tier.
    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Seconds since the previous frame.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Frame counter, starting at 1.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Queue a change to `target`, applied after every behavior has finished.
    pub fn request(&self, target: RegionId, kind: MutationKind) {
        self.gateway.submit(
            self.slot,
            Mutation {
                source: self.region,
                target,
                kind,
            },
        );
    }

    /// Queue a change to this behavior's own region.
    pub fn request_self(&self, kind: MutationKind) {
        self.request(self.region, kind);
    }
}

/// Summary of one [`RegionManager::update_frame`](crate::RegionManager::update_frame).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameReport {
    /// Frame counter.
    pub frame: u64,
    /// Behaviors that ran.
    pub updated: usize,
    /// Behaviors that failed, in registration order.
    pub failures: Vec<(RegionId, BehaviorError)>,
    /// Mutations applied.
    pub applied: usize,
    /// Mutations dropped because a region was gone or the change was rejected.
    pub skipped: usize,
}

/// A behavior scheduled for this frame together with its region's snapshot.
#[derive(Clone)]
pub(crate) struct Job {
    pub(crate) region: RegionId,
    pub(crate) bounds: Rect,
    pub(crate) tier: Tier,
    pub(crate) behavior: Arc<dyn RegionBehavior>,
}

/// Run every job, spreading them over at most `workers` scoped threads.
///
/// Returns the failures in job order.
pub(crate) fn fan_out(
    jobs: &[Job],
    dt: f64,
    frame: u64,
    workers: usize,
    gateway: &MutationGateway,
) -> Vec<(RegionId, BehaviorError)> {
    let run_chunk = |offset: usize, chunk: &[Job]| -> Vec<(RegionId, BehaviorError)> {
        let mut failures = Vec::new();
        for (i, job) in chunk.iter().enumerate() {
            let ctx = FrameContext {
                region: job.region,
                bounds: job.bounds,
                tier: job.tier,
                dt,
                frame,
                slot: offset + i,
                gateway,
            };
            let result = match catch_unwind(AssertUnwindSafe(|| job.behavior.update(&ctx))) {
                Ok(r) => r,
                Err(_) => Err(BehaviorError::Panicked),
            };
            if let Err(err) = result {
                tracing::warn!(region = ?job.region, %err, "region behavior failed");
                failures.push((job.region, err));
            }
        }
        failures
    };

    let workers = workers.max(1).min(jobs.len());
    if workers <= 1 {
        return run_chunk(0, jobs);
    }
    let chunk_len = jobs.len().div_ceil(workers);
    std::thread::scope(|scope| {
        let handles: Vec<_> = jobs
            .chunks(chunk_len)
            .enumerate()
            .map(|(n, chunk)| {
                let run_chunk = &run_chunk;
                scope.spawn(move || run_chunk(n * chunk_len, chunk))
            })
            .collect();
        let mut failures = Vec::new();
        for (n, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(f) => failures.extend(f),
                Err(_) => {
                    // Panics are caught per job; reaching this means the worker itself died.
                    tracing::warn!(worker = n, "frame worker terminated abnormally");
                }
            }
        }
        failures
    })
}
