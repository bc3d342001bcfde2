// Copyright 2025 the Nestbox Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types.

use kurbo::{Rect, Size};
use thiserror::Error;

use crate::region::RegionId;

/// Errors reported by the engine.
///
/// Apart from [`EngineError::TornDown`] and [`EngineError::Poisoned`], every variant is
/// recoverable: the failed call left the engine state exactly as it was.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum EngineError {
    /// Zero, negative, or non-finite bounds or zone.
    #[error("invalid geometry: {0:?}")]
    InvalidGeometry(Rect),
    /// Zero, negative, or non-finite size.
    #[error("invalid size: {0:?}")]
    InvalidSize(Size),
    /// Linking `child` under `parent` would make `child` its own ancestor.
    #[error("parenting {child:?} under {parent:?} would create a cycle")]
    CycleRejected {
        /// Region being reparented.
        child: RegionId,
        /// Rejected parent.
        parent: RegionId,
    },
    /// The region is not (or no longer) registered.
    #[error("region {0:?} is not registered")]
    NotFound(RegionId),
    /// The engine was torn down; its state is gone.
    #[error("engine has been torn down")]
    TornDown,
    /// A thread panicked while holding the engine lock.
    #[error("engine lock poisoned by a panicking holder")]
    Poisoned,
}

/// Failure reported by a per-region behavior during a frame.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BehaviorError {
    /// The behavior returned an error.
    #[error("region behavior failed: {0}")]
    Failed(String),
    /// The behavior panicked; the panic was contained.
    #[error("region behavior panicked")]
    Panicked,
}

/// Failure reported by an event listener.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("listener failed: {0}")]
pub struct ListenerError(pub String);

/// Failure pushing the stacking order to the native window stack.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("stacking sync failed: {0}")]
pub struct SyncError(pub String);
