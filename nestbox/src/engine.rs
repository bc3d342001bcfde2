// Copyright 2025 the Nestbox Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared handle to a [`RegionManager`] with explicit teardown.
//!
//! All geometry mutation runs under one mutex, so every call made through
//! [`Engine::with`] sees and leaves a settled state. After [`Engine::teardown`] the manager
//! is dropped and every clone of the handle reports [`EngineError::TornDown`].

use std::sync::{Arc, Mutex};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::manager::RegionManager;
use crate::spatial::{Backend, FlatVec};

/// Cloneable, thread-safe handle to a region manager.
pub struct Engine<B: Backend = FlatVec> {
    inner: Arc<Mutex<Option<RegionManager<B>>>>,
}

impl<B: Backend> Clone for Engine<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend> core::fmt::Debug for Engine<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Engine")
            .field("torn_down", &self.is_torn_down())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine around a fresh flat-vector manager.
    pub fn new(config: EngineConfig) -> Self {
        Self::from_manager(RegionManager::new(config))
    }
}

impl<B: Backend> Engine<B> {
    /// Wrap an existing manager.
    pub fn from_manager(manager: RegionManager<B>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(manager))),
        }
    }

    /// Run `f` with exclusive access to the manager.
    pub fn with<R>(&self, f: impl FnOnce(&mut RegionManager<B>) -> R) -> Result<R, EngineError> {
        let mut guard = self.inner.lock().map_err(|_| {
            tracing::warn!("engine lock poisoned");
            EngineError::Poisoned
        })?;
        let manager = guard.as_mut().ok_or(EngineError::TornDown)?;
        Ok(f(manager))
    }

    /// Drop the manager. Fails with [`EngineError::TornDown`] if that already happened.
    pub fn teardown(&self) -> Result<(), EngineError> {
        let mut guard = self.inner.lock().map_err(|_| EngineError::Poisoned)?;
        match guard.take() {
            Some(manager) => {
                tracing::debug!(regions = manager.len(), "engine torn down");
                Ok(())
            }
            None => Err(EngineError::TornDown),
        }
    }

    /// Whether the manager is gone. A poisoned lock also counts as torn down.
    pub fn is_torn_down(&self) -> bool {
        self.inner
            .lock()
            .map(|guard| guard.is_none())
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use kurbo::Rect;

    use super::*;
    use crate::region::{RegionDesc, Tier};

    #[test]
    fn clones_share_state_and_teardown() {
        let engine = Engine::new(EngineConfig::default());
        let other = engine.clone();
        let id = engine
            .with(|m| {
                m.register_region(RegionDesc::new(
                    Rect::new(0.0, 0.0, 50.0, 50.0),
                    Tier::Surface,
                ))
            })
            .unwrap()
            .unwrap();
        assert_eq!(other.with(|m| m.is_alive(id)), Ok(true));

        engine.teardown().unwrap();
        assert!(other.is_torn_down());
        assert_eq!(other.with(|m| m.len()), Err(EngineError::TornDown));
        assert_eq!(other.teardown(), Err(EngineError::TornDown));
    }

    #[test]
    fn usable_across_threads() {
        let engine = Engine::new(EngineConfig::default());
        let handles: Vec<_> = (0..4_u32)
            .map(|i| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    let x = f64::from(i) * 100.0;
                    engine
                        .with(|m| {
                            m.register_region(RegionDesc::new(
                                Rect::new(x, 0.0, x + 50.0, 50.0),
                                Tier::Control,
                            ))
                        })
                        .unwrap()
                        .unwrap()
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(engine.with(|m| m.len()), Ok(4));
    }
}
