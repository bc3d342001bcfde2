// Copyright 2025 the Nestbox Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Spatial index over region bounds with pluggable backends.
//!
//! The region manager mirrors every active region's bounds into a [`SpatialIndex`] and uses
//! it for point hit tests, containment candidate lookup, and the avatar's foot probe.
//!
//! Changes are batched: [`SpatialIndex::insert`], [`SpatialIndex::update`], and
//! [`SpatialIndex::remove`] only mark entries, and [`SpatialIndex::commit`] synchronizes the
//! backend and reports coarse [`Damage`]. Queries see the last committed state.
//!
//! Queries are conservative: edges are inclusive, so callers refine the hits with the strict
//! predicates in [`crate::geometry`].
//!
//! Backends:
//! - [`FlatVec`] (default): linear scans. Fine for the handful of regions in a level.
//! - [`Grid`]: uniform grid keyed by `hashbrown`. Pays off for large, sparse play areas.

use core::fmt::Debug;

use hashbrown::HashMap;
use kurbo::{Point, Rect};
use smallvec::SmallVec;

/// Spatial strategy used by [`SpatialIndex`].
pub trait Backend {
    /// Insert a new slot.
    fn insert(&mut self, slot: usize, rect: Rect);

    /// Replace the rectangle of an existing slot.
    fn update(&mut self, slot: usize, rect: Rect);

    /// Remove a slot.
    fn remove(&mut self, slot: usize);

    /// Drop everything.
    fn clear(&mut self);

    /// Visit slots whose rectangle contains `point` (edges inclusive).
    fn visit_point<F: FnMut(usize)>(&self, point: Point, f: F);

    /// Visit slots whose rectangle overlaps `rect` (edges inclusive).
    fn visit_rect<F: FnMut(usize)>(&self, rect: Rect, f: F);
}

#[inline]
fn touches(a: Rect, b: Rect) -> bool {
    a.x0 <= b.x1 && b.x0 <= a.x1 && a.y0 <= b.y1 && b.y0 <= a.y1
}

#[inline]
fn touches_point(r: Rect, p: Point) -> bool {
    r.x0 <= p.x && p.x <= r.x1 && r.y0 <= p.y && p.y <= r.y1
}

/// Linear-scan backend.
#[derive(Clone, Debug, Default)]
pub struct FlatVec {
    slots: Vec<Option<Rect>>,
}

impl Backend for FlatVec {
    fn insert(&mut self, slot: usize, rect: Rect) {
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, None);
        }
        self.slots[slot] = Some(rect);
    }

    fn update(&mut self, slot: usize, rect: Rect) {
        self.insert(slot, rect);
    }

    fn remove(&mut self, slot: usize) {
        if let Some(s) = self.slots.get_mut(slot) {
            *s = None;
        }
    }

    fn clear(&mut self) {
        self.slots.clear();
    }

    fn visit_point<F: FnMut(usize)>(&self, point: Point, mut f: F) {
        for (i, r) in self.slots.iter().enumerate() {
            if let Some(r) = r
                && touches_point(*r, point)
            {
                f(i);
            }
        }
    }

    fn visit_rect<F: FnMut(usize)>(&self, rect: Rect, mut f: F) {
        for (i, r) in self.slots.iter().enumerate() {
            if let Some(r) = r
                && touches(*r, rect)
            {
                f(i);
            }
        }
    }
}

type Cell = (i32, i32);

/// Entries or queries spanning more cells than this skip the cell map.
const MAX_CELLS_PER_ENTRY: i64 = 1024;

/// Uniform grid backend with a fixed cell size.
///
/// Entries too large to bucket are kept in a side list that every query scans.
#[derive(Clone, Debug)]
pub struct Grid {
    cell_size: f64,
    cells: HashMap<Cell, SmallVec<[usize; 8]>>,
    oversized: Vec<usize>,
    slots: Vec<Option<GridSlot>>,
}

#[derive(Clone, Debug)]
struct GridSlot {
    rect: Rect,
    cells: SmallVec<[Cell; 4]>,
}

impl Grid {
    /// Create a grid with square cells of `cell_size` world units.
    ///
    /// Non-positive or non-finite sizes fall back to 64.
    pub fn new(cell_size: f64) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            64.0
        };
        Self {
            cell_size,
            cells: HashMap::new(),
            oversized: Vec::new(),
            slots: Vec::new(),
        }
    }

    /// Cell size in world units.
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    #[allow(
        clippy::cast_possible_truncation,
        reason = "Grid cell indices are intentionally i32; out-of-range values saturate."
    )]
    fn coord(&self, v: f64) -> i32 {
        (v / self.cell_size).floor() as i32
    }

    fn cell_range(&self, rect: Rect) -> (Cell, Cell) {
        (
            (self.coord(rect.x0), self.coord(rect.y0)),
            (self.coord(rect.x1), self.coord(rect.y1)),
        )
    }

    fn cell_count(((cx0, cy0), (cx1, cy1)): (Cell, Cell)) -> i64 {
        (i64::from(cx1) - i64::from(cx0) + 1) * (i64::from(cy1) - i64::from(cy0) + 1)
    }

    fn unlink(&mut self, slot: usize) {
        let Some(Some(entry)) = self.slots.get_mut(slot).map(Option::take) else {
            return;
        };
        if entry.cells.is_empty() {
            self.oversized.retain(|s| *s != slot);
        }
        for cell in entry.cells {
            if let Some(list) = self.cells.get_mut(&cell) {
                list.retain(|s| *s != slot);
                if list.is_empty() {
                    self.cells.remove(&cell);
                }
            }
        }
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::new(64.0)
    }
}

impl Backend for Grid {
    fn insert(&mut self, slot: usize, rect: Rect) {
        self.unlink(slot);
        let range = self.cell_range(rect);
        let mut cells = SmallVec::new();
        if Self::cell_count(range) > MAX_CELLS_PER_ENTRY {
            self.oversized.push(slot);
        } else {
            let ((cx0, cy0), (cx1, cy1)) = range;
            for cy in cy0..=cy1 {
                for cx in cx0..=cx1 {
                    self.cells.entry((cx, cy)).or_default().push(slot);
                    cells.push((cx, cy));
                }
            }
        }
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, None);
        }
        self.slots[slot] = Some(GridSlot { rect, cells });
    }

    fn update(&mut self, slot: usize, rect: Rect) {
        self.insert(slot, rect);
    }

    fn remove(&mut self, slot: usize) {
        self.unlink(slot);
    }

    fn clear(&mut self) {
        self.cells.clear();
        self.oversized.clear();
        self.slots.clear();
    }

    fn visit_point<F: FnMut(usize)>(&self, point: Point, mut f: F) {
        let cell = (self.coord(point.x), self.coord(point.y));
        let bucketed = self.cells.get(&cell).map(|l| l.as_slice()).unwrap_or_default();
        for &slot in bucketed.iter().chain(&self.oversized) {
            if let Some(Some(entry)) = self.slots.get(slot)
                && touches_point(entry.rect, point)
            {
                f(slot);
            }
        }
    }

    fn visit_rect<F: FnMut(usize)>(&self, rect: Rect, mut f: F) {
        let range = self.cell_range(rect);
        if Self::cell_count(range) > MAX_CELLS_PER_ENTRY {
            for (slot, entry) in self.slots.iter().enumerate() {
                if let Some(entry) = entry
                    && touches(entry.rect, rect)
                {
                    f(slot);
                }
            }
            return;
        }
        for &slot in &self.oversized {
            if let Some(Some(entry)) = self.slots.get(slot)
                && touches(entry.rect, rect)
            {
                f(slot);
            }
        }
        let ((cx0, cy0), (cx1, cy1)) = range;
        let mut seen: SmallVec<[usize; 16]> = SmallVec::new();
        for cy in cy0..=cy1 {
            for cx in cx0..=cx1 {
                let Some(list) = self.cells.get(&(cx, cy)) else {
                    continue;
                };
                for &slot in list {
                    if seen.contains(&slot) {
                        continue;
                    }
                    seen.push(slot);
                    if let Some(Some(entry)) = self.slots.get(slot)
                        && touches(entry.rect, rect)
                    {
                        f(slot);
                    }
                }
            }
        }
    }
}

/// Generational handle for index entries.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Key(u32, u32);

impl Key {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Index keys are 32-bit, matching region ids."
    )]
    const fn new(idx: usize, generation: u32) -> Self {
        Self(idx as u32, generation)
    }

    const fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Coarse repaint information produced by [`SpatialIndex::commit`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Damage {
    /// Rectangles of newly indexed entries.
    pub added: Vec<Rect>,
    /// Rectangles of entries removed from the index.
    pub removed: Vec<Rect>,
    /// Old/new rectangle pairs for entries that moved or resized.
    pub moved: Vec<(Rect, Rect)>,
}

impl Damage {
    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.moved.is_empty()
    }

    /// The union of every damaged rectangle, if any.
    pub fn union(&self) -> Option<Rect> {
        let mut it = self
            .added
            .iter()
            .chain(self.removed.iter())
            .copied()
            .chain(self.moved.iter().flat_map(|(a, b)| [*a, *b]));
        let first = it.next()?;
        Some(it.fold(first, |acc, r| acc.union(r)))
    }

    /// Append `other` to this damage set.
    pub fn extend(&mut self, other: Self) {
        self.added.extend(other.added);
        self.removed.extend(other.removed);
        self.moved.extend(other.moved);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Mark {
    Added,
    Updated,
    Removed,
}

#[derive(Clone, Debug)]
struct Entry<P> {
    generation: u32,
    rect: Rect,
    payload: P,
    mark: Option<Mark>,
    prev_rect: Option<Rect>,
}

/// Rectangle index with payloads, generic over the spatial [`Backend`].
#[derive(Debug)]
pub struct SpatialIndex<P: Copy + Debug, B: Backend = FlatVec> {
    entries: Vec<Option<Entry<P>>>,
    generations: Vec<u32>,
    free_list: Vec<usize>,
    backend: B,
}

impl<P: Copy + Debug, B: Backend + Default> Default for SpatialIndex<P, B> {
    fn default() -> Self {
        Self::with_backend(B::default())
    }
}

impl<P: Copy + Debug, B: Backend> SpatialIndex<P, B> {
    /// Create an empty index using an explicit backend instance.
    pub fn with_backend(backend: B) -> Self {
        Self {
            entries: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            backend,
        }
    }

    /// Insert a rectangle with a payload.
    pub fn insert(&mut self, rect: Rect, payload: P) -> Key {
        let entry = |generation| Entry {
            generation,
            rect,
            payload,
            mark: Some(Mark::Added),
            prev_rect: None,
        };
        if let Some(idx) = self.free_list.pop() {
            let generation = self.generations[idx].saturating_add(1);
            self.generations[idx] = generation;
            self.entries[idx] = Some(entry(generation));
            Key::new(idx, generation)
        } else {
            self.entries.push(Some(entry(1)));
            self.generations.push(1);
            Key::new(self.entries.len() - 1, 1)
        }
    }

    /// Replace the rectangle of a live entry.
    pub fn update(&mut self, key: Key, rect: Rect) {
        if let Some(e) = self.entry_mut(key) {
            match e.mark {
                None => {
                    e.prev_rect = Some(e.rect);
                    e.mark = Some(Mark::Updated);
                }
                Some(Mark::Removed) => return,
                Some(Mark::Added | Mark::Updated) => {}
            }
            e.rect = rect;
        }
    }

    /// Remove a live entry.
    pub fn remove(&mut self, key: Key) {
        let Some(e) = self.entry_mut(key) else {
            return;
        };
        if e.mark == Some(Mark::Added) {
            self.entries[key.idx()] = None;
            self.free_list.push(key.idx());
        } else {
            if let Some(prev) = e.prev_rect.take() {
                e.rect = prev;
            }
            e.mark = Some(Mark::Removed);
        }
    }

    /// Drop every entry without reporting damage.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.generations.clear();
        self.free_list.clear();
        self.backend.clear();
    }

    /// Apply pending changes to the backend and report what moved.
    pub fn commit(&mut self) -> Damage {
        let mut damage = Damage::default();
        for i in 0..self.entries.len() {
            let Some(entry) = self.entries[i].as_mut() else {
                continue;
            };
            match entry.mark.take() {
                Some(Mark::Added) => {
                    self.backend.insert(i, entry.rect);
                    damage.added.push(entry.rect);
                }
                Some(Mark::Updated) => {
                    self.backend.update(i, entry.rect);
                    if let Some(prev) = entry.prev_rect.take()
                        && prev != entry.rect
                    {
                        damage.moved.push((prev, entry.rect));
                    }
                }
                Some(Mark::Removed) => {
                    self.backend.remove(i);
                    damage.removed.push(entry.rect);
                    self.entries[i] = None;
                    self.free_list.push(i);
                }
                None => {}
            }
        }
        damage
    }

    /// Payloads of committed entries whose rectangle contains `point` (edges inclusive).
    pub fn query_point(&self, point: Point) -> Vec<P> {
        let mut out = Vec::new();
        self.backend.visit_point(point, |i| {
            if let Some(Some(e)) = self.entries.get(i) {
                out.push(e.payload);
            }
        });
        out
    }

    /// Payloads of committed entries whose rectangle overlaps `rect` (edges inclusive).
    pub fn query_rect(&self, rect: Rect) -> Vec<P> {
        let mut out = Vec::new();
        self.backend.visit_rect(rect, |i| {
            if let Some(Some(e)) = self.entries.get(i) {
                out.push(e.payload);
            }
        });
        out
    }

    /// Number of live entries, including ones not yet committed.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    /// Whether the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry_mut(&mut self, key: Key) -> Option<&mut Entry<P>> {
        let e = self.entries.get_mut(key.idx())?.as_mut()?;
        if e.generation != key.1 {
            return None;
        }
        Some(e)
    }
}

impl<P: Copy + Debug> SpatialIndex<P, FlatVec> {
    /// Create an empty index with the flat-vector backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<P: Copy + Debug> SpatialIndex<P, Grid> {
    /// Create an empty index with a uniform grid backend.
    pub fn with_grid(cell_size: f64) -> Self {
        Self::with_backend(Grid::new(cell_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise<B: Backend>(mut idx: SpatialIndex<u32, B>) {
        let a = idx.insert(Rect::new(0.0, 0.0, 10.0, 10.0), 1);
        let _b = idx.insert(Rect::new(5.0, 5.0, 150.0, 150.0), 2);
        assert!(idx.query_point(Point::new(1.0, 1.0)).is_empty(), "uncommitted");
        let dmg = idx.commit();
        assert_eq!(dmg.added.len(), 2);

        let mut hits = idx.query_point(Point::new(6.0, 6.0));
        hits.sort_unstable();
        assert_eq!(hits, vec![1, 2]);

        idx.update(a, Rect::new(200.0, 200.0, 210.0, 210.0));
        let dmg = idx.commit();
        assert_eq!(
            dmg.moved,
            vec![(
                Rect::new(0.0, 0.0, 10.0, 10.0),
                Rect::new(200.0, 200.0, 210.0, 210.0)
            )]
        );
        assert_eq!(idx.query_point(Point::new(1.0, 1.0)), Vec::<u32>::new());
        assert_eq!(idx.query_rect(Rect::new(199.0, 199.0, 201.0, 201.0)), vec![1]);

        idx.remove(a);
        let dmg = idx.commit();
        assert_eq!(dmg.removed.len(), 1);
        assert!(idx.query_rect(Rect::new(199.0, 199.0, 201.0, 201.0)).is_empty());
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn flatvec_insert_update_remove() {
        exercise(SpatialIndex::new());
    }

    #[test]
    fn grid_insert_update_remove() {
        exercise(SpatialIndex::with_grid(32.0));
    }

    #[test]
    fn added_then_removed_before_commit_is_silent() {
        let mut idx: SpatialIndex<u32> = SpatialIndex::new();
        let k = idx.insert(Rect::new(0.0, 0.0, 1.0, 1.0), 7);
        idx.remove(k);
        assert!(idx.commit().is_empty());
    }

    #[test]
    fn stale_key_is_ignored() {
        let mut idx: SpatialIndex<u32> = SpatialIndex::new();
        let k = idx.insert(Rect::new(0.0, 0.0, 1.0, 1.0), 7);
        let _ = idx.commit();
        idx.remove(k);
        let _ = idx.commit();
        let _reused = idx.insert(Rect::new(0.0, 0.0, 2.0, 2.0), 8);
        let _ = idx.commit();
        idx.update(k, Rect::new(50.0, 50.0, 60.0, 60.0));
        assert!(idx.commit().is_empty(), "stale key must not touch the reused slot");
        assert_eq!(idx.query_point(Point::new(1.5, 1.5)), vec![8]);
    }

    #[test]
    fn grid_handles_negative_coordinates() {
        let mut idx = SpatialIndex::with_grid(10.0);
        let _ = idx.insert(Rect::new(-25.0, -25.0, -15.0, -15.0), 3_u32);
        let _ = idx.commit();
        assert_eq!(idx.query_point(Point::new(-20.0, -20.0)), vec![3]);
    }

    #[test]
    fn grid_keeps_huge_entries_out_of_the_cell_map() {
        let mut grid = Grid::new(1.0);
        grid.insert(0, Rect::new(-1.0e9, -1.0e9, 1.0e9, 1.0e9));
        grid.insert(1, Rect::new(5.0, 5.0, 6.0, 6.0));
        assert!(grid.cells.len() <= 4, "only the small entry is bucketed");
        assert_eq!(grid.oversized, vec![0]);

        let mut hits = Vec::new();
        grid.visit_point(Point::new(5.5, 5.5), |s| hits.push(s));
        hits.sort_unstable();
        assert_eq!(hits, vec![0, 1]);

        // A query as large as the entry scans slots instead of cells.
        let mut hits = Vec::new();
        grid.visit_rect(Rect::new(-1.0e8, -1.0e8, 1.0e8, 1.0e8), |s| hits.push(s));
        hits.sort_unstable();
        assert_eq!(hits, vec![0, 1]);

        grid.update(0, Rect::new(100.0, 100.0, 101.0, 101.0));
        assert!(grid.oversized.is_empty());
        let mut hits = Vec::new();
        grid.visit_rect(Rect::new(99.0, 99.0, 102.0, 102.0), |s| hits.push(s));
        assert_eq!(hits, vec![0]);

        grid.update(1, Rect::new(0.0, 0.0, 1.0e6, 1.0e6));
        grid.remove(1);
        assert!(grid.oversized.is_empty());
        let mut hits = Vec::new();
        grid.visit_point(Point::new(5.5, 5.5), |s| hits.push(s));
        assert!(hits.is_empty());
    }
}
