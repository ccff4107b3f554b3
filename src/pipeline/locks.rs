//! Per-region mutual exclusion for find-or-create
//!
//! The globe is cut into lock cells: rows of `LOCK_CELL_DEG` latitude, each
//! row split into columns whose width grows with `1 / cos(lat)` so a cell
//! stays roughly square on the ground. A reading locks every cell its search
//! box touches, in sorted order. Two boxes that overlap share a point, and
//! that point's cell is locked by both, so readings that could resolve to the
//! same cluster are serialized while distant readings never contend.
//!
//! Idle cells are dropped from the table when their last holder releases.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::geo::BoundingBox;

/// Lock cell height in degrees of latitude (~1.1 km).
pub const LOCK_CELL_DEG: f64 = 0.01;

/// Lower bound on `cos(lat)` when sizing columns near the poles.
const MIN_COLUMN_COS: f64 = 0.01;

type CellKey = (i64, i64);

/// Table of region mutexes.
#[derive(Default)]
pub struct RegionLocks {
    cells: DashMap<CellKey, Arc<Mutex<()>>>,
}

/// Held region. Releases its cells on drop.
pub struct RegionGuard<'a> {
    locks: &'a RegionLocks,
    held: Vec<(CellKey, OwnedMutexGuard<()>)>,
}

impl RegionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every cell `bbox` touches.
    pub async fn acquire(&self, bbox: &BoundingBox) -> RegionGuard<'_> {
        let mut guard = RegionGuard {
            locks: self,
            held: Vec::new(),
        };

        for key in cells_for(bbox) {
            // Clone out of the map before awaiting so no shard lock is held
            let mutex = Arc::clone(
                &self
                    .cells
                    .entry(key)
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            );
            let held = mutex.lock_owned().await;
            guard.held.push((key, held));
        }

        guard
    }

    /// Number of cells currently tracked.
    pub fn tracked_cells(&self) -> usize {
        self.cells.len()
    }
}

impl Drop for RegionGuard<'_> {
    fn drop(&mut self) {
        for (key, held) in self.held.drain(..) {
            drop(held);
            self.locks
                .cells
                .remove_if(&key, |_, mutex| Arc::strong_count(mutex) == 1);
        }
    }
}

fn row_of(lat: f64) -> i64 {
    (lat / LOCK_CELL_DEG).floor() as i64
}

/// Column width in degrees for a row, sized at its poleward edge.
fn column_width(row: i64) -> f64 {
    let south = row as f64 * LOCK_CELL_DEG;
    let north = south + LOCK_CELL_DEG;
    let edge = south.abs().max(north.abs()).min(90.0);
    LOCK_CELL_DEG / edge.to_radians().cos().max(MIN_COLUMN_COS)
}

fn column_count(width: f64) -> i64 {
    (360.0 / width).ceil() as i64
}

fn column_of(lon: f64, width: f64, count: i64) -> i64 {
    (((lon + 180.0) / width).floor() as i64).clamp(0, count - 1)
}

/// Sorted, de-duplicated cells covered by `bbox`.
fn cells_for(bbox: &BoundingBox) -> Vec<CellKey> {
    let mut cells = Vec::new();

    for row in row_of(bbox.lat_min)..=row_of(bbox.lat_max) {
        let width = column_width(row);
        let count = column_count(width);

        if bbox.lon_min <= -180.0 && bbox.lon_max >= 180.0 {
            cells.extend((0..count).map(|col| (row, col)));
            continue;
        }

        let first = column_of(bbox.lon_min, width, count);
        let last = column_of(bbox.lon_max, width, count);
        if bbox.wraps_antimeridian() {
            cells.extend((first..count).map(|col| (row, col)));
            cells.extend((0..=last).map(|col| (row, col)));
        } else {
            cells.extend((first..=last).map(|col| (row, col)));
        }
    }

    cells.sort_unstable();
    cells.dedup();
    cells
}
