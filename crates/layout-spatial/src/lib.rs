//! Uniform-grid obstacle index (spec.md §4.3).
//!
//! Each shape's bounding box is bucketed into every grid cell it overlaps;
//! a query returns the union of buckets its own bbox touches, so a caller
//! sees roughly constant candidates per query instead of scanning every
//! shape in the diagram. Built fresh per pass that needs it (element
//! avoidance, §4.8) and dropped when that pass returns — never persisted
//! across passes (spec.md §5 "Shared resource policy").

use layout_geom::Rect;
use layout_model::Id;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cell size calibrated to a typical flow-node footprint (task ≈ 100×80).
pub const CELL_SIZE: f64 = 120.0;

type CellKey = (i64, i64);

#[derive(Debug, Default)]
pub struct SpatialIndexMetrics {
    queries: AtomicU64,
    candidates_returned: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SpatialIndexMetricsSnapshot {
    pub queries: u64,
    pub candidates_returned: u64,
}

impl SpatialIndexMetrics {
    pub fn snapshot(&self) -> SpatialIndexMetricsSnapshot {
        SpatialIndexMetricsSnapshot {
            queries: self.queries.load(Ordering::Relaxed),
            candidates_returned: self.candidates_returned.load(Ordering::Relaxed),
        }
    }
}

/// A grid of shape-id buckets built once and queried many times within a
/// single pass.
#[derive(Debug, Default)]
pub struct SpatialIndex {
    cell_size: f64,
    buckets: HashMap<CellKey, Vec<Id>>,
    metrics: SpatialIndexMetrics,
}

impl SpatialIndex {
    pub fn build(shapes: &[(Id, Rect)]) -> Self {
        Self::build_with_cell_size(shapes, CELL_SIZE)
    }

    pub fn build_with_cell_size(shapes: &[(Id, Rect)], cell_size: f64) -> Self {
        let mut buckets: HashMap<CellKey, Vec<Id>> = HashMap::new();
        for &(id, rect) in shapes {
            for key in cells_touched(&rect, cell_size) {
                buckets.entry(key).or_default().push(id);
            }
        }
        tracing::trace!(
            target: "spatial.index",
            shapes = shapes.len(),
            buckets = buckets.len(),
            "built"
        );
        Self {
            cell_size,
            buckets,
            metrics: SpatialIndexMetrics::default(),
        }
    }

    /// Union of every bucket `bbox` touches, deduplicated, in first-seen
    /// order (stable and cheap for the small candidate sets this index is
    /// sized for).
    pub fn get_candidates(&self, bbox: &Rect) -> Vec<Id> {
        self.metrics.queries.fetch_add(1, Ordering::Relaxed);
        let mut seen = Vec::new();
        for key in cells_touched(bbox, self.cell_size) {
            if let Some(ids) = self.buckets.get(&key) {
                for &id in ids {
                    if !seen.contains(&id) {
                        seen.push(id);
                    }
                }
            }
        }
        self.metrics
            .candidates_returned
            .fetch_add(seen.len() as u64, Ordering::Relaxed);
        seen
    }

    pub fn metrics(&self) -> SpatialIndexMetricsSnapshot {
        self.metrics.snapshot()
    }
}

fn cells_touched(rect: &Rect, cell_size: f64) -> Vec<CellKey> {
    let min_cx = (rect.left() / cell_size).floor() as i64;
    let max_cx = (rect.right() / cell_size).floor() as i64;
    let min_cy = (rect.top() / cell_size).floor() as i64;
    let max_cy = (rect.bottom() / cell_size).floor() as i64;
    let mut out = Vec::new();
    for cx in min_cx..=max_cx {
        for cy in min_cy..=max_cy {
            out.push((cx, cy));
        }
    }
    out
}
