//! Uniform-grid broad phase for collision pairing.
//!
//! Bodies are binned by floor(position / cell) on x/y only (the simulation is
//! effectively 2.5D), then candidate pairs are emitted within each cell and
//! across its 8 neighbors. Amortized O(n) when cell occupancy is bounded.

use std::collections::BTreeMap;

use crate::fixed::Fixed;
use crate::physics::body::{BodyKind, RigidBody};

/// Broad-phase cell size in world units.
const CELL_SIZE: f32 = 0.2;

/// Grid-based spatial hash over body ids.
///
/// An ordered map keeps cell iteration (and therefore pair emission order)
/// identical across runs; a randomized hasher would leak into the order of
/// positional corrections and break replay determinism.
#[derive(Debug, Default)]
pub struct SpatialHashGrid {
    cells: BTreeMap<(i32, i32), Vec<u32>>,
}

impl SpatialHashGrid {
    pub fn new() -> Self {
        Self { cells: BTreeMap::new() }
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    #[inline]
    fn cell_of(x: Fixed, y: Fixed) -> (i32, i32) {
        (
            (x.to_float() / CELL_SIZE).floor() as i32,
            (y.to_float() / CELL_SIZE).floor() as i32,
        )
    }

    /// Rebuild the grid from the body store. Static bodies are skipped; they
    /// never pair.
    pub fn rebuild(&mut self, bodies: &[RigidBody]) {
        self.cells.clear();
        for body in bodies {
            if body.kind == BodyKind::Static {
                continue;
            }
            let key = Self::cell_of(body.position.x, body.position.y);
            self.cells.entry(key).or_default().push(body.id);
        }
    }

    /// Collect candidate pairs in (min-id, max-id) form.
    ///
    /// The 9-cell neighborhood emits some pairs twice; callers sort and
    /// deduplicate before resolution.
    pub fn potential_pairs(&self, out: &mut Vec<(u32, u32)>) {
        out.clear();
        const NEIGHBORS: [(i32, i32); 8] =
            [(-1, 0), (1, 0), (0, -1), (0, 1), (-1, -1), (-1, 1), (1, -1), (1, 1)];

        for (&key, ids) in &self.cells {
            // Within-cell pairs
            for i in 0..ids.len() {
                for j in (i + 1)..ids.len() {
                    let (a, b) = (ids[i], ids[j]);
                    out.push((a.min(b), a.max(b)));
                }
            }
            // Across neighbor cells
            for (dx, dy) in NEIGHBORS {
                let Some(other) = self.cells.get(&(key.0 + dx, key.1 + dy)) else {
                    continue;
                };
                for &a in ids {
                    for &b in other {
                        if a != b {
                            out.push((a.min(b), a.max(b)));
                        }
                    }
                }
            }
        }

        out.sort_unstable();
        out.dedup();
    }

    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }
}
