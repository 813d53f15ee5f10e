//! Capacity arenas: per-frame buffers that are reused across frames.
//!
//! Every buffer grows by 1.5x from an initial 4096 elements and never
//! shrinks; a smaller frame only truncates the logical length. Growth goes
//! through `try_reserve_exact`, so an allocation failure surfaces as
//! [`FieldError::Alloc`] instead of aborting the process.

use crate::batch::{Vertex, INDICES_PER_SPRITE, VERTICES_PER_SPRITE};
use crate::error::{FieldError, Result};
use crate::field::DrawSample;
use crate::sort::{BinTable, DrawOrder};
use std::sync::atomic::AtomicU32;

/// First allocation size of every arena buffer, in elements.
pub const INITIAL_CAPACITY: usize = 4096;

/// Capacity a buffer should grow to so that it holds `needed` elements.
pub fn grown_capacity(current: usize, needed: usize) -> usize {
    if needed <= current {
        return current;
    }

    let mut cap = if current == 0 { INITIAL_CAPACITY } else { current };
    while cap < needed {
        // Saturates at usize::MAX, which then fails in try_reserve.
        cap = cap.saturating_add(cap / 2).max(cap + 1);
    }
    cap
}

/// Resizes `buf` to `len`, growing the allocation with the amortized policy
/// when needed. Existing capacity is never released.
pub fn ensure_len<T>(
    buf: &mut Vec<T>,
    len: usize,
    what: &'static str,
    fill: impl FnMut() -> T,
) -> Result<()> {
    let cap = buf.capacity();
    if len > cap {
        let target = grown_capacity(cap, len);
        buf.try_reserve_exact(target - buf.len())
            .map_err(|source| FieldError::Alloc {
                what,
                requested: target,
                source,
            })?;
        log::debug!("grew {} buffer: capacity {} -> {}", what, cap, buf.capacity());
    }

    buf.resize_with(len, fill);
    Ok(())
}

/// All per-frame buffers owned by the pipeline.
///
/// Stages borrow disjoint fields; nothing here is touched by two stages at
/// once, and all growth happens before the parallel regions start.
pub struct FrameArena {
    pub samples: Vec<DrawSample>,
    pub depth: Vec<f32>,
    pub bin_of: Vec<u32>,
    pub order: Vec<AtomicU32>,
    pub bins: BinTable,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl FrameArena {
    pub fn new(bins: usize) -> Self {
        Self {
            samples: Vec::new(),
            depth: Vec::new(),
            bin_of: Vec::new(),
            order: Vec::new(),
            bins: BinTable::new(bins),
            vertices: Vec::new(),
            indices: Vec::new(),
        }
    }

    /// Sizes the update and sort buffers for `n` samples. The sort indexes
    /// samples with `u32`, so `n` must fit in one.
    pub fn prepare(&mut self, n: usize) -> Result<()> {
        if n > u32::MAX as usize {
            return Err(FieldError::TooManySamples { samples: n });
        }
        ensure_len(&mut self.samples, n, "draw sample", DrawSample::default)?;
        ensure_len(&mut self.depth, n, "depth", || 0.0)?;
        ensure_len(&mut self.bin_of, n, "bin index", || 0)?;
        ensure_len(&mut self.order, n, "draw order", || AtomicU32::new(0))?;
        Ok(())
    }

    /// Sizes the geometry batch for `n` sprites. Kept separate from
    /// [`prepare`](Self::prepare): a failure here only forces the sequential
    /// path, it does not skip the frame.
    pub fn prepare_geometry(&mut self, n: usize) -> Result<()> {
        let vertex_count = n
            .checked_mul(VERTICES_PER_SPRITE)
            .filter(|&v| v <= u32::MAX as usize)
            .ok_or(FieldError::TooManySamples { samples: n })?;

        ensure_len(&mut self.vertices, vertex_count, "vertex", Vertex::default)?;
        ensure_len(&mut self.indices, n * INDICES_PER_SPRITE, "index", || 0)?;
        Ok(())
    }

    /// Replaces the bin table when the configured bin count changes.
    pub fn set_bin_count(&mut self, bins: usize) {
        if self.bins.len() != bins.max(1) {
            self.bins = BinTable::new(bins);
        }
    }

    pub fn order(&self) -> DrawOrder<'_> {
        DrawOrder::new(&self.order)
    }

    /// Current capacities, in elements, of the growable buffers.
    pub fn capacities(&self) -> ArenaCapacity {
        ArenaCapacity {
            samples: self.samples.capacity(),
            depth: self.depth.capacity(),
            bin_of: self.bin_of.capacity(),
            order: self.order.capacity(),
            vertices: self.vertices.capacity(),
            indices: self.indices.capacity(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArenaCapacity {
    pub samples: usize,
    pub depth: usize,
    pub bin_of: usize,
    pub order: usize,
    pub vertices: usize,
    pub indices: usize,
}

impl ArenaCapacity {
    /// True when no buffer in `self` is smaller than in `earlier`.
    pub fn dominates(&self, earlier: &ArenaCapacity) -> bool {
        self.samples >= earlier.samples
            && self.depth >= earlier.depth
            && self.bin_of >= earlier.bin_of
            && self.order >= earlier.order
            && self.vertices >= earlier.vertices
            && self.indices >= earlier.indices
    }
}
