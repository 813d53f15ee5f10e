//! Coordinate cache: world-space XY of every grid cell.
//!
//! The lattice is a pure function of grid size and world span, so it is
//! computed once and reused until either changes.

use crate::arena::ensure_len;
use crate::config::GridDims;
use crate::error::Result;
use glam::Vec2;
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
struct LatticeKey {
    grid: GridDims,
    span: Vec2,
}

#[derive(Debug, Default)]
pub struct CoordinateCache {
    xs: Vec<f32>,
    ys: Vec<f32>,
    key: Option<LatticeKey>,
}

impl CoordinateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the cache match `grid` and `span`. Returns `true` when the
    /// lattice was recomputed, `false` when the cached one was reused.
    pub fn refresh(&mut self, grid: GridDims, span: Vec2) -> Result<bool> {
        let key = LatticeKey { grid, span };
        if self.key == Some(key) {
            return Ok(false);
        }

        // Invalidate first so a failed growth never leaves a stale key behind.
        self.key = None;

        let n = grid.samples();
        ensure_len(&mut self.xs, n, "lattice x", || 0.0)?;
        ensure_len(&mut self.ys, n, "lattice y", || 0.0)?;

        let gx = grid.x.max(1) as usize;
        // Divide rather than multiply by a reciprocal: the last cell must
        // land exactly on +span/2.
        let den_x = grid.x.saturating_sub(1).max(1) as f32;
        let den_y = grid.y.saturating_sub(1).max(1) as f32;
        let half = span * 0.5;

        self.xs
            .par_iter_mut()
            .zip(self.ys.par_iter_mut())
            .enumerate()
            .for_each(|(idx, (x, y))| {
                let i = (idx % gx) as f32;
                let j = (idx / gx) as f32;
                let u = (i / den_x) * 2.0 - 1.0;
                let v = (j / den_y) * 2.0 - 1.0;
                *x = u * half.x;
                *y = v * half.y;
            });

        self.key = Some(key);
        log::debug!(
            "lattice recomputed: {}x{} cells, span ({:.3}, {:.3})",
            grid.x,
            grid.y,
            span.x,
            span.y
        );
        Ok(true)
    }

    #[inline]
    pub fn xs(&self) -> &[f32] {
        &self.xs
    }

    #[inline]
    pub fn ys(&self) -> &[f32] {
        &self.ys
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.xs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }
}
