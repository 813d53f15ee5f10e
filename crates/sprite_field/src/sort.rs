//! Depth bucket sort: an O(N) draw order by depth.
//!
//! Depths are quantised into a small fixed number of bins spanning the
//! frame's depth range. Bins are counted with atomic increments, turned into
//! start offsets with a serial O(B) prefix sum, and every sample then claims
//! a slot inside its bin with an atomic fetch-add on the bin's write cursor.
//! Samples sharing a bin come out in scheduling order.

use crate::field::DepthRange;
use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

pub const DEFAULT_BINS: usize = 128;

/// Depth range substituted when a frame is (almost) flat.
pub const MIN_DEPTH_RANGE: f32 = 1e-6;

/// Per-bin population, start offset and write cursor.
///
/// Relaxed atomics are enough: every phase ends at a fork-join barrier
/// before the next one reads the counters.
#[derive(Debug)]
pub struct BinTable {
    counts: Vec<AtomicU32>,
    starts: Vec<u32>,
    cursors: Vec<AtomicU32>,
}

impl BinTable {
    pub fn new(bins: usize) -> Self {
        let bins = bins.max(1);
        Self {
            counts: (0..bins).map(|_| AtomicU32::new(0)).collect(),
            starts: vec![0; bins],
            cursors: (0..bins).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// Samples that landed in bin `b` this frame.
    pub fn count(&self, b: usize) -> u32 {
        self.counts[b].load(Ordering::Relaxed)
    }

    /// First draw-order position of bin `b`.
    pub fn start(&self, b: usize) -> u32 {
        self.starts[b]
    }

    /// Draw-order positions `start..end` occupied by bin `b`.
    pub fn span(&self, b: usize) -> std::ops::Range<usize> {
        let start = self.starts[b] as usize;
        start..start + self.count(b) as usize
    }
}

/// Maps depths onto bin indices for one frame.
#[derive(Debug, Clone, Copy)]
pub struct Binning {
    zmin: f32,
    scale: f32,
    last: i32,
}

impl Binning {
    pub fn new(range: DepthRange, bins: usize) -> Self {
        let mut span = range.max - range.min;
        if !(span >= MIN_DEPTH_RANGE) {
            span = MIN_DEPTH_RANGE;
        }
        let last = bins.max(1) as i32 - 1;
        let zmin = if range.min.is_finite() { range.min } else { 0.0 };

        Self {
            zmin,
            scale: last as f32 / span,
            last,
        }
    }

    /// `round((depth - zmin) / span * (B - 1))`, clamped to `[0, B - 1]`.
    #[inline]
    pub fn bin(&self, depth: f32) -> u32 {
        // `as` saturates and maps NaN to 0.
        let b = ((depth - self.zmin) * self.scale + 0.5) as i32;
        b.clamp(0, self.last) as u32
    }
}

/// Read-only view of the draw order produced by [`bucket_sort`].
#[derive(Clone, Copy)]
pub struct DrawOrder<'a> {
    slots: &'a [AtomicU32],
}

impl<'a> DrawOrder<'a> {
    pub fn new(slots: &'a [AtomicU32]) -> Self {
        Self { slots }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Sample index drawn at position `q`.
    #[inline]
    pub fn get(&self, q: usize) -> usize {
        self.slots[q].load(Ordering::Relaxed) as usize
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = usize> + 'a {
        self.slots.iter().map(|s| s.load(Ordering::Relaxed) as usize)
    }

    pub fn to_vec(&self) -> Vec<usize> {
        self.iter().collect()
    }
}

impl std::fmt::Debug for DrawOrder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Sorts sample indices into ascending bin order.
///
/// `bin_of` and `order` must have the same length as `depth`. The returned
/// order is left in `order`; per-bin statistics stay in `table`.
pub fn bucket_sort(
    depth: &[f32],
    range: DepthRange,
    table: &mut BinTable,
    bin_of: &mut [u32],
    order: &[AtomicU32],
) {
    debug_assert_eq!(depth.len(), bin_of.len());
    debug_assert_eq!(depth.len(), order.len());

    for c in &table.counts {
        c.store(0, Ordering::Relaxed);
    }
    if depth.is_empty() {
        table.starts.fill(0);
        return;
    }

    let binning = Binning::new(range, table.len());

    // 1. Binning.
    bin_of
        .par_iter_mut()
        .zip(depth.par_iter())
        .for_each(|(b, &z)| *b = binning.bin(z));

    // 2. Counting.
    let counts = &table.counts;
    bin_of.par_iter().for_each(|&b| {
        counts[b as usize].fetch_add(1, Ordering::Relaxed);
    });

    // 3. Prefix sum.
    let mut sum = 0u32;
    for ((count, start), cursor) in table
        .counts
        .iter()
        .zip(table.starts.iter_mut())
        .zip(table.cursors.iter())
    {
        *start = sum;
        cursor.store(sum, Ordering::Relaxed);
        sum += count.load(Ordering::Relaxed);
    }
    debug_assert_eq!(sum as usize, depth.len());

    // 4. Scatter.
    let cursors = &table.cursors;
    bin_of.par_iter().enumerate().for_each(|(k, &b)| {
        let pos = cursors[b as usize].fetch_add(1, Ordering::Relaxed);
        order[pos as usize].store(k as u32, Ordering::Relaxed);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sort(depth: &[f32], range: DepthRange, bins: usize) -> (Vec<usize>, Vec<u32>, BinTable) {
        let mut table = BinTable::new(bins);
        let mut bin_of = vec![0u32; depth.len()];
        let order: Vec<AtomicU32> = (0..depth.len()).map(|_| AtomicU32::new(0)).collect();
        bucket_sort(depth, range, &mut table, &mut bin_of, &order);
        (DrawOrder::new(&order).to_vec(), bin_of, table)
    }

    fn assert_permutation(order: &[usize], n: usize) {
        let mut sorted = order.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn two_bins_split_near_and_far_halves() {
        let depth = [1.0, 3.0, 2.0, 0.5];
        let (order, bin_of, table) = sort(&depth, DepthRange::new(0.5, 3.0), 2);

        assert_eq!(bin_of, vec![0, 1, 1, 0]);
        assert_eq!(table.count(0), 2);
        assert_eq!(table.count(1), 2);
        assert_eq!(table.start(1), 2);
        assert_permutation(&order, 4);

        let mut near = order[..2].to_vec();
        let mut far = order[2..].to_vec();
        near.sort_unstable();
        far.sort_unstable();
        assert_eq!(near, vec![0, 3]);
        assert_eq!(far, vec![1, 2]);
    }

    #[test]
    fn flat_frame_lands_in_a_single_bin() {
        let depth = vec![4.25f32; 1000];
        let (order, bin_of, table) = sort(&depth, DepthRange::new(4.25, 4.25), DEFAULT_BINS);

        assert!(bin_of.iter().all(|&b| b == 0));
        assert_eq!(table.count(0), 1000);
        assert_eq!(table.span(0), 0..1000);
        assert_permutation(&order, 1000);
    }

    #[test]
    fn order_is_a_permutation_with_non_decreasing_bins() {
        // Deterministic pseudo-random depths.
        let n = 50_000;
        let mut state = 0x2545_f491u32;
        let depth: Vec<f32> = (0..n)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state % 10_000) as f32 / 1000.0 - 3.0
            })
            .collect();
        let range = depth
            .iter()
            .fold(DepthRange::EMPTY, |r, &z| r.include(z));

        let (order, bin_of, table) = sort(&depth, range, DEFAULT_BINS);
        assert_permutation(&order, n);

        for pair in order.windows(2) {
            assert!(bin_of[pair[0]] <= bin_of[pair[1]]);
        }
        for b in 0..table.len() {
            for q in table.span(b) {
                assert_eq!(bin_of[order[q]] as usize, b);
            }
        }
        // Larger bins hold larger depths.
        for pair in order.windows(2) {
            if bin_of[pair[0]] < bin_of[pair[1]] {
                assert!(depth[pair[0]] <= depth[pair[1]]);
            }
        }
    }

    #[test]
    fn extremes_map_to_first_and_last_bins() {
        let binning = Binning::new(DepthRange::new(-1.0, 1.0), 128);
        assert_eq!(binning.bin(-1.0), 0);
        assert_eq!(binning.bin(1.0), 127);
        assert_eq!(binning.bin(50.0), 127);
        assert_eq!(binning.bin(-50.0), 0);
        assert_eq!(binning.bin(f32::NAN), 0);
    }

    #[test]
    fn empty_input_is_a_no_op() {
        let (order, _, table) = sort(&[], DepthRange::EMPTY, 8);
        assert!(order.is_empty());
        assert!((0..table.len()).all(|b| table.count(b) == 0));
    }
}
