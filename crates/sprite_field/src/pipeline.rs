//! The per-frame pipeline.
//!
//! Stage order is fixed: field update (with the depth-range reduction), the
//! auto-center pan step, the depth bucket sort, and finally either one batch
//! submission or the sequential fallback. Every parallel stage runs on the
//! pipeline's worker pool and ends at a join before the next one starts.

use crate::arena::{ArenaCapacity, FrameArena};
use crate::batch::{fill_batch, submit};
use crate::center::PanSmoother;
use crate::config::{FieldConfig, ResolvedField, Viewport};
use crate::coords::CoordinateCache;
use crate::error::{FieldError, Result, SubmitError};
use crate::fallback::render_sequential;
use crate::field::{update_field, DepthRange, DrawSample, FrameKernel};
use crate::sort::{bucket_sort, BinTable, DrawOrder};
use crate::sprite::{pixel_radius, SpriteImage};
use crate::surface::DrawSurface;
use crate::workers::{ThreadPolicy, WorkerPool};
use glam::Vec2;
use std::fmt;
use std::time::{Duration, Instant};

/// Timings and summary values of one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    pub samples: usize,
    pub threads: usize,
    pub depth: DepthRange,
    pub pan: Vec2,
    pub update: Duration,
    pub center: Duration,
    pub sort: Duration,
    pub draw: Duration,
}

/// Why a frame was drawn with per-sprite blits instead of a batch.
#[derive(Debug)]
pub enum FallbackReason {
    /// The surface refused the batch.
    Submit(SubmitError),
    /// The batch buffers could not be sized.
    Geometry(FieldError),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::Submit(e) => write!(f, "{}", e),
            FallbackReason::Geometry(e) => write!(f, "{}", e),
        }
    }
}

#[derive(Debug)]
pub enum FrameOutcome {
    /// All sprites went out in one batch.
    Batched { sprites: usize },
    /// Sprites were blitted one by one.
    Sequential {
        sprites: usize,
        reason: FallbackReason,
    },
    /// The frame was not drawn; the pipeline retries on the next frame.
    Skipped(FieldError),
    /// Nothing to draw.
    Empty,
}

impl FrameOutcome {
    /// Sprites drawn this frame.
    pub fn sprites(&self) -> usize {
        match self {
            FrameOutcome::Batched { sprites } | FrameOutcome::Sequential { sprites, .. } => {
                *sprites
            }
            FrameOutcome::Skipped(_) | FrameOutcome::Empty => 0,
        }
    }

    pub fn is_batched(&self) -> bool {
        matches!(self, FrameOutcome::Batched { .. })
    }
}

#[derive(Debug)]
pub struct FrameReport {
    pub stats: FrameStats,
    pub outcome: FrameOutcome,
}

/// Owns every buffer, cache and worker the frame loop needs.
pub struct FieldPipeline {
    config: FieldConfig,
    field: ResolvedField,
    viewport: Viewport,
    coords: CoordinateCache,
    arena: FrameArena,
    pan: PanSmoother,
    sprite: SpriteImage,
    workers: WorkerPool,
    range: DepthRange,
    /// Set once the update and sort stages of the current frame succeeded.
    ready: bool,
    /// Set when the configuration changed since it was last resolved.
    dirty: bool,
}

impl FieldPipeline {
    pub fn new(config: FieldConfig, viewport: Viewport, policy: ThreadPolicy) -> Result<Self> {
        let field = config.resolve(viewport)?;
        let workers = WorkerPool::new(policy, field.samples())?;
        let radius = pixel_radius(field.base_radius);
        let sprite = workers.install(|| SpriteImage::new(radius))?;
        let arena = FrameArena::new(field.bins);

        log::debug!(
            "pipeline: grid {}x{} ({} samples), base radius {:.2}, {} bins, {} threads",
            field.grid.x,
            field.grid.y,
            field.samples(),
            field.base_radius,
            field.bins,
            workers.threads()
        );

        Ok(Self {
            config,
            field,
            viewport,
            coords: CoordinateCache::new(),
            arena,
            pan: PanSmoother::new(),
            sprite,
            workers,
            range: DepthRange::EMPTY,
            ready: false,
            dirty: false,
        })
    }

    /// Replaces the configuration; it takes effect on the next update.
    pub fn set_config(&mut self, config: FieldConfig) {
        self.config = config;
        self.dirty = true;
    }

    /// Re-resolves the configuration against `viewport`.
    fn reconfigure(&mut self, viewport: Viewport) -> Result<()> {
        let field = self.config.resolve(viewport)?;
        if field.grid != self.field.grid {
            log::debug!(
                "grid changed: {}x{} -> {}x{}",
                self.field.grid.x,
                self.field.grid.y,
                field.grid.x,
                field.grid.y
            );
        }

        let radius = pixel_radius(field.base_radius);
        let sprite = &mut self.sprite;
        self.workers.install(|| sprite.ensure_radius(radius))?;
        self.arena.set_bin_count(field.bins);
        self.field = field;
        self.viewport = viewport;
        self.dirty = false;
        Ok(())
    }

    /// Runs the update, auto-center and sort stages for time `t`.
    ///
    /// On error the frame must not be rendered; buffers stay valid and the
    /// next call starts over.
    pub fn update(&mut self, t: f32, viewport: Viewport) -> Result<FrameStats> {
        self.ready = false;

        let viewport = viewport.validate()?;
        if self.dirty || viewport != self.viewport {
            self.reconfigure(viewport)?;
        }

        let n = self.field.samples();
        self.workers.adapt(n)?;

        let Self {
            field,
            coords,
            arena,
            pan,
            workers,
            ..
        } = self;

        workers.install(|| coords.refresh(field.grid, field.span))?;
        arena.prepare(n)?;

        let started = Instant::now();
        let kernel = FrameKernel::new(field, viewport, t);
        let range = workers.install(|| {
            update_field(coords, &kernel, &mut arena.samples, &mut arena.depth)
        });
        let update = started.elapsed();

        let started = Instant::now();
        let target = workers.install(|| {
            PanSmoother::target(&arena.samples, viewport, field.pan, field.auto_center)
        });
        let smoothed = pan.step(target);
        let center = started.elapsed();

        let started = Instant::now();
        let FrameArena {
            depth,
            bins,
            bin_of,
            order,
            ..
        } = arena;
        workers.install(|| bucket_sort(depth, range, bins, bin_of, order));
        let sort = started.elapsed();

        self.range = range;
        self.ready = true;

        Ok(FrameStats {
            samples: n,
            threads: self.workers.threads(),
            depth: range,
            pan: smoothed,
            update,
            center,
            sort,
            draw: Duration::ZERO,
        })
    }

    /// Draws the last updated frame: one batch, or per-sprite blits when the
    /// batch cannot be built or the surface refuses it.
    pub fn render<S: DrawSurface + ?Sized>(&mut self, surface: &mut S) -> FrameOutcome {
        if !self.ready {
            return FrameOutcome::Empty;
        }
        let n = self.arena.order.len();
        if n == 0 {
            return FrameOutcome::Empty;
        }

        let pan = self.pan.pan();
        let reason = match self.arena.prepare_geometry(n) {
            Ok(()) => {
                let FrameArena {
                    samples,
                    order,
                    vertices,
                    indices,
                    ..
                } = &mut self.arena;
                let draw_order = DrawOrder::new(order);
                self.workers
                    .install(|| fill_batch(draw_order, samples, pan, vertices, indices));

                match submit(surface, &self.sprite, vertices, indices) {
                    Ok(()) => return FrameOutcome::Batched { sprites: n },
                    Err(e) => FallbackReason::Submit(e),
                }
            }
            Err(e) => FallbackReason::Geometry(e),
        };

        log::warn!("batched draw unavailable ({}), blitting {} sprites", reason, n);
        let sprites = render_sequential(
            surface,
            &self.sprite,
            self.arena.order(),
            &self.arena.samples,
            pan,
        );
        FrameOutcome::Sequential { sprites, reason }
    }

    /// One full frame: update, then render. A failed update skips the draw.
    pub fn frame<S: DrawSurface + ?Sized>(
        &mut self,
        t: f32,
        viewport: Viewport,
        surface: &mut S,
    ) -> FrameReport {
        let mut stats = match self.update(t, viewport) {
            Ok(stats) => stats,
            Err(e) => {
                log::warn!("frame skipped: {}", e);
                return FrameReport {
                    stats: FrameStats::default(),
                    outcome: FrameOutcome::Skipped(e),
                };
            }
        };

        let started = Instant::now();
        let outcome = self.render(surface);
        stats.draw = started.elapsed();

        log::trace!(
            "frame t={:.3}: {} samples on {} threads, update {:?}, center {:?}, sort {:?}, draw {:?}",
            t,
            stats.samples,
            stats.threads,
            stats.update,
            stats.center,
            stats.sort,
            stats.draw
        );

        FrameReport { stats, outcome }
    }

    pub fn field(&self) -> &ResolvedField {
        &self.field
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn samples(&self) -> &[DrawSample] {
        &self.arena.samples
    }

    pub fn depths(&self) -> &[f32] {
        &self.arena.depth
    }

    pub fn bin_of(&self) -> &[u32] {
        &self.arena.bin_of
    }

    pub fn bins(&self) -> &BinTable {
        &self.arena.bins
    }

    pub fn order(&self) -> DrawOrder<'_> {
        self.arena.order()
    }

    pub fn depth_range(&self) -> DepthRange {
        self.range
    }

    pub fn pan(&self) -> Vec2 {
        self.pan.pan()
    }

    pub fn sprite(&self) -> &SpriteImage {
        &self.sprite
    }

    pub fn threads(&self) -> usize {
        self.workers.threads()
    }

    pub fn capacities(&self) -> ArenaCapacity {
        self.arena.capacities()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Vertex;
    use crate::canvas::Canvas;
    use crate::sprite::MAX_SPRITE_RADIUS;
    use crate::surface::Rect;

    /// Records what reaches the surface; optionally refuses every batch.
    #[derive(Default)]
    struct RecordingSurface {
        reject: bool,
        batches: Vec<(Vec<Vertex>, Vec<u32>)>,
        blits: Vec<(Rect, [u8; 3], u8)>,
    }

    impl RecordingSurface {
        fn rejecting() -> Self {
            Self {
                reject: true,
                ..Self::default()
            }
        }
    }

    impl DrawSurface for RecordingSurface {
        fn submit_batch(
            &mut self,
            _: &SpriteImage,
            vertices: &[Vertex],
            indices: &[u32],
        ) -> std::result::Result<(), SubmitError> {
            if self.reject {
                return Err(SubmitError::Rejected("test surface".into()));
            }
            self.batches.push((vertices.to_vec(), indices.to_vec()));
            Ok(())
        }

        fn blit(&mut self, _: &SpriteImage, dest: Rect, color_mod: [u8; 3], alpha_mod: u8) {
            self.blits.push((dest, color_mod, alpha_mod));
        }
    }

    fn small_config() -> FieldConfig {
        FieldConfig {
            grid_x: 12,
            grid_y: 8,
            tilt_x_deg: -30.0,
            tilt_y_deg: 20.0,
            ..FieldConfig::default()
        }
    }

    fn pipeline(config: FieldConfig) -> FieldPipeline {
        FieldPipeline::new(config, Viewport::new(320, 240), ThreadPolicy::Fixed(2)).unwrap()
    }

    fn assert_sorted_permutation(p: &FieldPipeline) {
        let order = p.order().to_vec();
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..p.samples().len()).collect::<Vec<_>>());

        let bins = p.bin_of();
        for pair in order.windows(2) {
            assert!(bins[pair[0]] <= bins[pair[1]]);
        }
    }

    #[test]
    fn frame_submits_one_batch_in_draw_order() {
        let mut p = pipeline(small_config());
        let mut surface = RecordingSurface::default();

        let report = p.frame(0.5, Viewport::new(320, 240), &mut surface);
        assert!(report.outcome.is_batched());
        assert_eq!(report.outcome.sprites(), 96);
        assert_eq!(report.stats.samples, 96);
        assert!(report.stats.depth.min <= report.stats.depth.max);

        assert_eq!(surface.batches.len(), 1);
        assert!(surface.blits.is_empty());
        let (vertices, indices) = &surface.batches[0];
        assert_eq!(vertices.len(), 96 * 4);
        assert_eq!(indices.len(), 96 * 6);

        // First quad belongs to the first sample in draw order.
        let first = p.samples()[p.order().get(0)];
        assert_eq!(vertices[0].color, first.rgba);
        assert_sorted_permutation(&p);
    }

    #[test]
    fn rejected_batch_falls_back_to_blits_in_the_same_order() {
        let mut p = pipeline(small_config());
        let mut surface = RecordingSurface::rejecting();

        let report = p.frame(1.0, Viewport::new(320, 240), &mut surface);
        match &report.outcome {
            FrameOutcome::Sequential { sprites, reason } => {
                assert_eq!(*sprites, 96);
                assert!(matches!(reason, FallbackReason::Submit(SubmitError::Rejected(_))));
            }
            other => panic!("expected fallback, got {:?}", other),
        }

        assert!(surface.batches.is_empty());
        assert_eq!(surface.blits.len(), 96);
        for (q, (_, color, alpha)) in surface.blits.iter().enumerate() {
            let sample = p.samples()[p.order().get(q)];
            assert_eq!(*color, [sample.rgba[0], sample.rgba[1], sample.rgba[2]]);
            assert_eq!(*alpha, sample.rgba[3]);
        }
    }

    #[test]
    fn canvas_without_batches_renders_sequentially() {
        let mut p = pipeline(small_config());
        let mut canvas = Canvas::new(320, 240).with_batch_support(false);

        let report = p.frame(0.0, Viewport::new(320, 240), &mut canvas);
        assert!(matches!(
            report.outcome,
            FrameOutcome::Sequential {
                reason: FallbackReason::Submit(SubmitError::Unsupported),
                ..
            }
        ));
        assert_eq!(canvas.stats().blits, 96);
        assert_eq!(canvas.stats().batches, 0);
    }

    #[test]
    fn empty_viewport_skips_the_frame_and_recovers() {
        let mut p = pipeline(small_config());
        let mut surface = RecordingSurface::default();

        let report = p.frame(0.0, Viewport::new(0, 240), &mut surface);
        assert!(matches!(
            report.outcome,
            FrameOutcome::Skipped(FieldError::InvalidViewport { .. })
        ));
        assert!(surface.batches.is_empty());
        assert!(matches!(p.render(&mut surface), FrameOutcome::Empty));

        let report = p.frame(0.1, Viewport::new(320, 240), &mut surface);
        assert!(report.outcome.is_batched());
    }

    #[test]
    fn buffers_never_shrink_across_grid_changes() {
        let mut p = pipeline(FieldConfig {
            grid_x: 1,
            grid_y: 1,
            ..FieldConfig::default()
        });
        let mut surface = RecordingSurface::default();
        let viewport = Viewport::new(320, 240);

        p.frame(0.0, viewport, &mut surface);
        // Explicit dimensions below 2 are clamped.
        assert_eq!(p.samples().len(), 4);
        let small = p.capacities();

        p.set_config(FieldConfig {
            grid_x: 400,
            grid_y: 250,
            ..FieldConfig::default()
        });
        let report = p.frame(0.0, viewport, &mut surface);
        assert_eq!(report.outcome.sprites(), 100_000);
        assert_sorted_permutation(&p);
        let large = p.capacities();
        assert!(large.dominates(&small));

        p.set_config(small_config());
        p.frame(0.0, viewport, &mut surface);
        assert_eq!(p.samples().len(), 96);
        assert_eq!(p.capacities(), large);
    }

    #[test]
    fn identical_inputs_give_identical_samples() {
        let mut p = pipeline(small_config());
        let viewport = Viewport::new(320, 240);

        p.update(2.25, viewport).unwrap();
        let first = p.samples().to_vec();
        let depths = p.depths().to_vec();
        p.update(2.25, viewport).unwrap();
        assert_eq!(p.samples(), &first[..]);
        assert_eq!(p.depths(), &depths[..]);
    }

    #[test]
    fn disabled_auto_center_settles_on_user_pan() {
        let mut p = pipeline(FieldConfig {
            auto_center: false,
            pan_x: 10.0,
            pan_y: -5.0,
            ..small_config()
        });
        let viewport = Viewport::new(320, 240);
        for frame in 0..60 {
            p.update(frame as f32 / 60.0, viewport).unwrap();
        }
        assert!((p.pan() - Vec2::new(10.0, -5.0)).abs().max_element() < 1e-3);
    }

    #[test]
    fn viewport_change_rederives_auto_radius_only() {
        let mut p = pipeline(small_config());
        let before = p.field().base_radius;
        let generation = p.sprite().generation();

        p.update(0.0, Viewport::new(1280, 960)).unwrap();
        assert!(p.field().base_radius > before);
        assert!(p.sprite().generation() > generation);
        assert_eq!(p.viewport(), Viewport::new(1280, 960));

        let mut fixed = pipeline(FieldConfig {
            base_radius: 3.0,
            ..small_config()
        });
        fixed.update(0.0, Viewport::new(1280, 960)).unwrap();
        assert_eq!(fixed.field().base_radius, 3.0);
        assert_eq!(fixed.sprite().radius(), 3);
    }

    #[test]
    fn impossible_grid_skips_the_frame_and_recovers() {
        let mut p = pipeline(FieldConfig {
            grid_x: u32::MAX,
            grid_y: u32::MAX,
            ..FieldConfig::default()
        });
        let mut surface = RecordingSurface::default();
        let viewport = Viewport::new(320, 240);

        let report = p.frame(0.0, viewport, &mut surface);
        assert!(matches!(
            report.outcome,
            FrameOutcome::Skipped(FieldError::Alloc { .. })
        ));
        assert!(surface.batches.is_empty());
        assert!(surface.blits.is_empty());

        p.set_config(small_config());
        let report = p.frame(0.1, viewport, &mut surface);
        assert!(report.outcome.is_batched());
        assert_eq!(report.outcome.sprites(), 96);
        assert_eq!(surface.batches.len(), 1);
    }

    #[test]
    fn huge_base_radius_is_clamped_for_the_sprite() {
        let mut p = pipeline(FieldConfig {
            base_radius: 3.0e9,
            ..small_config()
        });
        assert_eq!(p.sprite().radius(), MAX_SPRITE_RADIUS);

        let mut surface = RecordingSurface::default();
        let report = p.frame(0.0, Viewport::new(320, 240), &mut surface);
        assert!(report.outcome.is_batched());
    }

    #[test]
    fn depth_range_matches_the_reported_stats() {
        let mut p = pipeline(small_config());
        assert!(p.depth_range().is_empty());

        let stats = p.update(0.75, Viewport::new(320, 240)).unwrap();
        assert_eq!(p.depth_range(), stats.depth);
        assert!(p
            .depths()
            .iter()
            .all(|&z| z >= stats.depth.min && z <= stats.depth.max));
    }

    #[test]
    fn bin_counts_cover_every_sample() {
        let mut p = pipeline(small_config());
        p.update(0.0, Viewport::new(320, 240)).unwrap();
        assert_sorted_permutation(&p);
        let total: u32 = (0..p.bins().len()).map(|b| p.bins().count(b)).sum();
        assert_eq!(total, 96);
    }
}
