//! Entry point for the headless sprite field runner.

mod args;

use anyhow::{Context, Result};
use args::Args;
use clap::Parser;
use log::info;
use sprite_field::{Canvas, FieldPipeline, FrameOutcome, Viewport};
use std::{
    path::Path,
    time::{Duration, Instant},
};

/// How often the smoothed frame rate is logged.
const FPS_LOG_INTERVAL: Duration = Duration::from_millis(500);

/// Frame-rate estimate blended over log intervals.
#[derive(Default)]
struct FpsMeter {
    frames: u32,
    window_start: Option<Instant>,
    smoothed: f32,
}

impl FpsMeter {
    /// Counts a frame; returns the updated estimate once per interval.
    fn tick(&mut self, now: Instant) -> Option<f32> {
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;

        let elapsed = now.duration_since(start);
        if elapsed < FPS_LOG_INTERVAL {
            return None;
        }

        let measured = self.frames as f32 / elapsed.as_secs_f32();
        self.smoothed = 0.7 * self.smoothed + 0.3 * measured;
        self.frames = 0;
        self.window_start = Some(now);
        Some(self.smoothed)
    }
}

/// Minimum time per frame for a frame-rate cap; `None` runs uncapped.
/// Caps too small to express as a duration are treated as uncapped.
fn frame_budget(fpscap: f32) -> Option<Duration> {
    if fpscap > 0.0 {
        Duration::try_from_secs_f32(1.0 / fpscap).ok()
    } else {
        None
    }
}

#[derive(Default, Debug)]
struct RunSummary {
    frames: u64,
    batched: u64,
    sequential: u64,
    skipped: u64,
}

fn run(args: &Args, pipeline: &mut FieldPipeline, canvas: &mut Canvas) -> RunSummary {
    let viewport = Viewport::new(args.width, args.height);
    let frame_budget = frame_budget(args.fpscap);

    let clock = Instant::now();
    let mut meter = FpsMeter::default();
    let mut summary = RunSummary::default();

    for frame in 0..args.frames {
        let frame_start = Instant::now();
        let t = match args.dt {
            Some(dt) => frame as f32 * dt,
            None => clock.elapsed().as_secs_f32(),
        };

        canvas.clear();
        let report = pipeline.frame(t, viewport, canvas);
        match report.outcome {
            FrameOutcome::Batched { .. } => summary.batched += 1,
            FrameOutcome::Sequential { .. } => summary.sequential += 1,
            FrameOutcome::Skipped(_) => summary.skipped += 1,
            FrameOutcome::Empty => {}
        }
        summary.frames += 1;

        if let Some(fps) = meter.tick(Instant::now()) {
            info!(
                "FPS: {:.1} | {} samples | {} threads | depth [{:.3}, {:.3}] | pan ({:.1}, {:.1})",
                fps,
                report.stats.samples,
                report.stats.threads,
                report.stats.depth.min,
                report.stats.depth.max,
                report.stats.pan.x,
                report.stats.pan.y
            );
        }

        if let Some(budget) = frame_budget {
            let spent = frame_start.elapsed();
            if spent < budget {
                std::thread::sleep(budget - spent);
            }
        }
    }

    summary
}

fn save_snapshot(canvas: &Canvas, path: &Path) -> Result<()> {
    image::save_buffer(
        path,
        canvas.as_bytes(),
        canvas.width(),
        canvas.height(),
        image::ColorType::Rgba8,
    )
    .with_context(|| format!("failed to write snapshot {}", path.display()))?;
    info!("Snapshot written to {}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging; default to "info" if RUST_LOG is unset.
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).init();

    let args = Args::parse();
    let config = args.field_config()?;
    let viewport = Viewport::new(args.width, args.height);

    let mut pipeline = FieldPipeline::new(config, viewport, args.thread_policy())
        .context("failed to set up the field pipeline")?;
    let field = pipeline.field();
    info!(
        "Field {}x{} ({} samples) at {}x{}, base radius {:.2}, {} bins, {} threads",
        field.grid.x,
        field.grid.y,
        field.samples(),
        viewport.width,
        viewport.height,
        field.base_radius,
        field.bins,
        pipeline.threads()
    );

    let mut canvas = Canvas::new(args.width, args.height).with_batch_support(!args.no_batch);
    let summary = run(&args, &mut pipeline, &mut canvas);
    info!(
        "Ran {} frames: {} batched, {} sequential, {} skipped",
        summary.frames, summary.batched, summary.sequential, summary.skipped
    );

    if let Some(path) = &args.snapshot {
        save_snapshot(&canvas, path)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_meter_reports_once_per_interval_and_smooths() {
        let mut meter = FpsMeter::default();
        let t0 = Instant::now();

        assert_eq!(meter.tick(t0), None);
        for i in 1..30 {
            assert_eq!(meter.tick(t0 + Duration::from_millis(i * 10)), None);
        }
        // 51 frames over 0.5 s: 102 fps measured, 30% blended in from zero.
        let mut reported = None;
        for i in 30..=50 {
            reported = reported.or(meter.tick(t0 + Duration::from_millis(i * 10)));
        }
        let fps = reported.unwrap();
        assert!((fps - 0.3 * 102.0).abs() < 0.5);
    }

    #[test]
    fn frame_budget_handles_extreme_caps() {
        assert_eq!(frame_budget(0.0), None);
        assert_eq!(frame_budget(-5.0), None);
        assert_eq!(frame_budget(f32::NAN), None);
        assert_eq!(frame_budget(1e-39), None);
        let budget = frame_budget(50.0).unwrap();
        assert!(budget.abs_diff(Duration::from_millis(20)) < Duration::from_micros(1));
    }

    #[test]
    fn short_run_batches_every_frame() {
        let args = Args::try_parse_from([
            "field_viewer",
            "--grid-x",
            "20",
            "--grid-y",
            "12",
            "--width",
            "160",
            "--height",
            "120",
            "--frames",
            "5",
            "--dt",
            "0.016",
            "--threads",
            "2",
        ])
        .unwrap();
        let viewport = Viewport::new(args.width, args.height);
        let mut pipeline =
            FieldPipeline::new(args.field_config().unwrap(), viewport, args.thread_policy())
                .unwrap();
        let mut canvas = Canvas::new(args.width, args.height);

        let summary = run(&args, &mut pipeline, &mut canvas);
        assert_eq!(summary.frames, 5);
        assert_eq!(summary.batched, 5);
        assert_eq!(canvas.stats().quads, 5 * 240);
    }
}
