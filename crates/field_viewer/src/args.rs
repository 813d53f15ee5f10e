use anyhow::{Context, Result};
use clap::Parser;
use sprite_field::{FieldConfig, ThreadPolicy};
use std::path::PathBuf;

/// `field_viewer` - Headless runner for the sprite field pipeline.
///
/// Animates the field into an in-memory canvas for a number of frames,
/// logging the smoothed frame rate, and can save the last frame as a PNG.
#[derive(Parser, Debug, Clone)]
#[command(name = "field_viewer", version, about, long_about = None)]
pub struct Args {
    /// Target sample count; the grid is derived from it and the viewport
    /// aspect unless --grid-x/--grid-y are given.
    pub samples: Option<u32>,

    #[arg(long, env = "FIELD_WIDTH", default_value_t = 1280)]
    pub width: u32,

    #[arg(long, env = "FIELD_HEIGHT", default_value_t = 720)]
    pub height: u32,

    /// Fixed worker count. Without it the pool grows with the sample count.
    #[arg(long, env = "FIELD_THREADS")]
    pub threads: Option<usize>,

    /// Upper bound for the adaptive pool (0 = one per core).
    #[arg(long, default_value_t = 0)]
    pub max_threads: usize,

    /// Frame-rate cap; 0 runs uncapped.
    #[arg(long, env = "FIELD_FPSCAP", default_value_t = 0.0)]
    pub fpscap: f32,

    /// Number of frames to run.
    #[arg(long, default_value_t = 600)]
    pub frames: u64,

    /// Fixed animation step in seconds. Without it the wall clock drives the
    /// animation.
    #[arg(long)]
    pub dt: Option<f32>,

    /// JSON file with a field configuration; flags below override it.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub grid_x: Option<u32>,

    #[arg(long)]
    pub grid_y: Option<u32>,

    #[arg(long)]
    pub span_x: Option<f32>,

    #[arg(long)]
    pub span_y: Option<f32>,

    /// Tilt about the X axis, degrees.
    #[arg(long, allow_hyphen_values = true)]
    pub tilt_x: Option<f32>,

    /// Tilt about the Y axis, degrees.
    #[arg(long, allow_hyphen_values = true)]
    pub tilt_y: Option<f32>,

    #[arg(long, allow_hyphen_values = true)]
    pub camera_z: Option<f32>,

    #[arg(long)]
    pub fov: Option<f32>,

    /// Sprite base radius in pixels (0 = derived from the cell size).
    #[arg(long)]
    pub radius: Option<f32>,

    #[arg(long)]
    pub amplitude: Option<f32>,

    #[arg(long)]
    pub sigma: Option<f32>,

    #[arg(long)]
    pub omega: Option<f32>,

    #[arg(long)]
    pub speed: Option<f32>,

    #[arg(long)]
    pub color_speed: Option<f32>,

    #[arg(long, allow_hyphen_values = true)]
    pub pan_x: Option<f32>,

    #[arg(long, allow_hyphen_values = true)]
    pub pan_y: Option<f32>,

    #[arg(long, default_value_t = false)]
    pub no_auto_center: bool,

    /// Depth bins used by the sort.
    #[arg(long)]
    pub bins: Option<u32>,

    /// Make the canvas refuse batches, forcing per-sprite blits.
    #[arg(long, default_value_t = false)]
    pub no_batch: bool,

    /// Write the last frame to this PNG file.
    #[arg(long)]
    pub snapshot: Option<PathBuf>,
}

impl Args {
    /// Builds the field configuration: the `--config` file (or defaults),
    /// then every flag that was given.
    pub fn field_config(&self) -> Result<FieldConfig> {
        let mut cfg = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("failed to parse config {}", path.display()))?
            }
            None => FieldConfig::default(),
        };

        fn set<T: Copy>(slot: &mut T, value: Option<T>) {
            if let Some(v) = value {
                *slot = v;
            }
        }

        set(&mut cfg.samples, self.samples);
        set(&mut cfg.grid_x, self.grid_x);
        set(&mut cfg.grid_y, self.grid_y);
        set(&mut cfg.span_x, self.span_x);
        set(&mut cfg.span_y, self.span_y);
        set(&mut cfg.tilt_x_deg, self.tilt_x);
        set(&mut cfg.tilt_y_deg, self.tilt_y);
        set(&mut cfg.camera_z, self.camera_z);
        set(&mut cfg.fov, self.fov);
        set(&mut cfg.base_radius, self.radius);
        set(&mut cfg.amplitude, self.amplitude);
        set(&mut cfg.sigma, self.sigma);
        set(&mut cfg.omega, self.omega);
        set(&mut cfg.speed, self.speed);
        set(&mut cfg.color_speed, self.color_speed);
        set(&mut cfg.pan_x, self.pan_x);
        set(&mut cfg.pan_y, self.pan_y);
        set(&mut cfg.bins, self.bins);
        if self.no_auto_center {
            cfg.auto_center = false;
        }

        Ok(cfg)
    }

    pub fn thread_policy(&self) -> ThreadPolicy {
        match self.threads {
            Some(n) => ThreadPolicy::Fixed(n),
            None => ThreadPolicy::Adaptive {
                max: self.max_threads,
            },
        }
    }
}
