//! Field configuration and its resolution against a viewport.
//!
//! [`FieldConfig`] is the flat user-facing option set where zero means
//! "use the default". [`FieldConfig::resolve`] turns it into a
//! [`ResolvedField`] with every default applied and every degenerate value
//! clamped, so the stages never have to re-check it.

use crate::error::{FieldError, Result};
use crate::sort::DEFAULT_BINS;
use glam::Vec2;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SPAN: f32 = 2.0;
pub const DEFAULT_CAMERA_Z: f32 = -6.0;
pub const DEFAULT_FOV: f32 = 1.0;
pub const DEFAULT_AMPLITUDE: f32 = 0.28;
pub const DEFAULT_SIGMA: f32 = 0.25;
pub const DEFAULT_OMEGA: f32 = 2.8;
pub const DEFAULT_SPEED: f32 = 1.0;
pub const DEFAULT_COLOR_SPEED: f32 = 0.35;

/// Smallest grid dimension the coordinate lattice accepts.
pub const MIN_GRID_DIM: u32 = 2;
/// Floor applied to grid dimensions derived from a sample count.
pub const MIN_DERIVED_GRID_DIM: u32 = 16;

/// Auto base radius as a fraction of the smaller cell extent, in pixels.
const AUTO_RADIUS_CELL_FRACTION: f32 = 0.55;

/// Viewport size in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn validate(self) -> Result<Self> {
        if self.width == 0 || self.height == 0 {
            return Err(FieldError::InvalidViewport {
                width: self.width,
                height: self.height,
            });
        }
        Ok(self)
    }

    #[inline]
    pub fn size(self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }

    #[inline]
    pub fn center(self) -> Vec2 {
        self.size() * 0.5
    }
}

/// Grid dimensions in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridDims {
    pub x: u32,
    pub y: u32,
}

impl GridDims {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn samples(self) -> usize {
        self.x as usize * self.y as usize
    }

    /// Derives a grid holding roughly `samples` cells with the viewport's
    /// aspect ratio. Zero samples picks a fixed grid matching the viewport
    /// orientation.
    pub fn derive(samples: u32, viewport: Viewport) -> Self {
        if samples == 0 {
            return if viewport.width >= viewport.height {
                Self::new(180, 100)
            } else {
                Self::new(120, 180)
            };
        }

        let aspect = viewport.width as f32 / viewport.height.max(1) as f32;
        let gx = ((samples as f32 * aspect).sqrt().floor() as u32).max(1);
        let gy = (samples as f32 / gx as f32).floor() as u32;

        Self::new(gx.max(MIN_DERIVED_GRID_DIM), gy.max(MIN_DERIVED_GRID_DIM))
    }
}

/// User-facing field options. Zero (or a non-positive span/radius) selects
/// the documented default for that option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    /// Grid columns; 0 derives from `samples` and the viewport aspect.
    pub grid_x: u32,
    /// Grid rows; 0 derives from `samples` and the viewport aspect.
    pub grid_y: u32,
    /// Target sample count used when a grid dimension is derived.
    pub samples: u32,
    pub span_x: f32,
    pub span_y: f32,
    /// Tilt about the X axis, degrees. Used as given.
    pub tilt_x_deg: f32,
    /// Tilt about the Y axis, degrees. Used as given.
    pub tilt_y_deg: f32,
    pub camera_z: f32,
    pub fov: f32,
    /// Base sprite radius in pixels; 0 sizes it from the cell extent.
    pub base_radius: f32,
    pub amplitude: f32,
    pub sigma: f32,
    pub omega: f32,
    pub speed: f32,
    pub color_speed: f32,
    pub pan_x: f32,
    pub pan_y: f32,
    pub auto_center: bool,
    /// Depth bins used by the bucket sort.
    pub bins: u32,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            grid_x: 0,
            grid_y: 0,
            samples: 0,
            span_x: 0.0,
            span_y: 0.0,
            tilt_x_deg: 0.0,
            tilt_y_deg: 0.0,
            camera_z: 0.0,
            fov: 0.0,
            base_radius: 0.0,
            amplitude: 0.0,
            sigma: 0.0,
            omega: 0.0,
            speed: 0.0,
            color_speed: 0.0,
            pan_x: 0.0,
            pan_y: 0.0,
            auto_center: true,
            bins: DEFAULT_BINS as u32,
        }
    }
}

#[inline]
fn or_default(value: f32, default: f32) -> f32 {
    if value != 0.0 && value.is_finite() {
        value
    } else {
        default
    }
}

#[inline]
fn positive_or(value: f32, default: f32) -> f32 {
    if value > 0.0 && value.is_finite() {
        value
    } else {
        default
    }
}

impl FieldConfig {
    /// Applies defaults and clamps for the given viewport.
    pub fn resolve(&self, viewport: Viewport) -> Result<ResolvedField> {
        let viewport = viewport.validate()?;

        let grid = if self.grid_x == 0 || self.grid_y == 0 {
            let derived = GridDims::derive(self.samples, viewport);
            GridDims::new(
                if self.grid_x == 0 { derived.x } else { self.grid_x },
                if self.grid_y == 0 { derived.y } else { self.grid_y },
            )
        } else {
            GridDims::new(self.grid_x, self.grid_y)
        };
        let grid = GridDims::new(grid.x.max(MIN_GRID_DIM), grid.y.max(MIN_GRID_DIM));

        let base_radius = if self.base_radius > 0.0 && self.base_radius.is_finite() {
            self.base_radius
        } else {
            auto_base_radius(grid, viewport)
        };

        Ok(ResolvedField {
            grid,
            span: Vec2::new(
                positive_or(self.span_x, DEFAULT_SPAN),
                positive_or(self.span_y, DEFAULT_SPAN),
            ),
            tilt_rad: Vec2::new(self.tilt_x_deg.to_radians(), self.tilt_y_deg.to_radians()),
            camera_z: or_default(self.camera_z, DEFAULT_CAMERA_Z),
            fov: or_default(self.fov, DEFAULT_FOV),
            base_radius,
            amplitude: or_default(self.amplitude, DEFAULT_AMPLITUDE),
            sigma: or_default(self.sigma, DEFAULT_SIGMA),
            omega: or_default(self.omega, DEFAULT_OMEGA),
            speed: or_default(self.speed, DEFAULT_SPEED),
            color_speed: or_default(self.color_speed, DEFAULT_COLOR_SPEED),
            pan: Vec2::new(self.pan_x, self.pan_y),
            auto_center: self.auto_center,
            bins: (self.bins as usize).max(1),
        })
    }
}

/// Base radius that keeps neighbouring sprites just overlapping.
pub fn auto_base_radius(grid: GridDims, viewport: Viewport) -> f32 {
    let cell_x = viewport.width as f32 / grid.x.max(1) as f32;
    let cell_y = viewport.height as f32 / grid.y.max(1) as f32;
    (AUTO_RADIUS_CELL_FRACTION * cell_x.min(cell_y)).max(1.0)
}

/// Configuration with every default applied; what the stages consume.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    pub grid: GridDims,
    pub span: Vec2,
    pub tilt_rad: Vec2,
    pub camera_z: f32,
    pub fov: f32,
    pub base_radius: f32,
    pub amplitude: f32,
    pub sigma: f32,
    pub omega: f32,
    pub speed: f32,
    pub color_speed: f32,
    pub pan: Vec2,
    pub auto_center: bool,
    pub bins: usize,
}

impl ResolvedField {
    #[inline]
    pub fn samples(&self) -> usize {
        self.grid.samples()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_config_takes_documented_defaults() {
        let r = FieldConfig::default()
            .resolve(Viewport::new(1280, 720))
            .unwrap();

        assert_eq!(r.grid, GridDims::new(180, 100));
        assert_eq!(r.span, Vec2::splat(DEFAULT_SPAN));
        assert_eq!(r.camera_z, DEFAULT_CAMERA_Z);
        assert_eq!(r.fov, DEFAULT_FOV);
        assert_eq!(r.amplitude, DEFAULT_AMPLITUDE);
        assert_eq!(r.sigma, DEFAULT_SIGMA);
        assert_eq!(r.omega, DEFAULT_OMEGA);
        assert_eq!(r.speed, DEFAULT_SPEED);
        assert_eq!(r.color_speed, DEFAULT_COLOR_SPEED);
        assert_eq!(r.bins, DEFAULT_BINS);
        assert!(r.auto_center);
        // 0.55 * min(1280/180, 720/100)
        assert!((r.base_radius - 0.55 * (1280.0f32 / 180.0)).abs() < 1e-4);
    }

    #[test]
    fn portrait_viewport_picks_tall_default_grid() {
        let r = FieldConfig::default()
            .resolve(Viewport::new(720, 1280))
            .unwrap();
        assert_eq!(r.grid, GridDims::new(120, 180));
    }

    #[test]
    fn grid_is_derived_from_sample_count_and_aspect() {
        let grid = GridDims::derive(20_000, Viewport::new(1600, 900));
        // sqrt(20000 * 16/9) = 188.56
        assert_eq!(grid, GridDims::new(188, 106));

        let tiny = GridDims::derive(10, Viewport::new(800, 600));
        assert_eq!(tiny, GridDims::new(16, 16));
    }

    #[test]
    fn explicit_dimensions_below_two_are_clamped() {
        let cfg = FieldConfig {
            grid_x: 1,
            grid_y: 1,
            ..FieldConfig::default()
        };
        let r = cfg.resolve(Viewport::new(640, 480)).unwrap();
        assert_eq!(r.grid, GridDims::new(2, 2));
    }

    #[test]
    fn explicit_values_are_kept() {
        let cfg = FieldConfig {
            grid_x: 40,
            grid_y: 30,
            span_x: 3.0,
            tilt_x_deg: 90.0,
            base_radius: 5.0,
            pan_x: 10.0,
            pan_y: -5.0,
            auto_center: false,
            bins: 2,
            ..FieldConfig::default()
        };
        let r = cfg.resolve(Viewport::new(640, 480)).unwrap();
        assert_eq!(r.grid, GridDims::new(40, 30));
        assert_eq!(r.span, Vec2::new(3.0, DEFAULT_SPAN));
        assert!((r.tilt_rad.x - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
        assert_eq!(r.base_radius, 5.0);
        assert_eq!(r.pan, Vec2::new(10.0, -5.0));
        assert!(!r.auto_center);
        assert_eq!(r.bins, 2);
    }

    #[test]
    fn empty_viewport_is_rejected() {
        let err = FieldConfig::default()
            .resolve(Viewport::new(0, 480))
            .unwrap_err();
        assert!(matches!(err, FieldError::InvalidViewport { width: 0, .. }));
    }

    #[test]
    fn partial_json_fills_missing_fields_with_defaults() {
        let cfg: FieldConfig =
            serde_json::from_str(r#"{ "grid_x": 64, "auto_center": false }"#).unwrap();
        assert_eq!(cfg.grid_x, 64);
        assert_eq!(cfg.grid_y, 0);
        assert!(!cfg.auto_center);
        assert_eq!(cfg.bins, DEFAULT_BINS as u32);
    }
}
