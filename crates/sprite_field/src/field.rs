//! Field update: height, rotation, projection and color for every sample.
//!
//! Each sample is a pure function of its index, the frame time and the
//! resolved configuration, so the pass writes disjoint slots without any
//! synchronisation. The global depth range is reduced in the same pass with
//! per-worker accumulators merged at the join.

use crate::config::{ResolvedField, Viewport};
use crate::coords::CoordinateCache;
use glam::{Mat3, Vec2, Vec3};
use rayon::prelude::*;

/// Smallest magnitude allowed for the perspective denominator.
pub const MIN_PROJECTION_DENOM: f32 = 1e-4;
/// Projected radius bounds, as multiples of the base radius.
pub const RADIUS_SCALE_MIN: f32 = 0.5;
pub const RADIUS_SCALE_MAX: f32 = 2.1;
pub const SAMPLE_ALPHA: u8 = 220;

const BASE_WAVE_AMPLITUDE: f32 = 0.22;
const WAVE_KX: f32 = 2.2;
const WAVE_KY: f32 = 1.7;
const RIPPLE_R2_FREQ: f32 = 0.6;
const FIELD_LIFT: f32 = 2.0;
const SATURATION: f32 = 0.8;
const VALUE: f32 = 0.95;

/// What the draw stages need to place one sprite.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawSample {
    /// Screen position in pixels, before panning.
    pub x: f32,
    pub y: f32,
    /// Projected sprite radius in pixels.
    pub radius: f32,
    pub rgba: [u8; 4],
}

/// Min/max post-rotation depth of a frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthRange {
    pub min: f32,
    pub max: f32,
}

impl DepthRange {
    /// Identity of the min/max reduction.
    pub const EMPTY: Self = Self {
        min: f32::INFINITY,
        max: f32::NEG_INFINITY,
    };

    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn include(self, z: f32) -> Self {
        Self {
            min: self.min.min(z),
            max: self.max.max(z),
        }
    }

    #[inline]
    pub fn merge(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.min <= self.max)
    }
}

impl Default for DepthRange {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Per-frame constants shared by every sample.
#[derive(Clone, Debug)]
pub struct FrameKernel {
    t: f32,
    grid_x: usize,
    column_den: f32,
    center: Vec2,
    inv_2sig2: f32,
    amplitude: f32,
    omega: f32,
    color_speed: f32,
    rotation: Mat3,
    camera_z: f32,
    fov: f32,
    half_viewport: Vec2,
    base_radius: f32,
}

impl FrameKernel {
    pub fn new(field: &ResolvedField, viewport: Viewport, t: f32) -> Self {
        let span = field.span;
        // Lissajous path of the ripple center in world space.
        let center = Vec2::new(
            0.45 * span.x * (0.9 * field.speed * t).sin(),
            0.45 * span.y * (1.2 * field.speed * t + 0.7).cos(),
        );

        // X tilt first, then Y tilt.
        let rotation =
            Mat3::from_rotation_y(field.tilt_rad.y) * Mat3::from_rotation_x(field.tilt_rad.x);

        Self {
            t,
            grid_x: field.grid.x.max(1) as usize,
            column_den: field.grid.x.saturating_sub(1).max(1) as f32,
            center,
            inv_2sig2: 1.0 / (2.0 * field.sigma * field.sigma),
            amplitude: field.amplitude,
            omega: field.omega,
            color_speed: field.color_speed,
            rotation,
            camera_z: field.camera_z,
            fov: field.fov,
            half_viewport: viewport.center(),
            base_radius: field.base_radius,
        }
    }

    /// Height of the field at world position (x, y).
    #[inline]
    pub fn height(&self, x: f32, y: f32) -> f32 {
        let t = self.t;
        let base = BASE_WAVE_AMPLITUDE
            * (WAVE_KX * x + 0.7 * t).sin()
            * (WAVE_KY * y + 0.9 * t).cos();
        let d = Vec2::new(x, y) - self.center;
        let r2 = d.length_squared();
        let bump = (-r2 * self.inv_2sig2).exp();
        base + self.amplitude * bump * (self.omega * t + r2 * RIPPLE_R2_FREQ).sin()
    }

    /// Computes one sample. Returns the draw sample and its depth.
    #[inline]
    pub fn shade(&self, idx: usize, x: f32, y: f32) -> (DrawSample, f32) {
        let z = self.height(x, y);
        let p = self.rotation * Vec3::new(x, y, FIELD_LIFT + z);

        let scale = self.fov / clamp_denominator(p.z - self.camera_z);
        let screen = Vec2::new(p.x, p.y) * scale * self.half_viewport + self.half_viewport;

        // f32::max/min discard NaN, so a pathological scale still yields a
        // bounded radius.
        let radius = self.base_radius
            * (scale * 0.9).max(RADIUS_SCALE_MIN).min(RADIUS_SCALE_MAX);

        let column = (idx % self.grid_x) as f32;
        let u = (column / self.column_den) * 2.0 - 1.0;
        let hue = 0.6 + 0.25 * z + self.color_speed * self.t + 0.08 * u;
        let [r, g, b] = hsv_to_rgb(hue, SATURATION, VALUE);

        let sample = DrawSample {
            x: screen.x,
            y: screen.y,
            radius,
            rgba: [r, g, b, SAMPLE_ALPHA],
        };
        (sample, p.z)
    }
}

/// Keeps the perspective denominator at least [`MIN_PROJECTION_DENOM`] away
/// from zero, preserving its sign (zero counts as positive).
#[inline]
pub fn clamp_denominator(denom: f32) -> f32 {
    if denom.abs() < MIN_PROJECTION_DENOM {
        if denom >= 0.0 {
            MIN_PROJECTION_DENOM
        } else {
            -MIN_PROJECTION_DENOM
        }
    } else {
        denom
    }
}

/// HSV to 8-bit RGB. Hue wraps to [0, 1).
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
    let h = h - h.floor();
    let hf = h * 6.0;
    let sector = hf.floor();
    let f = hf - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);

    let (r, g, b) = match (sector as i32).rem_euclid(6) {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };

    let to_u8 = |c: f32| (c.clamp(0.0, 1.0) * 255.0) as u8;
    [to_u8(r), to_u8(g), to_u8(b)]
}

/// Runs the update for every sample in `samples`/`depth` (which must be
/// sized to the grid) and returns the frame's depth range.
pub fn update_field(
    coords: &CoordinateCache,
    kernel: &FrameKernel,
    samples: &mut [DrawSample],
    depth: &mut [f32],
) -> DepthRange {
    debug_assert_eq!(samples.len(), depth.len());
    debug_assert!(coords.len() >= samples.len());

    if samples.is_empty() {
        return DepthRange::EMPTY;
    }

    let xs = coords.xs();
    let ys = coords.ys();

    samples
        .par_iter_mut()
        .zip(depth.par_iter_mut())
        .enumerate()
        .fold(
            || DepthRange::EMPTY,
            |range, (idx, (sample, z))| {
                let (s, d) = kernel.shade(idx, xs[idx], ys[idx]);
                *sample = s;
                *z = d;
                range.include(d)
            },
        )
        .reduce(|| DepthRange::EMPTY, DepthRange::merge)
}
