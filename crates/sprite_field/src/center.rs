//! Auto-center estimator: keeps the projected field centered on screen.

use crate::config::Viewport;
use crate::field::DrawSample;
use glam::Vec2;
use rayon::prelude::*;

/// One-pole smoothing coefficient applied to the pan every frame.
pub const PAN_SMOOTHING: f32 = 0.2;

/// Axis-aligned bounds of the projected sample positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenBounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl ScreenBounds {
    const EMPTY: Self = Self {
        min: Vec2::splat(f32::INFINITY),
        max: Vec2::splat(f32::NEG_INFINITY),
    };

    #[inline]
    fn include(self, p: Vec2) -> Self {
        Self {
            min: self.min.min(p),
            max: self.max.max(p),
        }
    }

    #[inline]
    fn merge(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }
}

/// Parallel min/max reduction over the sample screen positions.
/// `None` for an empty slice.
pub fn screen_bounds(samples: &[DrawSample]) -> Option<ScreenBounds> {
    if samples.is_empty() {
        return None;
    }

    let bounds = samples
        .par_iter()
        .fold(
            || ScreenBounds::EMPTY,
            |b, s| b.include(Vec2::new(s.x, s.y)),
        )
        .reduce(|| ScreenBounds::EMPTY, ScreenBounds::merge);

    bounds.min.is_finite().then_some(bounds)
}

/// Running pan state, smoothed across frames.
#[derive(Debug, Clone)]
pub struct PanSmoother {
    pan: Vec2,
    alpha: f32,
}

impl Default for PanSmoother {
    fn default() -> Self {
        Self::new()
    }
}

impl PanSmoother {
    pub fn new() -> Self {
        Self::with_alpha(PAN_SMOOTHING)
    }

    pub fn with_alpha(alpha: f32) -> Self {
        Self {
            pan: Vec2::ZERO,
            alpha: alpha.clamp(0.0, 1.0),
        }
    }

    /// Current smoothed pan, in pixels.
    #[inline]
    pub fn pan(&self) -> Vec2 {
        self.pan
    }

    /// Pan the field should settle at this frame. With auto-centering off
    /// (or nothing to measure) this is just the user offset.
    pub fn target(
        samples: &[DrawSample],
        viewport: Viewport,
        user_pan: Vec2,
        auto_center: bool,
    ) -> Vec2 {
        if !auto_center {
            return user_pan;
        }

        match screen_bounds(samples) {
            Some(bounds) => (viewport.center() - bounds.center()) + user_pan,
            None => user_pan,
        }
    }

    /// Moves the pan a fixed fraction of the way towards `target`.
    pub fn step(&mut self, target: Vec2) -> Vec2 {
        self.pan += self.alpha * (target - self.pan);
        self.pan
    }
}
