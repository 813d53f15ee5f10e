//! Circular sprite image with a soft alpha edge and a faint highlight.

use crate::arena::ensure_len;
use crate::error::Result;
use rayon::prelude::*;

/// Smallest sprite radius generated, in pixels.
pub const MIN_SPRITE_RADIUS: u32 = 2;
/// Largest sprite radius generated, in pixels. Bigger sprites are drawn
/// scaled up from this one.
pub const MAX_SPRITE_RADIUS: u32 = 1024;

/// Pixel radius of the sprite for a given base radius.
#[inline]
pub fn pixel_radius(base_radius: f32) -> u32 {
    if base_radius.is_finite() && base_radius > 0.0 {
        (base_radius.ceil().min(MAX_SPRITE_RADIUS as f32) as u32).max(MIN_SPRITE_RADIUS)
    } else {
        MIN_SPRITE_RADIUS
    }
}

/// Square RGBA8 image, straight alpha, side `2 * radius`.
///
/// `generation` changes every time the pixels are regenerated so a host
/// surface can tell when its uploaded copy is stale.
#[derive(Debug, Clone, Default)]
pub struct SpriteImage {
    radius: u32,
    pixels: Vec<[u8; 4]>,
    generation: u64,
}

impl SpriteImage {
    pub fn new(radius: u32) -> Result<Self> {
        let mut sprite = Self::default();
        sprite.ensure_radius(radius)?;
        Ok(sprite)
    }

    /// Regenerates the pixels when `radius` differs from the current one.
    /// Returns whether a regeneration happened.
    pub fn ensure_radius(&mut self, radius: u32) -> Result<bool> {
        let radius = radius.clamp(MIN_SPRITE_RADIUS, MAX_SPRITE_RADIUS);
        if radius == self.radius && !self.pixels.is_empty() {
            return Ok(false);
        }

        let side = (2 * radius) as usize;
        ensure_len(&mut self.pixels, side * side, "sprite", || [0; 4])?;
        self.pixels
            .par_chunks_mut(side)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, px) in row.iter_mut().enumerate() {
                    *px = sprite_texel(x, y, radius);
                }
            });

        self.radius = radius;
        self.generation += 1;
        log::debug!("sprite regenerated: radius {} px (generation {})", radius, self.generation);
        Ok(true)
    }

    #[inline]
    pub fn radius(&self) -> u32 {
        self.radius
    }

    /// Side length in pixels.
    #[inline]
    pub fn size(&self) -> u32 {
        2 * self.radius
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn pixels(&self) -> &[[u8; 4]] {
        &self.pixels
    }

    /// Nearest-neighbour lookup at normalized coordinates; out-of-range
    /// coordinates clamp to the edge.
    #[inline]
    pub fn sample(&self, u: f32, v: f32) -> [u8; 4] {
        let side = self.size() as usize;
        if side == 0 {
            return [0; 4];
        }
        let max = (side - 1) as f32;
        let x = (u * side as f32).clamp(0.0, max) as usize;
        let y = (v * side as f32).clamp(0.0, max) as usize;
        self.pixels[y * side + x]
    }
}

fn sprite_texel(x: usize, y: usize, radius: u32) -> [u8; 4] {
    let rf = radius as f32;
    let dx = x as f32 + 0.5 - rf;
    let dy = y as f32 + 0.5 - rf;

    let r = (dx * dx + dy * dy).sqrt() / rf;
    let alpha = (1.0 - r * r).clamp(0.0, 1.0);

    // Highlight offset up-left of center.
    let sx = (dx + dy * 0.3) / rf;
    let highlight = (0.9 - (sx * sx + dy * dy / (rf * rf)) * 1.2).clamp(0.0, 1.0) * 0.3;

    let a = (alpha * 255.0) as u8;
    let c = (highlight * 255.0) as u8;
    [c, c, c, a]
}
