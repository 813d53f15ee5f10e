//! CPU canvas: an RGBA8 frame buffer implementing [`DrawSurface`].
//!
//! Used by the headless viewer and by tests. Both submission paths share one
//! rasterizer, so a batch and the equivalent run of blits produce the same
//! pixels.

use crate::batch::{Vertex, INDICES_PER_SPRITE};
use crate::error::SubmitError;
use crate::sprite::SpriteImage;
use crate::surface::{DrawSurface, Rect};

/// Background the canvas is cleared to.
pub const CLEAR_COLOR: [u8; 4] = [5, 8, 13, 255];

/// Counters for what the canvas has been asked to draw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CanvasStats {
    pub batches: u64,
    pub quads: u64,
    pub blits: u64,
}

pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<[u8; 4]>,
    clear_color: [u8; 4],
    batch_support: bool,
    stats: CanvasStats,
}

/// Source-space rectangle of the sprite, in normalized texture coordinates.
#[derive(Clone, Copy)]
struct UvRect {
    u0: f32,
    v0: f32,
    u1: f32,
    v1: f32,
}

const FULL_UV: UvRect = UvRect {
    u0: 0.0,
    v0: 0.0,
    u1: 1.0,
    v1: 1.0,
};

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![CLEAR_COLOR; width as usize * height as usize],
            clear_color: CLEAR_COLOR,
            batch_support: true,
            stats: CanvasStats::default(),
        }
    }

    /// Turns batched submission on or off. With it off every batch is
    /// refused with [`SubmitError::Unsupported`].
    pub fn with_batch_support(mut self, enabled: bool) -> Self {
        self.batch_support = enabled;
        self
    }

    pub fn with_clear_color(mut self, color: [u8; 4]) -> Self {
        self.clear_color = color;
        self.pixels.fill(color);
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stats(&self) -> CanvasStats {
        self.stats
    }

    pub fn clear(&mut self) {
        self.pixels.fill(self.clear_color);
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x < self.width && y < self.height {
            Some(self.pixels[(y * self.width + x) as usize])
        } else {
            None
        }
    }

    pub fn pixels(&self) -> &[[u8; 4]] {
        &self.pixels
    }

    /// Row-major RGBA8 bytes.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    /// Draws `sprite` into `dest` with straight-alpha "over" blending,
    /// sampling at pixel centers.
    fn draw_sprite(&mut self, sprite: &SpriteImage, dest: Rect, uv: UvRect, color: [u8; 4]) {
        let finite = [dest.x, dest.y, dest.w, dest.h].iter().all(|v| v.is_finite());
        if !finite || dest.w <= 0.0 || dest.h <= 0.0 {
            return;
        }

        let x_start = dest.x.floor().max(0.0) as u32;
        let y_start = dest.y.floor().max(0.0) as u32;
        let x_end = ((dest.x + dest.w).ceil().max(0.0) as u32).min(self.width);
        let y_end = ((dest.y + dest.h).ceil().max(0.0) as u32).min(self.height);

        for py in y_start..y_end {
            let cy = py as f32 + 0.5;
            if cy < dest.y || cy >= dest.y + dest.h {
                continue;
            }
            let v = uv.v0 + (cy - dest.y) / dest.h * (uv.v1 - uv.v0);
            let row = (py * self.width) as usize;

            for px in x_start..x_end {
                let cx = px as f32 + 0.5;
                if cx < dest.x || cx >= dest.x + dest.w {
                    continue;
                }
                let u = uv.u0 + (cx - dest.x) / dest.w * (uv.u1 - uv.u0);
                let texel = sprite.sample(u, v);
                let dst = &mut self.pixels[row + px as usize];
                *dst = blend_over(modulate(texel, color), *dst);
            }
        }
    }
}

#[inline]
fn mul_u8(a: u8, b: u8) -> u8 {
    ((a as u32 * b as u32 + 127) / 255) as u8
}

#[inline]
fn modulate(texel: [u8; 4], color: [u8; 4]) -> [u8; 4] {
    [
        mul_u8(texel[0], color[0]),
        mul_u8(texel[1], color[1]),
        mul_u8(texel[2], color[2]),
        mul_u8(texel[3], color[3]),
    ]
}

#[inline]
fn blend_over(src: [u8; 4], dst: [u8; 4]) -> [u8; 4] {
    let a = src[3] as u32;
    let inv = 255 - a;
    let channel = |s: u8, d: u8| ((s as u32 * a + d as u32 * inv + 127) / 255) as u8;
    [
        channel(src[0], dst[0]),
        channel(src[1], dst[1]),
        channel(src[2], dst[2]),
        (a + (dst[3] as u32 * inv + 127) / 255).min(255) as u8,
    ]
}

impl DrawSurface for Canvas {
    fn submit_batch(
        &mut self,
        sprite: &SpriteImage,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> Result<(), SubmitError> {
        if !self.batch_support {
            return Err(SubmitError::Unsupported);
        }
        if indices.len() % INDICES_PER_SPRITE != 0 {
            return Err(SubmitError::Rejected(format!(
                "index count {} is not a multiple of {}",
                indices.len(),
                INDICES_PER_SPRITE
            )));
        }
        if let Some(&bad) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(SubmitError::Rejected(format!(
                "index {} out of range for {} vertices",
                bad,
                vertices.len()
            )));
        }

        // Quads are axis aligned: each run of six indices covers the bounding
        // box of the vertices it references.
        for quad in indices.chunks_exact(INDICES_PER_SPRITE) {
            let first = &vertices[quad[0] as usize];
            let (mut min, mut max) = (first.position, first.position);
            let (mut uv_min, mut uv_max) = (first.tex_coord, first.tex_coord);
            for &i in &quad[1..] {
                let v = &vertices[i as usize];
                for k in 0..2 {
                    min[k] = min[k].min(v.position[k]);
                    max[k] = max[k].max(v.position[k]);
                    uv_min[k] = uv_min[k].min(v.tex_coord[k]);
                    uv_max[k] = uv_max[k].max(v.tex_coord[k]);
                }
            }

            let dest = Rect::new(min[0], min[1], max[0] - min[0], max[1] - min[1]);
            let uv = UvRect {
                u0: uv_min[0],
                v0: uv_min[1],
                u1: uv_max[0],
                v1: uv_max[1],
            };
            self.draw_sprite(sprite, dest, uv, first.color);
        }

        self.stats.batches += 1;
        self.stats.quads += (indices.len() / INDICES_PER_SPRITE) as u64;
        Ok(())
    }

    fn blit(&mut self, sprite: &SpriteImage, dest: Rect, color_mod: [u8; 3], alpha_mod: u8) {
        let [r, g, b] = color_mod;
        self.draw_sprite(sprite, dest, FULL_UV, [r, g, b, alpha_mod]);
        self.stats.blits += 1;
    }
}
