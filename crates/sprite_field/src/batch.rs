//! Geometry batcher: turns the draw order into one textured-quad batch.

use crate::error::SubmitError;
use crate::field::DrawSample;
use crate::sort::DrawOrder;
use crate::sprite::SpriteImage;
use crate::surface::{DrawSurface, Rect};
use glam::Vec2;
use rayon::prelude::*;

pub const VERTICES_PER_SPRITE: usize = 4;
pub const INDICES_PER_SPRITE: usize = 6;

/// One corner of a sprite quad. Layout is stable for direct upload.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    /// Screen position in pixels.
    pub position: [f32; 2],
    pub color: [u8; 4],
    pub tex_coord: [f32; 2],
}

const CORNER_UV: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
const QUAD_INDICES: [u32; INDICES_PER_SPRITE] = [0, 1, 2, 2, 3, 0];

/// Destination rectangle of a sample after panning.
#[inline]
pub fn sprite_rect(sample: &DrawSample, pan: Vec2) -> Rect {
    Rect::around(sample.x + pan.x, sample.y + pan.y, sample.radius)
}

/// Writes the quad of draw position `q` into `vertices`/`indices`, which
/// must be exactly one sprite's worth of slots.
#[inline]
fn write_quad(q: usize, sample: &DrawSample, pan: Vec2, vertices: &mut [Vertex], indices: &mut [u32]) {
    let r = sprite_rect(sample, pan);
    let (x0, y0) = (r.x, r.y);
    let (x1, y1) = (r.x + r.w, r.y + r.h);
    let corners = [[x0, y0], [x1, y0], [x1, y1], [x0, y1]];

    for ((v, position), tex_coord) in vertices.iter_mut().zip(corners).zip(CORNER_UV) {
        *v = Vertex {
            position,
            color: sample.rgba,
            tex_coord,
        };
    }

    let base = (q * VERTICES_PER_SPRITE) as u32;
    for (slot, offset) in indices.iter_mut().zip(QUAD_INDICES) {
        *slot = base + offset;
    }
}

/// Fills the batch in draw order. Position `q` owns vertex slots
/// `4q..4q+4` and index slots `6q..6q+6`, so workers never overlap.
pub fn fill_batch(
    order: DrawOrder<'_>,
    samples: &[DrawSample],
    pan: Vec2,
    vertices: &mut [Vertex],
    indices: &mut [u32],
) {
    debug_assert_eq!(vertices.len(), order.len() * VERTICES_PER_SPRITE);
    debug_assert_eq!(indices.len(), order.len() * INDICES_PER_SPRITE);

    vertices
        .par_chunks_mut(VERTICES_PER_SPRITE)
        .zip(indices.par_chunks_mut(INDICES_PER_SPRITE))
        .enumerate()
        .for_each(|(q, (quad, idx))| {
            let sample = &samples[order.get(q)];
            write_quad(q, sample, pan, quad, idx);
        });
}

/// Hands the filled batch to the surface as a single submission.
pub fn submit<S: DrawSurface + ?Sized>(
    surface: &mut S,
    sprite: &SpriteImage,
    vertices: &[Vertex],
    indices: &[u32],
) -> Result<(), SubmitError> {
    if vertices.is_empty() {
        return Ok(());
    }
    surface.submit_batch(sprite, vertices, indices)
}
