//! The host draw surface the pipeline submits to.

use crate::batch::Vertex;
use crate::error::SubmitError;
use crate::sprite::SpriteImage;

/// Destination rectangle in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Square of side `2 * radius` centered on (cx, cy).
    #[inline]
    pub fn around(cx: f32, cy: f32, radius: f32) -> Self {
        let d = 2.0 * radius;
        Self::new(cx - radius, cy - radius, d, d)
    }
}

/// A render target that accepts sprites either as one textured-quad batch or
/// one blit at a time.
///
/// Implementations are driven from a single thread; per-call state such as
/// color modulation is not required to be thread-safe. Colors use straight
/// (non-premultiplied) alpha, matching [`SpriteImage`].
pub trait DrawSurface {
    /// Draws every quad of the batch in index order. Returning an error means
    /// nothing was drawn and the caller should fall back to [`blit`](Self::blit).
    fn submit_batch(
        &mut self,
        sprite: &SpriteImage,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> Result<(), SubmitError>;

    /// Draws the whole sprite into `dest`, modulated by `color_mod`/`alpha_mod`.
    fn blit(&mut self, sprite: &SpriteImage, dest: Rect, color_mod: [u8; 3], alpha_mod: u8);
}

impl<S: DrawSurface + ?Sized> DrawSurface for &mut S {
    fn submit_batch(
        &mut self,
        sprite: &SpriteImage,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> Result<(), SubmitError> {
        (**self).submit_batch(sprite, vertices, indices)
    }

    fn blit(&mut self, sprite: &SpriteImage, dest: Rect, color_mod: [u8; 3], alpha_mod: u8) {
        (**self).blit(sprite, dest, color_mod, alpha_mod)
    }
}
