//! Sequential renderer used when the surface refuses a batch.

use crate::batch::sprite_rect;
use crate::field::DrawSample;
use crate::sort::DrawOrder;
use crate::sprite::SpriteImage;
use crate::surface::DrawSurface;
use glam::Vec2;

/// Blits every sample in draw order, one call each, on the calling thread.
/// Returns the number of blits issued.
pub fn render_sequential<S: DrawSurface + ?Sized>(
    surface: &mut S,
    sprite: &SpriteImage,
    order: DrawOrder<'_>,
    samples: &[DrawSample],
    pan: Vec2,
) -> usize {
    for idx in order.iter() {
        let sample = &samples[idx];
        let [r, g, b, a] = sample.rgba;
        surface.blit(sprite, sprite_rect(sample, pan), [r, g, b], a);
    }
    order.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Vertex;
    use crate::error::SubmitError;
    use crate::surface::Rect;
    use std::sync::atomic::AtomicU32;

    #[derive(Default)]
    struct Blits(Vec<(Rect, [u8; 3], u8)>);

    impl DrawSurface for Blits {
        fn submit_batch(&mut self, _: &SpriteImage, _: &[Vertex], _: &[u32]) -> Result<(), SubmitError> {
            Err(SubmitError::Unsupported)
        }

        fn blit(&mut self, _: &SpriteImage, dest: Rect, color_mod: [u8; 3], alpha_mod: u8) {
            self.0.push((dest, color_mod, alpha_mod));
        }
    }

    #[test]
    fn blits_in_draw_order_with_sample_modulation() {
        let samples = [
            DrawSample { x: 0.0, y: 0.0, radius: 1.0, rgba: [1, 2, 3, 4] },
            DrawSample { x: 10.0, y: 10.0, radius: 2.0, rgba: [5, 6, 7, 8] },
        ];
        let slots = [AtomicU32::new(1), AtomicU32::new(0)];
        let sprite = SpriteImage::new(2).unwrap();
        let mut surface = Blits::default();

        let n = render_sequential(
            &mut surface,
            &sprite,
            DrawOrder::new(&slots),
            &samples,
            Vec2::new(1.0, 1.0),
        );

        assert_eq!(n, 2);
        assert_eq!(surface.0[0], (Rect::new(9.0, 9.0, 4.0, 4.0), [5, 6, 7], 8));
        assert_eq!(surface.0[1], (Rect::new(0.0, 0.0, 2.0, 2.0), [1, 2, 3], 4));
    }
}
