//! sprite_field: per-frame pipeline for a large animated field of sprites.
//!
//! - A grid of GX x GY samples is height-perturbed (travelling wave plus a
//!   Gaussian ripple on a Lissajous path), rotated, and projected to screen.
//! - Samples are ordered by depth with an O(N) bucket sort (128 bins).
//! - The sorted sprites go to a [`DrawSurface`] as one textured-quad batch,
//!   or one blit each when the surface cannot take a batch.
//!
//! Frame flow:
//!   coords (cached) -> field update + depth range -> auto-center pan
//!   -> bucket sort -> batch submit | sequential blits
//!
//! All per-frame buffers live in a [`arena::FrameArena`] owned by the
//! [`FieldPipeline`] and grow 1.5x from 4096 elements, never shrinking.

pub mod arena;
pub mod batch;
pub mod canvas;
pub mod center;
pub mod config;
pub mod coords;
pub mod error;
pub mod fallback;
pub mod field;
pub mod pipeline;
pub mod sort;
pub mod sprite;
pub mod surface;
pub mod workers;

pub use batch::Vertex;
pub use canvas::Canvas;
pub use config::{FieldConfig, GridDims, ResolvedField, Viewport};
pub use error::{FieldError, Result, SubmitError};
pub use field::{DepthRange, DrawSample};
pub use pipeline::{FallbackReason, FieldPipeline, FrameOutcome, FrameReport, FrameStats};
pub use sort::DrawOrder;
pub use sprite::SpriteImage;
pub use surface::{DrawSurface, Rect};
pub use workers::ThreadPolicy;
