//! Image batch types and small tensor helpers.
//!
//! Layout is always NCHW. Pixel values live in [-1, 1] while training and are
//! mapped to [0, 1] only at the boundaries (SSIM, saved samples).

use ndarray::{Array3, Array4, ArrayView3, Axis};

/// A batch of images, shape (batch, channel, height, width).
pub type ImageBatch = Array4<f32>;

/// One discriminator prediction map, shape (batch, 1, h, w).
pub type PredictionMap = Array4<f32>;

/// One training step's input: an unaligned pair of domain batches.
#[derive(Clone, Debug)]
pub struct Batch {
    /// Images from domain A
    pub a: ImageBatch,

    /// Images from domain B (no correspondence with `a`)
    pub b: ImageBatch,
}

impl Batch {
    pub fn new(a: ImageBatch, b: ImageBatch) -> Self {
        Self { a, b }
    }

    /// Number of images per domain in this batch.
    pub fn len(&self) -> usize {
        self.a.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Map values from [-1, 1] to [0, 1].
pub fn to_unit_range(x: &ImageBatch) -> ImageBatch {
    x.mapv(|v| (v + 1.0) * 0.5)
}

/// Map a single image from [-1, 1] to [0, 1].
pub fn image_to_unit_range(x: ArrayView3<f32>) -> Array3<f32> {
    x.mapv(|v| (v + 1.0) * 0.5)
}

/// Sign with `sign(0) = 0`.
///
/// `f32::signum` returns 1.0 for +0.0, which would make the L1 subgradient
/// at an exact match non-zero.
#[inline]
pub fn sign0(v: f32) -> f32 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}
