//! History of generated images shown to the discriminators.
//!
//! Mixing older fakes into each discriminator batch keeps the discriminator
//! from overfitting to the generator's latest output.

use crate::core::ImageBatch;
use ndarray::{Array3, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const DEFAULT_POOL_SIZE: usize = 50;

/// Bounded store of past fakes with an injected random source.
///
/// Until `max_size` images are stored every input is stored and echoed. Once
/// full, each input is with probability 1/2 swapped for a uniformly chosen
/// stored image (which is returned in its place), otherwise echoed without
/// being stored.
pub struct ReplayBuffer<R = StdRng> {
    max_size: usize,
    data: Vec<Array3<f32>>,
    rng: R,
}

impl ReplayBuffer<StdRng> {
    pub fn new(max_size: usize, seed: u64) -> Self {
        Self::with_rng(max_size, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> ReplayBuffer<R> {
    pub fn with_rng(max_size: usize, rng: R) -> Self {
        Self {
            max_size,
            data: Vec::with_capacity(max_size),
            rng,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    /// Images currently held, in slot order.
    pub fn images(&self) -> &[Array3<f32>] {
        &self.data
    }

    /// Exchange a batch image by image; the result has the input's shape.
    ///
    /// The returned batch is a fresh copy, so it carries no link to the
    /// generator pass that produced the input.
    pub fn push_and_pop(&mut self, batch: &ImageBatch) -> ImageBatch {
        let mut out = batch.clone();
        if self.max_size == 0 {
            return out;
        }
        for (i, image) in batch.axis_iter(Axis(0)).enumerate() {
            if self.data.len() < self.max_size {
                self.data.push(image.to_owned());
            } else if self.rng.gen::<f64>() > 0.5 {
                let j = self.rng.gen_range(0..self.max_size);
                let old = std::mem::replace(&mut self.data[j], image.to_owned());
                out.index_axis_mut(Axis(0), i).assign(&old);
            }
        }
        out
    }
}
