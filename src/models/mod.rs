//! Network capability traits and the default architectures.
//!
//! The training core only talks to [`Generator`] and [`Discriminator`]; any
//! type that can run a forward pass, backpropagate through its own trace and
//! expose its parameters can be trained.

mod discriminator;
mod generator;

pub use discriminator::{
    DiscriminatorConfig, MultiscaleDiscriminator, MultiscaleTrace, NLayerDiscriminator,
};
pub use generator::{GeneratorConfig, ResnetGenerator};

use crate::core::{ImageBatch, Param, PredictionMap, WeightInit};
use rand::RngCore;

/// Anything with trainable parameters.
pub trait Network {
    /// Parameters in a stable order (the order is the checkpoint order).
    fn parameters(&self) -> Vec<&Param>;

    fn parameters_mut(&mut self) -> Vec<&mut Param>;

    fn zero_grad(&mut self) {
        for p in self.parameters_mut() {
            p.zero_grad();
        }
    }

    /// Weight initialisation hook.
    fn init_weights(&mut self, init: WeightInit, rng: &mut dyn RngCore) {
        for p in self.parameters_mut() {
            init.apply(p, rng);
        }
    }

    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.len()).sum()
    }
}

/// Image batch → image batch.
pub trait Generator: Network {
    type Trace;

    fn forward(&self, x: &ImageBatch) -> (ImageBatch, Self::Trace);

    /// Accumulate parameter gradients for `grad_out` and return the input gradient.
    fn backward(&mut self, trace: &Self::Trace, grad_out: &ImageBatch) -> ImageBatch;

    /// Forward pass without keeping the trace.
    fn apply(&self, x: &ImageBatch) -> ImageBatch {
        self.forward(x).0
    }
}

/// Image batch → one prediction map per scale.
pub trait Discriminator: Network {
    type Trace;

    fn forward(&self, x: &ImageBatch) -> (Vec<PredictionMap>, Self::Trace);

    /// `grad_maps` holds one gradient per returned prediction map, in order.
    fn backward(&mut self, trace: &Self::Trace, grad_maps: &[PredictionMap]) -> ImageBatch;

    fn apply(&self, x: &ImageBatch) -> Vec<PredictionMap> {
        self.forward(x).0
    }
}
