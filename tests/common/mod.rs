//! Stub networks and collaborators shared by the integration tests.
#![allow(dead_code)]

use cyclegan_rs::core::{ImageBatch, Param, ParamKind, PredictionMap};
use cyclegan_rs::io::{ArtifactError, ArtifactSink};
use cyclegan_rs::logging::TrainLogger;
use cyclegan_rs::models::{Discriminator, Generator, Network};
use ndarray::{Array2, Array4, ArrayView3};

/// `y = x + shift`, with a single trainable shift.
pub struct ShiftGenerator {
    pub shift: Param,
}

impl ShiftGenerator {
    pub fn new(shift: f32) -> Self {
        Self {
            shift: Param::new("shift", ParamKind::Bias, Array2::from_elem((1, 1), shift)),
        }
    }

    pub fn value(&self) -> f32 {
        self.shift.value[[0, 0]]
    }
}

impl Network for ShiftGenerator {
    fn parameters(&self) -> Vec<&Param> {
        vec![&self.shift]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.shift]
    }
}

impl Generator for ShiftGenerator {
    type Trace = ();

    fn forward(&self, x: &ImageBatch) -> (ImageBatch, ()) {
        (x + self.value(), ())
    }

    fn backward(&mut self, _trace: &(), grad_out: &ImageBatch) -> ImageBatch {
        self.shift.grad[[0, 0]] += grad_out.sum();
        grad_out.clone()
    }
}

/// Predicts `mean(x) · gain + bias` for every image as a single 1×1 map.
///
/// With `gain = 0` it is a constant discriminator.
pub struct MeanDiscriminator {
    pub gain: f32,
    pub bias: Param,
}

impl MeanDiscriminator {
    pub fn constant(value: f32) -> Self {
        Self::new(0.0, value)
    }

    pub fn new(gain: f32, bias: f32) -> Self {
        Self {
            gain,
            bias: Param::new("bias", ParamKind::Bias, Array2::from_elem((1, 1), bias)),
        }
    }
}

impl Network for MeanDiscriminator {
    fn parameters(&self) -> Vec<&Param> {
        vec![&self.bias]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.bias]
    }
}

impl Discriminator for MeanDiscriminator {
    type Trace = (usize, usize, usize, usize);

    fn forward(&self, x: &ImageBatch) -> (Vec<PredictionMap>, Self::Trace) {
        let (n, c, h, w) = x.dim();
        let per_image = (c * h * w).max(1) as f32;
        let b = self.bias.value[[0, 0]];
        let map = Array4::from_shape_fn((n, 1, 1, 1), |(i, _, _, _)| {
            let mean = x.index_axis(ndarray::Axis(0), i).sum() / per_image;
            self.gain * mean + b
        });
        (vec![map], x.dim())
    }

    fn backward(&mut self, trace: &Self::Trace, grad_maps: &[PredictionMap]) -> ImageBatch {
        let (n, c, h, w) = *trace;
        let g = &grad_maps[0];
        self.bias.grad[[0, 0]] += g.sum();
        let per_image = (c * h * w).max(1) as f32;
        Array4::from_shape_fn((n, c, h, w), |(i, _, _, _)| g[[i, 0, 0, 0]] * self.gain / per_image)
    }
}

#[derive(Default)]
pub struct CountingLogger {
    pub batches: usize,
    pub epochs_begun: Vec<usize>,
    pub loss_names: Vec<String>,
    pub image_names: Vec<String>,
}

impl TrainLogger for CountingLogger {
    fn begin_epoch(&mut self, epoch: usize, _n_epochs: usize, _n_batches: usize) {
        self.epochs_begun.push(epoch);
    }

    fn log_batch(&mut self, losses: &[(&str, f32)], images: &[(&str, &ImageBatch)]) {
        self.batches += 1;
        self.loss_names = losses.iter().map(|(n, _)| n.to_string()).collect();
        self.image_names = images.iter().map(|(n, _)| n.to_string()).collect();
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub checkpoints: Vec<(usize, String)>,
    pub samples: Vec<(usize, String, (usize, usize, usize))>,
}

impl ArtifactSink for RecordingSink {
    fn save_checkpoint(&mut self, epoch: usize, name: &str, _network: &dyn Network) -> Result<(), ArtifactError> {
        self.checkpoints.push((epoch, name.to_string()));
        Ok(())
    }

    fn save_sample(&mut self, epoch: usize, tag: &str, image: ArrayView3<f32>) -> Result<(), ArtifactError> {
        self.samples.push((epoch, tag.to_string(), image.dim()));
        Ok(())
    }
}

/// Deterministic smooth test image batch with values in (-1, 1).
pub fn wave_batch(dim: (usize, usize, usize, usize), phase: f32) -> ImageBatch {
    Array4::from_shape_fn(dim, |(n, c, y, x)| {
        0.8 * ((x as f32 * 0.9 + y as f32 * 0.4 + c as f32 * 1.7 + n as f32 * 0.3 + phase).sin())
    })
}
