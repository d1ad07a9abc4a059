//! ResNet-style generator.
//!
//! ```text
//! reflect-pad 3, conv7, IN, ReLU
//! 2 × (pad 1, conv3 stride 2, IN, ReLU)                downsample
//! n × residual(reflect-pad 1, conv3, IN, ReLU, reflect-pad 1, conv3, IN)
//! 2 × (nearest ×2, pad 1, conv3, IN, ReLU)             upsample
//! reflect-pad 3, conv7, tanh
//! ```
//! Upsampling is resize-then-convolve rather than a transposed convolution;
//! output has the input's spatial size whenever it is divisible by 4.

use super::{Generator, Network};
use crate::core::{Device, ImageBatch, Param};
use crate::diff::{
    Activation, Conv2d, InstanceNorm2d, Layer, Pad2d, ResidualBlock, Sequential, Trace,
    Upsample2x,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub input_nc: usize,
    pub output_nc: usize,
    /// Filters in the first layer
    pub ngf: usize,
    pub n_residual_blocks: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            input_nc: 3,
            output_nc: 3,
            ngf: 64,
            n_residual_blocks: 9,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ResnetGenerator {
    pub config: GeneratorConfig,
    device: Device,
    model: Sequential,
}

fn residual_block(features: usize) -> Layer {
    Layer::Residual(ResidualBlock::new(vec![
        Layer::Pad(Pad2d::reflect(1)),
        Layer::Conv(Conv2d::new(features, features, 3, 1)),
        Layer::Norm(InstanceNorm2d::default()),
        Layer::Act(Activation::Relu),
        Layer::Pad(Pad2d::reflect(1)),
        Layer::Conv(Conv2d::new(features, features, 3, 1)),
        Layer::Norm(InstanceNorm2d::default()),
    ]))
}

impl ResnetGenerator {
    pub fn new(config: GeneratorConfig, device: Device) -> Self {
        let mut layers = vec![
            Layer::Pad(Pad2d::reflect(3)),
            Layer::Conv(Conv2d::new(config.input_nc, config.ngf, 7, 1)),
            Layer::Norm(InstanceNorm2d::default()),
            Layer::Act(Activation::Relu),
        ];

        let mut features = config.ngf;
        for _ in 0..2 {
            layers.push(Layer::Pad(Pad2d::zero(1)));
            layers.push(Layer::Conv(Conv2d::new(features, features * 2, 3, 2)));
            layers.push(Layer::Norm(InstanceNorm2d::default()));
            layers.push(Layer::Act(Activation::Relu));
            features *= 2;
        }

        for _ in 0..config.n_residual_blocks {
            layers.push(residual_block(features));
        }

        for _ in 0..2 {
            layers.push(Layer::Upsample(Upsample2x));
            layers.push(Layer::Pad(Pad2d::zero(1)));
            layers.push(Layer::Conv(Conv2d::new(features, features / 2, 3, 1)));
            layers.push(Layer::Norm(InstanceNorm2d::default()));
            layers.push(Layer::Act(Activation::Relu));
            features /= 2;
        }

        layers.push(Layer::Pad(Pad2d::reflect(3)));
        layers.push(Layer::Conv(Conv2d::new(features, config.output_nc, 7, 1)));
        layers.push(Layer::Act(Activation::Tanh));

        Self {
            config,
            device,
            model: Sequential::new("model", layers),
        }
    }

    pub fn device(&self) -> Device {
        self.device
    }
}

impl Network for ResnetGenerator {
    fn parameters(&self) -> Vec<&Param> {
        self.model.params()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        self.model.params_mut()
    }
}

impl Generator for ResnetGenerator {
    type Trace = Trace;

    fn forward(&self, x: &ImageBatch) -> (ImageBatch, Trace) {
        self.model.forward(x, self.device)
    }

    fn backward(&mut self, trace: &Trace, grad_out: &ImageBatch) -> ImageBatch {
        self.model.backward(trace, grad_out, self.device)
    }
}
