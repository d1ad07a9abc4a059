//! PatchGAN discriminators, single- and multi-scale.

use super::{Discriminator, Network};
use crate::core::{Device, ImageBatch, Param, PredictionMap};
use crate::diff::{Activation, AvgPool2d, Conv2d, InstanceNorm2d, Layer, Pad2d, Sequential, Trace};
use serde::{Deserialize, Serialize};

const KERNEL: usize = 4;
const PAD: usize = 2;
const MAX_FEATURES: usize = 512;
const LEAK: f32 = 0.2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscriminatorConfig {
    pub input_nc: usize,
    /// Filters in the first layer
    pub ndf: usize,
    pub n_layers: usize,
    /// Number of scales
    pub num_d: usize,
}

impl Default for DiscriminatorConfig {
    fn default() -> Self {
        Self {
            input_nc: 3,
            ndf: 64,
            n_layers: 3,
            num_d: 1,
        }
    }
}

/// Fully convolutional PatchGAN with `n_layers` stride-2 stages.
#[derive(Clone, Debug)]
pub struct NLayerDiscriminator {
    device: Device,
    model: Sequential,
}

impl NLayerDiscriminator {
    pub fn new(input_nc: usize, ndf: usize, n_layers: usize, device: Device) -> Self {
        let mut layers = vec![
            Layer::Pad(Pad2d::zero(PAD)),
            Layer::Conv(Conv2d::new(input_nc, ndf, KERNEL, 2)),
            Layer::Act(Activation::LeakyRelu(LEAK)),
        ];

        let mut nf = ndf;
        for _ in 1..n_layers {
            let prev = nf;
            nf = (nf * 2).min(MAX_FEATURES);
            layers.extend(stage(prev, nf, 2));
        }

        let prev = nf;
        nf = (nf * 2).min(MAX_FEATURES);
        layers.extend(stage(prev, nf, 1));

        layers.push(Layer::Pad(Pad2d::zero(PAD)));
        layers.push(Layer::Conv(Conv2d::new(nf, 1, KERNEL, 1)));

        Self {
            device,
            model: Sequential::new("model", layers),
        }
    }

    fn forward_map(&self, x: &ImageBatch) -> (PredictionMap, Trace) {
        self.model.forward(x, self.device)
    }

    fn backward_map(&mut self, trace: &Trace, grad: &PredictionMap) -> ImageBatch {
        self.model.backward(trace, grad, self.device)
    }
}

fn stage(in_nc: usize, out_nc: usize, stride: usize) -> [Layer; 4] {
    [
        Layer::Pad(Pad2d::zero(PAD)),
        Layer::Conv(Conv2d::new(in_nc, out_nc, KERNEL, stride)),
        Layer::Norm(InstanceNorm2d::default()),
        Layer::Act(Activation::LeakyRelu(LEAK)),
    ]
}

impl Network for NLayerDiscriminator {
    fn parameters(&self) -> Vec<&Param> {
        self.model.params()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        self.model.params_mut()
    }
}

impl Discriminator for NLayerDiscriminator {
    type Trace = Trace;

    fn forward(&self, x: &ImageBatch) -> (Vec<PredictionMap>, Trace) {
        let (map, trace) = self.forward_map(x);
        (vec![map], trace)
    }

    fn backward(&mut self, trace: &Trace, grad_maps: &[PredictionMap]) -> ImageBatch {
        assert_eq!(grad_maps.len(), 1, "single-scale discriminator takes one map gradient");
        self.backward_map(trace, &grad_maps[0])
    }
}

/// `num_d` PatchGANs applied to successively average-pooled copies of the input.
///
/// Prediction maps are returned full resolution first.
#[derive(Clone, Debug)]
pub struct MultiscaleDiscriminator {
    pub config: DiscriminatorConfig,
    scales: Vec<NLayerDiscriminator>,
}

#[derive(Clone, Debug)]
pub struct MultiscaleTrace {
    scales: Vec<Trace>,
    /// Input shape at each scale, needed to undo the pooling
    dims: Vec<(usize, usize, usize, usize)>,
}

impl MultiscaleDiscriminator {
    pub fn new(config: DiscriminatorConfig, device: Device) -> Self {
        assert!(config.num_d > 0, "need at least one discriminator scale");
        let scales = (0..config.num_d)
            .map(|i| {
                let mut d =
                    NLayerDiscriminator::new(config.input_nc, config.ndf, config.n_layers, device);
                for p in d.parameters_mut() {
                    p.name = format!("scale{i}.{}", p.name);
                }
                d
            })
            .collect();
        Self { config, scales }
    }

    pub fn num_scales(&self) -> usize {
        self.scales.len()
    }
}

impl Network for MultiscaleDiscriminator {
    fn parameters(&self) -> Vec<&Param> {
        self.scales.iter().flat_map(|d| d.parameters()).collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        self.scales.iter_mut().flat_map(|d| d.parameters_mut()).collect()
    }
}

impl Discriminator for MultiscaleDiscriminator {
    type Trace = MultiscaleTrace;

    fn forward(&self, x: &ImageBatch) -> (Vec<PredictionMap>, MultiscaleTrace) {
        let mut maps = Vec::with_capacity(self.scales.len());
        let mut traces = Vec::with_capacity(self.scales.len());
        let mut dims = Vec::with_capacity(self.scales.len());

        let mut input = x.clone();
        for (i, d) in self.scales.iter().enumerate() {
            let (map, trace) = d.forward_map(&input);
            maps.push(map);
            traces.push(trace);
            dims.push(input.dim());
            if i + 1 < self.scales.len() {
                input = AvgPool2d.forward(&input);
            }
        }
        (maps, MultiscaleTrace { scales: traces, dims })
    }

    fn backward(&mut self, trace: &MultiscaleTrace, grad_maps: &[PredictionMap]) -> ImageBatch {
        assert_eq!(
            grad_maps.len(),
            self.scales.len(),
            "one gradient per prediction map"
        );
        // Walk from the coarsest scale, folding each pooled gradient into the finer input.
        let mut carry: Option<ImageBatch> = None;
        for i in (0..self.scales.len()).rev() {
            let mut g = self.scales[i].backward_map(&trace.scales[i], &grad_maps[i]);
            if let Some(c) = carry.take() {
                g += &c;
            }
            if i == 0 {
                return g;
            }
            carry = Some(AvgPool2d.backward(trace.dims[i - 1], &g));
        }
        unreachable!("at least one scale")
    }
}
