//! Layer stacks with an explicit forward trace.
//!
//! A forward pass returns the output together with a [`Trace`] of whatever each
//! layer needs for its backward pass. Layers themselves stay immutable during
//! forward, so the same network can be applied several times in one step
//! (e.g. a generator producing both a fake and an identity image) and each
//! application is differentiated against its own trace.

use super::activation::Activation;
use super::conv::Conv2d;
use super::norm::{InstanceNorm2d, NormCache};
use super::pad::Pad2d;
use super::resample::{AvgPool2d, Upsample2x};
use crate::core::{Device, Param};
use ndarray::Array4;

#[derive(Clone, Debug)]
pub enum Layer {
    Conv(Conv2d),
    Pad(Pad2d),
    Norm(InstanceNorm2d),
    Act(Activation),
    Upsample(Upsample2x),
    Pool(AvgPool2d),
    Residual(ResidualBlock),
}

/// What one layer saved during forward.
#[derive(Clone, Debug)]
pub enum LayerCache {
    Input(Array4<f32>),
    Output(Array4<f32>),
    Shape((usize, usize, usize, usize)),
    Norm(NormCache),
    Residual(Trace),
    Empty,
}

/// Forward record of a [`Sequential`], consumed by its backward pass.
#[derive(Clone, Debug, Default)]
pub struct Trace {
    pub caches: Vec<LayerCache>,
}

impl Layer {
    fn forward(&self, x: Array4<f32>, device: Device) -> (Array4<f32>, LayerCache) {
        match self {
            Layer::Conv(conv) => {
                let y = conv.forward(&x, device);
                (y, LayerCache::Input(x))
            }
            Layer::Pad(pad) => (pad.forward(&x), LayerCache::Shape(x.dim())),
            Layer::Norm(norm) => {
                let (y, cache) = norm.forward(&x);
                (y, LayerCache::Norm(cache))
            }
            Layer::Act(act) => {
                let y = act.forward(&x);
                if act.saves_output() {
                    (y.clone(), LayerCache::Output(y))
                } else {
                    (y, LayerCache::Input(x))
                }
            }
            Layer::Upsample(up) => (up.forward(&x), LayerCache::Empty),
            Layer::Pool(pool) => (pool.forward(&x), LayerCache::Shape(x.dim())),
            Layer::Residual(block) => {
                let (body, trace) = block.body.forward(&x, device);
                (body + &x, LayerCache::Residual(trace))
            }
        }
    }

    fn backward(&mut self, cache: &LayerCache, grad_out: &Array4<f32>, device: Device) -> Array4<f32> {
        match (self, cache) {
            (Layer::Conv(conv), LayerCache::Input(x)) => conv.backward(x, grad_out, device),
            (Layer::Pad(pad), LayerCache::Shape(dim)) => pad.backward(*dim, grad_out),
            (Layer::Norm(norm), LayerCache::Norm(c)) => norm.backward(c, grad_out),
            (Layer::Act(act), LayerCache::Input(saved) | LayerCache::Output(saved)) => {
                act.backward(saved, grad_out)
            }
            (Layer::Upsample(up), LayerCache::Empty) => up.backward(grad_out),
            (Layer::Pool(pool), LayerCache::Shape(dim)) => pool.backward(*dim, grad_out),
            (Layer::Residual(block), LayerCache::Residual(trace)) => {
                block.body.backward(trace, grad_out, device) + grad_out
            }
            (layer, cache) => panic!(
                "trace entry {} does not belong to layer {}",
                cache.kind(),
                layer.kind()
            ),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Layer::Conv(_) => "conv",
            Layer::Pad(_) => "pad",
            Layer::Norm(_) => "norm",
            Layer::Act(_) => "activation",
            Layer::Upsample(_) => "upsample",
            Layer::Pool(_) => "pool",
            Layer::Residual(_) => "residual",
        }
    }

    fn params(&self) -> Vec<&Param> {
        match self {
            Layer::Conv(conv) => conv.params(),
            Layer::Residual(block) => block.body.params(),
            _ => Vec::new(),
        }
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        match self {
            Layer::Conv(conv) => conv.params_mut(),
            Layer::Residual(block) => block.body.params_mut(),
            _ => Vec::new(),
        }
    }
}

impl LayerCache {
    fn kind(&self) -> &'static str {
        match self {
            LayerCache::Input(_) => "input",
            LayerCache::Output(_) => "output",
            LayerCache::Shape(_) => "shape",
            LayerCache::Norm(_) => "norm",
            LayerCache::Residual(_) => "residual",
            LayerCache::Empty => "empty",
        }
    }
}

/// An ordered stack of layers.
#[derive(Clone, Debug)]
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Sequential {
    /// Build a stack; parameter names become `{prefix}.{index}.{name}`.
    pub fn new(prefix: &str, mut layers: Vec<Layer>) -> Self {
        for (i, layer) in layers.iter_mut().enumerate() {
            for p in layer.params_mut() {
                p.name = format!("{prefix}.{i}.{}", p.name);
            }
        }
        Self { layers }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn forward(&self, x: &Array4<f32>, device: Device) -> (Array4<f32>, Trace) {
        let mut caches = Vec::with_capacity(self.layers.len());
        let mut h = x.clone();
        for layer in &self.layers {
            let (next, cache) = layer.forward(h, device);
            caches.push(cache);
            h = next;
        }
        (h, Trace { caches })
    }

    /// Backpropagate `grad_out` through the stack, accumulating parameter gradients.
    ///
    /// # Panics
    /// If `trace` was not produced by this stack's `forward`.
    pub fn backward(&mut self, trace: &Trace, grad_out: &Array4<f32>, device: Device) -> Array4<f32> {
        assert_eq!(
            trace.caches.len(),
            self.layers.len(),
            "trace length does not match layer count"
        );
        let mut g = grad_out.clone();
        for (layer, cache) in self.layers.iter_mut().zip(trace.caches.iter()).rev() {
            g = layer.backward(cache, &g, device);
        }
        g
    }

    pub fn params(&self) -> Vec<&Param> {
        self.layers.iter().flat_map(Layer::params).collect()
    }

    pub fn params_mut(&mut self) -> Vec<&mut Param> {
        self.layers.iter_mut().flat_map(Layer::params_mut).collect()
    }
}

/// `y = x + body(x)`; the body must preserve the input shape.
#[derive(Clone, Debug)]
pub struct ResidualBlock {
    pub body: Sequential,
}

impl ResidualBlock {
    pub fn new(layers: Vec<Layer>) -> Self {
        Self {
            body: Sequential::new("body", layers),
        }
    }
}
