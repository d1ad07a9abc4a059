//! Pointwise activations.

use ndarray::{Array4, Zip};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Activation {
    Relu,
    LeakyRelu(f32),
    Tanh,
}

impl Activation {
    pub fn forward(&self, x: &Array4<f32>) -> Array4<f32> {
        match *self {
            Activation::Relu => x.mapv(|v| v.max(0.0)),
            Activation::LeakyRelu(slope) => x.mapv(|v| if v > 0.0 { v } else { slope * v }),
            Activation::Tanh => x.mapv(f32::tanh),
        }
    }

    /// `saved` is the forward input for ReLU variants and the forward output for tanh.
    pub fn backward(&self, saved: &Array4<f32>, grad_out: &Array4<f32>) -> Array4<f32> {
        let mut grad_in = grad_out.clone();
        match *self {
            Activation::Relu => {
                Zip::from(&mut grad_in).and(saved).for_each(|g, &x| {
                    if x <= 0.0 {
                        *g = 0.0;
                    }
                });
            }
            Activation::LeakyRelu(slope) => {
                Zip::from(&mut grad_in).and(saved).for_each(|g, &x| {
                    if x <= 0.0 {
                        *g *= slope;
                    }
                });
            }
            Activation::Tanh => {
                Zip::from(&mut grad_in).and(saved).for_each(|g, &y| {
                    *g *= 1.0 - y * y;
                });
            }
        }
        grad_in
    }

    /// Whether backward needs the forward output rather than the input.
    pub fn saves_output(&self) -> bool {
        matches!(self, Activation::Tanh)
    }
}
