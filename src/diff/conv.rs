//! 2-D convolution (valid, strided) with explicit backward pass.
//!
//! Padding is a separate op (`pad::Pad2d`) so that zero and reflection padding
//! share one convolution kernel.
//!
//! Per sample the convolution is lowered to a matrix product:
//! ```text
//! cols  = im2col(x)          (C·k·k, OH·OW)
//! y     = W · cols + b       (O, OH·OW)
//! dW   += dy · colsᵀ
//! db   += Σ_spatial dy
//! dx    = col2im(Wᵀ · dy)
//! ```

use crate::core::{Device, Param, ParamKind};
use ndarray::{Array1, Array2, Array3, Array4, ArrayView3, Axis};

#[derive(Clone, Debug)]
pub struct Conv2d {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel: usize,
    pub stride: usize,
    /// Kernel in matmul layout (O, C·k·k)
    pub weight: Param,
    /// (O, 1)
    pub bias: Param,
}

impl Conv2d {
    pub fn new(in_channels: usize, out_channels: usize, kernel: usize, stride: usize) -> Self {
        assert!(kernel > 0 && stride > 0, "kernel and stride must be positive");
        Self {
            in_channels,
            out_channels,
            kernel,
            stride,
            weight: Param::zeros(
                "weight",
                ParamKind::Weight,
                out_channels,
                in_channels * kernel * kernel,
            ),
            bias: Param::zeros("bias", ParamKind::Bias, out_channels, 1),
        }
    }

    /// Spatial output size for an (unpadded) input of `h × w`.
    pub fn output_size(&self, h: usize, w: usize) -> (usize, usize) {
        assert!(
            h >= self.kernel && w >= self.kernel,
            "conv input {h}x{w} smaller than kernel {}",
            self.kernel
        );
        (
            (h - self.kernel) / self.stride + 1,
            (w - self.kernel) / self.stride + 1,
        )
    }

    pub fn forward(&self, x: &Array4<f32>, device: Device) -> Array4<f32> {
        let (n, c, h, w) = x.dim();
        assert_eq!(c, self.in_channels, "conv expects {} input channels", self.in_channels);
        let (oh, ow) = self.output_size(h, w);
        let (k, stride, out_c) = (self.kernel, self.stride, self.out_channels);
        let weight = &self.weight.value;
        let bias = &self.bias.value;

        let outs = device.map_indices(n, |i| {
            let cols = im2col(x.index_axis(Axis(0), i), k, stride, oh, ow);
            let prod = weight.dot(&cols);
            Array3::from_shape_fn((out_c, oh, ow), |(o, y, xx)| {
                prod[[o, y * ow + xx]] + bias[[o, 0]]
            })
        });

        let mut y = Array4::zeros((n, out_c, oh, ow));
        for (i, out) in outs.into_iter().enumerate() {
            y.index_axis_mut(Axis(0), i).assign(&out);
        }
        y
    }

    /// Accumulate dL/dW, dL/db and return dL/dx.
    pub fn backward(
        &mut self,
        x: &Array4<f32>,
        grad_out: &Array4<f32>,
        device: Device,
    ) -> Array4<f32> {
        let (n, c, h, w) = x.dim();
        let (_, out_c, oh, ow) = grad_out.dim();
        assert_eq!(out_c, self.out_channels);
        let (k, stride) = (self.kernel, self.stride);
        let weight = &self.weight.value;

        let per_sample: Vec<(Array2<f32>, Array1<f32>, Array3<f32>)> =
            device.map_indices(n, |i| {
                let cols = im2col(x.index_axis(Axis(0), i), k, stride, oh, ow);
                let g = grad_out.index_axis(Axis(0), i);
                let g2 = Array2::from_shape_fn((out_c, oh * ow), |(o, l)| g[[o, l / ow, l % ow]]);

                let d_weight = g2.dot(&cols.t());
                let d_bias = g2.sum_axis(Axis(1));
                let d_cols = weight.t().dot(&g2);
                let d_x = col2im(&d_cols, c, h, w, k, stride, oh, ow);
                (d_weight, d_bias, d_x)
            });

        let mut grad_in = Array4::zeros((n, c, h, w));
        for (i, (d_weight, d_bias, d_x)) in per_sample.into_iter().enumerate() {
            self.weight.grad += &d_weight;
            for o in 0..out_c {
                self.bias.grad[[o, 0]] += d_bias[o];
            }
            grad_in.index_axis_mut(Axis(0), i).assign(&d_x);
        }
        grad_in
    }

    pub fn params(&self) -> Vec<&Param> {
        vec![&self.weight, &self.bias]
    }

    pub fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.weight, &mut self.bias]
    }
}

/// Unfold receptive fields of one (C, H, W) sample into columns.
fn im2col(x: ArrayView3<f32>, k: usize, stride: usize, oh: usize, ow: usize) -> Array2<f32> {
    let c = x.len_of(Axis(0));
    let mut cols = Array2::zeros((c * k * k, oh * ow));
    for ci in 0..c {
        for ky in 0..k {
            for kx in 0..k {
                let row = (ci * k + ky) * k + kx;
                for oy in 0..oh {
                    let iy = oy * stride + ky;
                    for ox in 0..ow {
                        cols[[row, oy * ow + ox]] = x[[ci, iy, ox * stride + kx]];
                    }
                }
            }
        }
    }
    cols
}

/// Adjoint of `im2col`: scatter-add columns back into a (C, H, W) sample.
#[allow(clippy::too_many_arguments)]
fn col2im(
    cols: &Array2<f32>,
    c: usize,
    h: usize,
    w: usize,
    k: usize,
    stride: usize,
    oh: usize,
    ow: usize,
) -> Array3<f32> {
    let mut x = Array3::zeros((c, h, w));
    for ci in 0..c {
        for ky in 0..k {
            for kx in 0..k {
                let row = (ci * k + ky) * k + kx;
                for oy in 0..oh {
                    let iy = oy * stride + ky;
                    for ox in 0..ow {
                        x[[ci, iy, ox * stride + kx]] += cols[[row, oy * ow + ox]];
                    }
                }
            }
        }
    }
    x
}
