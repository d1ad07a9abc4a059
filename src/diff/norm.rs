//! Instance normalisation (non-affine).
//!
//! Each (sample, channel) plane is normalised to zero mean and unit variance:
//! `x̂ = (x - μ) / sqrt(σ² + eps)` with the biased variance.
//!
//! Backward, with M pixels per plane:
//! `dx = inv_std / M · (M·dy - Σdy - x̂ · Σ(dy·x̂))`

use ndarray::{Array2, Array4, Axis};

pub const INSTANCE_NORM_EPS: f32 = 1e-5;

#[derive(Clone, Copy, Debug)]
pub struct InstanceNorm2d {
    pub eps: f32,
}

impl Default for InstanceNorm2d {
    fn default() -> Self {
        Self {
            eps: INSTANCE_NORM_EPS,
        }
    }
}

/// Saved forward state: the normalised output and 1/std per plane.
#[derive(Clone, Debug)]
pub struct NormCache {
    pub normalized: Array4<f32>,
    pub inv_std: Array2<f32>,
}

impl InstanceNorm2d {
    pub fn forward(&self, x: &Array4<f32>) -> (Array4<f32>, NormCache) {
        let (n, c, _, _) = x.dim();
        let mut y = x.clone();
        let mut inv_std = Array2::zeros((n, c));

        for ni in 0..n {
            for ci in 0..c {
                let mut plane = y.index_axis_mut(Axis(0), ni);
                let mut plane = plane.index_axis_mut(Axis(0), ci);
                let m = plane.len() as f32;
                let mean = plane.sum() / m;
                let var = plane.iter().map(|&v| (v - mean) * (v - mean)).sum::<f32>() / m;
                let s = 1.0 / (var + self.eps).sqrt();
                plane.mapv_inplace(|v| (v - mean) * s);
                inv_std[[ni, ci]] = s;
            }
        }

        let cache = NormCache {
            normalized: y.clone(),
            inv_std,
        };
        (y, cache)
    }

    pub fn backward(&self, cache: &NormCache, grad_out: &Array4<f32>) -> Array4<f32> {
        let (n, c, _, _) = grad_out.dim();
        let mut grad_in = grad_out.clone();

        for ni in 0..n {
            for ci in 0..c {
                let x_hat = cache.normalized.index_axis(Axis(0), ni);
                let x_hat = x_hat.index_axis(Axis(0), ci);
                let mut g = grad_in.index_axis_mut(Axis(0), ni);
                let mut g = g.index_axis_mut(Axis(0), ci);

                let m = g.len() as f32;
                let sum_g = g.sum();
                let sum_gx = g.iter().zip(x_hat.iter()).map(|(a, b)| a * b).sum::<f32>();
                let s = cache.inv_std[[ni, ci]];

                g.zip_mut_with(&x_hat, |gv, &xh| {
                    *gv = s / m * (m * *gv - sum_g - xh * sum_gx);
                });
            }
        }
        grad_in
    }
}
