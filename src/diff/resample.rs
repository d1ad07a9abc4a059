//! Spatial resampling: nearest-neighbour ×2 upsampling and 3×3/2 average pooling.

use ndarray::Array4;

/// Nearest-neighbour upsampling by a factor of two.
#[derive(Clone, Copy, Debug, Default)]
pub struct Upsample2x;

impl Upsample2x {
    pub fn forward(&self, x: &Array4<f32>) -> Array4<f32> {
        let (n, c, h, w) = x.dim();
        Array4::from_shape_fn((n, c, 2 * h, 2 * w), |(ni, ci, y, xx)| x[[ni, ci, y / 2, xx / 2]])
    }

    /// Each input pixel feeds a 2×2 block, so its gradient is the block sum.
    pub fn backward(&self, grad_out: &Array4<f32>) -> Array4<f32> {
        let (n, c, h2, w2) = grad_out.dim();
        Array4::from_shape_fn((n, c, h2 / 2, w2 / 2), |(ni, ci, y, xx)| {
            grad_out[[ni, ci, 2 * y, 2 * xx]]
                + grad_out[[ni, ci, 2 * y, 2 * xx + 1]]
                + grad_out[[ni, ci, 2 * y + 1, 2 * xx]]
                + grad_out[[ni, ci, 2 * y + 1, 2 * xx + 1]]
        })
    }
}

/// 3×3 average pool, stride 2, padding 1, padding excluded from the count.
///
/// Used to build the coarser inputs of a multi-scale discriminator.
#[derive(Clone, Copy, Debug, Default)]
pub struct AvgPool2d;

const POOL_K: usize = 3;
const POOL_STRIDE: usize = 2;
const POOL_PAD: usize = 1;

impl AvgPool2d {
    pub fn output_size(h: usize, w: usize) -> (usize, usize) {
        (
            (h + 2 * POOL_PAD - POOL_K) / POOL_STRIDE + 1,
            (w + 2 * POOL_PAD - POOL_K) / POOL_STRIDE + 1,
        )
    }

    /// Input range covered by output index `o` along an axis of length `len`.
    fn window(o: usize, len: usize) -> (usize, usize) {
        let start = (o * POOL_STRIDE).saturating_sub(POOL_PAD);
        let end = (o * POOL_STRIDE + POOL_K - POOL_PAD).min(len);
        (start, end)
    }

    pub fn forward(&self, x: &Array4<f32>) -> Array4<f32> {
        let (n, c, h, w) = x.dim();
        let (oh, ow) = Self::output_size(h, w);
        Array4::from_shape_fn((n, c, oh, ow), |(ni, ci, oy, ox)| {
            let (y0, y1) = Self::window(oy, h);
            let (x0, x1) = Self::window(ox, w);
            let mut sum = 0.0;
            for y in y0..y1 {
                for xx in x0..x1 {
                    sum += x[[ni, ci, y, xx]];
                }
            }
            sum / ((y1 - y0) * (x1 - x0)) as f32
        })
    }

    pub fn backward(
        &self,
        input_dim: (usize, usize, usize, usize),
        grad_out: &Array4<f32>,
    ) -> Array4<f32> {
        let (n, c, h, w) = input_dim;
        let (_, _, oh, ow) = grad_out.dim();
        let mut g = Array4::zeros((n, c, h, w));
        for ni in 0..n {
            for ci in 0..c {
                for oy in 0..oh {
                    let (y0, y1) = Self::window(oy, h);
                    for ox in 0..ow {
                        let (x0, x1) = Self::window(ox, w);
                        let share = grad_out[[ni, ci, oy, ox]] / ((y1 - y0) * (x1 - x0)) as f32;
                        for y in y0..y1 {
                            for xx in x0..x1 {
                                g[[ni, ci, y, xx]] += share;
                            }
                        }
                    }
                }
            }
        }
        g
    }
}
