//! Pixel losses with analytic gradients.
//!
//! Every function returns `(loss, d_loss/d_prediction)` with the gradient in
//! the prediction's shape.

use crate::core::{sign0, ImageBatch};
use ndarray::{s, Array2, Array4, ArrayView2, Axis, Zip};

/// Mean absolute error.
pub fn l1_loss_and_grad(pred: &Array4<f32>, target: &Array4<f32>) -> (f32, Array4<f32>) {
    assert_eq!(pred.dim(), target.dim(), "l1: shape mismatch");
    let n = pred.len().max(1) as f32;
    let mut loss = 0.0f32;
    let mut grad = Array4::zeros(pred.raw_dim());
    Zip::from(&mut grad)
        .and(pred)
        .and(target)
        .for_each(|g, &p, &t| {
            let diff = p - t;
            loss += diff.abs();
            *g = sign0(diff) / n;
        });
    (loss / n, grad)
}

/// Mean squared error.
pub fn mse_loss_and_grad(pred: &Array4<f32>, target: &Array4<f32>) -> (f32, Array4<f32>) {
    assert_eq!(pred.dim(), target.dim(), "mse: shape mismatch");
    let n = pred.len().max(1) as f32;
    let mut loss = 0.0f32;
    let mut grad = Array4::zeros(pred.raw_dim());
    Zip::from(&mut grad)
        .and(pred)
        .and(target)
        .for_each(|g, &p, &t| {
            let diff = p - t;
            loss += diff * diff;
            *g = 2.0 * diff / n;
        });
    (loss / n, grad)
}

/// Mean squared error against a constant target of the prediction's shape.
pub fn mse_to_constant_and_grad(pred: &Array4<f32>, target: f32) -> (f32, Array4<f32>) {
    let n = pred.len().max(1) as f32;
    let loss = pred.iter().map(|&p| (p - target) * (p - target)).sum::<f32>() / n;
    let grad = pred.mapv(|p| 2.0 * (p - target) / n);
    (loss, grad)
}

pub const SSIM_WINDOW: usize = 11;
pub const SSIM_SIGMA: f32 = 1.5;
const SSIM_C1: f32 = 0.01 * 0.01;
const SSIM_C2: f32 = 0.03 * 0.03;

fn gaussian_window() -> Vec<f32> {
    let center = (SSIM_WINDOW / 2) as f32;
    let denom = 2.0 * SSIM_SIGMA * SSIM_SIGMA;
    let w: Vec<f32> = (0..SSIM_WINDOW)
        .map(|i| {
            let d = i as f32 - center;
            (-d * d / denom).exp()
        })
        .collect();
    let sum: f32 = w.iter().sum();
    w.into_iter().map(|v| v / sum).collect()
}

/// Valid 1-D correlation along `axis`; an axis shorter than the window is passed through.
fn filter_axis(p: ArrayView2<f32>, win: &[f32], axis: Axis) -> Array2<f32> {
    let k = win.len();
    let len = p.len_of(axis);
    if len < k {
        return p.to_owned();
    }
    let mut dim = p.raw_dim();
    dim[axis.index()] = len - k + 1;
    let along_cols = axis.index() == 1;
    Array2::from_shape_fn(dim, |(i, j)| {
        win.iter()
            .enumerate()
            .map(|(t, &w)| {
                if along_cols {
                    w * p[[i, j + t]]
                } else {
                    w * p[[i + t, j]]
                }
            })
            .sum()
    })
}

/// Adjoint of [`filter_axis`] back to an axis of length `len`.
fn filter_axis_t(g: ArrayView2<f32>, win: &[f32], axis: Axis, len: usize) -> Array2<f32> {
    let k = win.len();
    if len < k {
        return g.to_owned();
    }
    let mut dim = g.raw_dim();
    dim[axis.index()] = len;
    let along_cols = axis.index() == 1;
    let mut out = Array2::zeros(dim);
    for ((i, j), &gv) in g.indexed_iter() {
        for (t, &w) in win.iter().enumerate() {
            if along_cols {
                out[[i, j + t]] += w * gv;
            } else {
                out[[i + t, j]] += w * gv;
            }
        }
    }
    out
}

fn filter2d(p: ArrayView2<f32>, win: &[f32]) -> Array2<f32> {
    let rows = filter_axis(p, win, Axis(1));
    filter_axis(rows.view(), win, Axis(0))
}

fn filter2d_t(g: ArrayView2<f32>, win: &[f32], h: usize, w: usize) -> Array2<f32> {
    let cols = filter_axis_t(g, win, Axis(0), h);
    filter_axis_t(cols.view(), win, Axis(1), w)
}

fn filtered_len(len: usize) -> usize {
    if len < SSIM_WINDOW {
        len
    } else {
        len - SSIM_WINDOW + 1
    }
}

/// Sum of the SSIM map of one plane and, if `d_s` is given, `d_s · dΣS/dy`.
fn plane_ssim(
    x: ArrayView2<f32>,
    y: ArrayView2<f32>,
    win: &[f32],
    d_s: Option<f32>,
) -> (f32, Option<Array2<f32>>) {
    let (h, w) = x.dim();
    let mu_x = filter2d(x, win);
    let mu_y = filter2d(y, win);
    let e_xx = filter2d(x.mapv(|v| v * v).view(), win);
    let e_yy = filter2d(y.mapv(|v| v * v).view(), win);
    let e_xy = filter2d((&x * &y).view(), win);

    let dim = mu_x.raw_dim();
    let mut d_mu = Array2::<f32>::zeros(dim);
    let mut d_eyy = Array2::<f32>::zeros(dim);
    let mut d_exy = Array2::<f32>::zeros(dim);
    let mut sum = 0.0f32;

    for ((i, j), &mx) in mu_x.indexed_iter() {
        let my = mu_y[[i, j]];
        let var_x = e_xx[[i, j]] - mx * mx;
        let var_y = e_yy[[i, j]] - my * my;
        let cov = e_xy[[i, j]] - mx * my;

        let a1 = 2.0 * mx * my + SSIM_C1;
        let a2 = 2.0 * cov + SSIM_C2;
        let b1 = mx * mx + my * my + SSIM_C1;
        let b2 = var_x + var_y + SSIM_C2;
        let ssim = (a1 * a2) / (b1 * b2);
        sum += ssim;

        if let Some(ds) = d_s {
            let g = ds * ssim;
            d_mu[[i, j]] = g * (2.0 * mx / a1 - 2.0 * mx / a2 - 2.0 * my / b1 + 2.0 * my / b2);
            d_eyy[[i, j]] = -g / b2;
            d_exy[[i, j]] = 2.0 * g / a2;
        }
    }

    let grad = d_s.map(|_| {
        let mut dy = filter2d_t(d_mu.view(), win, h, w);
        let t_yy = filter2d_t(d_eyy.view(), win, h, w);
        let t_xy = filter2d_t(d_exy.view(), win, h, w);
        Zip::from(&mut dy)
            .and(&t_yy)
            .and(&t_xy)
            .and(y)
            .and(x)
            .for_each(|d, &tyy, &txy, &yv, &xv| {
                *d += 2.0 * yv * tyy + xv * txy;
            });
        dy
    });
    (sum, grad)
}

fn ssim_impl(x: &ImageBatch, y: &ImageBatch, with_grad: bool) -> (f32, Option<ImageBatch>) {
    assert_eq!(x.dim(), y.dim(), "ssim: shape mismatch");
    let (n, c, h, w) = x.dim();
    let positions = (n * c * filtered_len(h) * filtered_len(w)).max(1) as f32;
    let win = gaussian_window();
    // d(1 - mean S)/dS
    let d_s = with_grad.then_some(-1.0 / positions);

    let mut total = 0.0f32;
    let mut grad = with_grad.then(|| Array4::zeros(y.raw_dim()));
    for ni in 0..n {
        for ci in 0..c {
            let xp = x.slice(s![ni, ci, .., ..]);
            let yp = y.slice(s![ni, ci, .., ..]);
            let (sum, g) = plane_ssim(xp, yp, &win, d_s);
            total += sum;
            if let (Some(grad), Some(g)) = (grad.as_mut(), g) {
                grad.slice_mut(s![ni, ci, .., ..]).assign(&g);
            }
        }
    }
    (total / positions, grad)
}

/// Mean SSIM of two batches with values in [0, 1].
pub fn ssim(x: &ImageBatch, y: &ImageBatch) -> f32 {
    ssim_impl(x, y, false).0
}

/// `1 - SSIM(x, y)` and its gradient with respect to `y`.
pub fn ssim_loss_and_grad(x: &ImageBatch, y: &ImageBatch) -> (f32, ImageBatch) {
    let (value, grad) = ssim_impl(x, y, true);
    let grad = grad.unwrap_or_else(|| Array4::zeros(y.raw_dim()));
    (1.0 - value, grad)
}
