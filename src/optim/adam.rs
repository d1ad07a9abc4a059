//! Adam optimizer over network parameters.
//!
//! Moment buffers are keyed by position in the parameter slice passed to
//! [`Adam::step`], so callers must pass parameters in the same order every
//! step (networks return them in construction order).

use crate::core::Param;
use ndarray::{Array2, Zip};

pub const DEFAULT_BETAS: (f32, f32) = (0.5, 0.999);
pub const DEFAULT_EPS: f32 = 1e-8;

pub struct Adam {
    pub lr: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
    t: u32,
    m: Vec<Array2<f32>>,
    v: Vec<Array2<f32>>,
}

impl Adam {
    pub fn new(lr: f32, beta1: f32, beta2: f32, eps: f32) -> Self {
        Self {
            lr,
            beta1,
            beta2,
            eps,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    /// Adam with GAN-style betas (0.5, 0.999).
    pub fn with_lr(lr: f32) -> Self {
        Self::new(lr, DEFAULT_BETAS.0, DEFAULT_BETAS.1, DEFAULT_EPS)
    }

    pub fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    pub fn timestep(&self) -> u32 {
        self.t
    }

    /// Allocate zeroed moments for any parameter not seen yet.
    fn ensure_len(&mut self, params: &[&mut Param]) {
        if self.m.len() != params.len() {
            self.m.truncate(params.len());
            self.v.truncate(params.len());
            for p in &params[self.m.len()..] {
                self.m.push(Array2::zeros(p.value.raw_dim()));
                self.v.push(Array2::zeros(p.value.raw_dim()));
            }
        }
    }

    /// One update from the gradients currently accumulated in `params`.
    pub fn step(&mut self, params: &mut [&mut Param]) {
        self.ensure_len(params);

        self.t += 1;
        let t = self.t as f32;
        let (b1, b2, lr, eps) = (self.beta1, self.beta2, self.lr, self.eps);

        let bias1 = 1.0 - b1.powf(t);
        let bias2 = 1.0 - b2.powf(t);

        for (i, p) in params.iter_mut().enumerate() {
            let p = &mut **p;
            assert_eq!(
                self.m[i].dim(),
                p.value.dim(),
                "parameter {} changed shape between steps",
                p.name
            );
            Zip::from(&mut p.value)
                .and(&p.grad)
                .and(&mut self.m[i])
                .and(&mut self.v[i])
                .for_each(|w, &g, m, v| {
                    *m = *m * b1 + g * (1.0 - b1);
                    *v = *v * b2 + g * g * (1.0 - b2);

                    let m_hat = *m / bias1;
                    let v_hat = *v / bias2;

                    *w -= lr * m_hat / (v_hat.sqrt() + eps);
                });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ParamKind;
    use approx::assert_relative_eq;

    #[test]
    fn test_first_step_moves_by_lr() {
        // With bias correction the first step is lr·sign(g) for |g| >> eps.
        let mut opt = Adam::with_lr(0.01);
        let mut p = Param::new("w", ParamKind::Weight, Array2::from_elem((2, 2), 1.0));
        p.grad = Array2::from_shape_vec((2, 2), vec![3.0, -0.5, 1e-3, -7.0]).unwrap();
        opt.step(&mut [&mut p]);

        let expected = [0.99, 1.01, 0.99, 1.01];
        for (w, e) in p.value.iter().zip(expected) {
            assert_relative_eq!(*w, e, epsilon = 1e-5);
        }
        assert_eq!(opt.timestep(), 1);
    }

    #[test]
    fn test_moments_follow_parameter_order() {
        let mut opt = Adam::with_lr(0.1);
        let mut a = Param::zeros("a", ParamKind::Weight, 1, 1);
        let mut b = Param::zeros("b", ParamKind::Bias, 3, 1);
        a.grad.fill(1.0);
        opt.step(&mut [&mut a, &mut b]);
        // Zero gradient keeps b still.
        assert!(b.value.iter().all(|&v| v == 0.0));
        assert!(a.value[[0, 0]] < 0.0);
    }

    #[test]
    fn test_zero_lr_is_a_no_op() {
        let mut opt = Adam::with_lr(0.0);
        let mut p = Param::new("w", ParamKind::Weight, Array2::from_elem((1, 3), 0.5));
        p.grad.fill(2.0);
        opt.step(&mut [&mut p]);
        assert!(p.value.iter().all(|&v| v == 0.5));
    }
}
