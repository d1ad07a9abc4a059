//! Trainable parameters and weight initialisation.

use ndarray::Array2;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Role of a parameter, used by weight-initialisation policies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    /// Convolution kernel
    Weight,
    /// Per-channel additive bias
    Bias,
}

/// A trainable tensor together with its accumulated gradient.
///
/// Values are stored 2-D: a convolution kernel of shape (O, C, k, k) is kept in
/// its matmul layout (O, C·k·k), a bias as (O, 1). The gradient always has the
/// same shape as the value.
#[derive(Clone, Debug)]
pub struct Param {
    /// Stable name, used as the key in checkpoints
    pub name: String,
    pub kind: ParamKind,
    pub value: Array2<f32>,
    pub grad: Array2<f32>,
}

impl Param {
    pub fn new(name: impl Into<String>, kind: ParamKind, value: Array2<f32>) -> Self {
        let grad = Array2::zeros(value.raw_dim());
        Self {
            name: name.into(),
            kind,
            value,
            grad,
        }
    }

    pub fn zeros(name: impl Into<String>, kind: ParamKind, rows: usize, cols: usize) -> Self {
        Self::new(name, kind, Array2::zeros((rows, cols)))
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }

    /// Number of scalar entries.
    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Prefix the parameter name (used when nesting layers into networks).
    pub fn prefixed(mut self, prefix: &str) -> Self {
        self.name = format!("{prefix}.{}", self.name);
        self
    }
}

/// Weight initialisation policy applied through `Network::init_weights`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum WeightInit {
    /// Draw convolution weights from N(mean, std²); biases are set to zero.
    Normal { mean: f32, std: f32 },
}

impl Default for WeightInit {
    fn default() -> Self {
        WeightInit::Normal {
            mean: 0.0,
            std: 0.02,
        }
    }
}

impl WeightInit {
    /// Re-initialise one parameter in place.
    pub fn apply<R: Rng + ?Sized>(&self, param: &mut Param, rng: &mut R) {
        match (*self, param.kind) {
            (WeightInit::Normal { mean, std }, ParamKind::Weight) => {
                // std is validated positive by callers; fall back to a point mass otherwise.
                match Normal::new(mean, std) {
                    Ok(dist) => param.value.mapv_inplace(|_| dist.sample(rng)),
                    Err(_) => param.value.fill(mean),
                }
            }
            (WeightInit::Normal { .. }, ParamKind::Bias) => param.value.fill(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_normal_init_statistics() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut p = Param::zeros("w", ParamKind::Weight, 64, 256);
        WeightInit::default().apply(&mut p, &mut rng);

        let n = p.len() as f32;
        let mean = p.value.sum() / n;
        let var = p.value.mapv(|v| (v - mean) * (v - mean)).sum() / n;
        assert!(mean.abs() < 2e-3, "mean={mean}");
        assert!((var.sqrt() - 0.02).abs() < 2e-3, "std={}", var.sqrt());
    }

    #[test]
    fn test_bias_is_zeroed() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut p = Param::new("b", ParamKind::Bias, Array2::from_elem((4, 1), 3.0));
        WeightInit::default().apply(&mut p, &mut rng);
        assert!(p.value.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_zero_grad_and_prefix() {
        let mut p = Param::zeros("weight", ParamKind::Weight, 2, 2).prefixed("model.0");
        p.grad.fill(1.5);
        p.zero_grad();
        assert_eq!(p.name, "model.0.weight");
        assert!(p.grad.iter().all(|&g| g == 0.0));
    }
}
