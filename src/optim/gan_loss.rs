//! Least-squares adversarial loss over multi-scale prediction maps.

use super::loss::mse_to_constant_and_grad;
use crate::core::PredictionMap;

pub const REAL_LABEL: f32 = 1.0;
pub const FAKE_LABEL: f32 = 0.0;

/// Sum over scales of `MSE(map, label)`; returns the loss and one gradient per map.
///
/// Scales are summed, not averaged, so adding a scale adds a full loss term.
pub fn gan_loss(maps: &[PredictionMap], target_is_real: bool) -> (f32, Vec<PredictionMap>) {
    let label = if target_is_real { REAL_LABEL } else { FAKE_LABEL };
    let mut total = 0.0f32;
    let mut grads = Vec::with_capacity(maps.len());
    for map in maps {
        let (loss, grad) = mse_to_constant_and_grad(map, label);
        total += loss;
        grads.push(grad);
    }
    (total, grads)
}
