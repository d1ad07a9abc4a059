//! One optimisation step for the generator pair and for each discriminator.
//!
//! Generator step, with `L1` the mean absolute error and `D(x)` the list of
//! prediction maps:
//! ```text
//! identity  = w_id  · (L1(G_A2B(B), B) + L1(G_B2A(A), A))
//! gan       = w_adv · (GAN(D_B(G_A2B(A)), real) + GAN(D_A(G_B2A(B)), real))
//! cycle     = w_cyc · (L1(G_B2A(fake_B), A) + L1(G_A2B(fake_A), B))
//! ssim      = w_ssim · ((1 - SSIM(A01, rec_A01)) + (1 - SSIM(B01, rec_B01)))
//! ```
//! where `X01` is `X` mapped to [0, 1]. Gradients of every term reach both
//! generators in a single accumulated backward pass before one Adam step.

use super::adam::Adam;
use super::gan_loss::gan_loss;
use super::loss::{l1_loss_and_grad, ssim_loss_and_grad};
use super::replay::ReplayBuffer;
use crate::core::{to_unit_range, ImageBatch, PredictionMap};
use crate::models::{Discriminator, Generator};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LossWeights {
    pub identity: f32,
    pub cycle: f32,
    pub adversarial: f32,
    pub ssim: f32,
}

impl Default for LossWeights {
    fn default() -> Self {
        Self {
            identity: 5.0,
            cycle: 10.0,
            adversarial: 1.0,
            ssim: 1.0,
        }
    }
}

/// The eight weighted generator terms and their sum.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GeneratorLosses {
    pub identity_a: f32,
    pub identity_b: f32,
    pub gan_a2b: f32,
    pub gan_b2a: f32,
    pub cycle_aba: f32,
    pub cycle_bab: f32,
    /// `1 - SSIM(real_A, rec_A)`
    pub ssim_a: f32,
    pub ssim_b: f32,
    pub total: f32,
}

impl GeneratorLosses {
    pub fn terms(&self) -> [f32; 8] {
        [
            self.identity_a,
            self.identity_b,
            self.gan_a2b,
            self.gan_b2a,
            self.cycle_aba,
            self.cycle_bab,
            self.ssim_a,
            self.ssim_b,
        ]
    }
}

#[derive(Clone, Debug)]
pub struct GeneratorOutputs {
    pub fake_a: ImageBatch,
    pub fake_b: ImageBatch,
    pub rec_a: ImageBatch,
    pub rec_b: ImageBatch,
    pub losses: GeneratorLosses,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DiscriminatorLosses {
    pub real: f32,
    pub fake: f32,
    pub total: f32,
}

pub fn discriminator_total(real: f32, fake: f32) -> f32 {
    (real + fake) * 0.5
}

fn scaled(mut maps: Vec<PredictionMap>, factor: f32) -> Vec<PredictionMap> {
    for m in &mut maps {
        *m *= factor;
    }
    maps
}

/// Joint update of both generators.
///
/// Both discriminators are evaluated (and accumulate parameter gradients)
/// but are not updated; their own steps zero those gradients first.
#[allow(clippy::too_many_arguments)]
pub fn generator_step<G, D>(
    g_a2b: &mut G,
    g_b2a: &mut G,
    d_a: &mut D,
    d_b: &mut D,
    optimizer: &mut Adam,
    real_a: &ImageBatch,
    real_b: &ImageBatch,
    weights: &LossWeights,
) -> GeneratorOutputs
where
    G: Generator,
    D: Discriminator,
{
    g_a2b.zero_grad();
    g_b2a.zero_grad();

    // Identity
    let (same_b, trace) = g_a2b.forward(real_b);
    let (identity_b, d_same_b) = l1_loss_and_grad(&same_b, real_b);
    g_a2b.backward(&trace, &(d_same_b * weights.identity));

    let (same_a, trace) = g_b2a.forward(real_a);
    let (identity_a, d_same_a) = l1_loss_and_grad(&same_a, real_a);
    g_b2a.backward(&trace, &(d_same_a * weights.identity));

    // Adversarial
    let (fake_b, trace_fake_b) = g_a2b.forward(real_a);
    let (pred, trace) = d_b.forward(&fake_b);
    let (gan_a2b, d_pred) = gan_loss(&pred, true);
    let mut d_fake_b = d_b.backward(&trace, &scaled(d_pred, weights.adversarial));

    let (fake_a, trace_fake_a) = g_b2a.forward(real_b);
    let (pred, trace) = d_a.forward(&fake_a);
    let (gan_b2a, d_pred) = gan_loss(&pred, true);
    let mut d_fake_a = d_a.backward(&trace, &scaled(d_pred, weights.adversarial));

    // Cycle and structural similarity, both on the recovered images
    let (rec_a, trace_rec_a) = g_b2a.forward(&fake_b);
    let (cycle_aba, d_cycle_a) = l1_loss_and_grad(&rec_a, real_a);
    let (ssim_a, d_ssim_a) = ssim_loss_and_grad(&to_unit_range(real_a), &to_unit_range(&rec_a));
    let d_rec_a = d_cycle_a * weights.cycle + d_ssim_a * (0.5 * weights.ssim);
    d_fake_b += &g_b2a.backward(&trace_rec_a, &d_rec_a);

    let (rec_b, trace_rec_b) = g_a2b.forward(&fake_a);
    let (cycle_bab, d_cycle_b) = l1_loss_and_grad(&rec_b, real_b);
    let (ssim_b, d_ssim_b) = ssim_loss_and_grad(&to_unit_range(real_b), &to_unit_range(&rec_b));
    let d_rec_b = d_cycle_b * weights.cycle + d_ssim_b * (0.5 * weights.ssim);
    d_fake_a += &g_a2b.backward(&trace_rec_b, &d_rec_b);

    g_a2b.backward(&trace_fake_b, &d_fake_b);
    g_b2a.backward(&trace_fake_a, &d_fake_a);

    let mut params = g_a2b.parameters_mut();
    params.extend(g_b2a.parameters_mut());
    optimizer.step(&mut params);

    let mut losses = GeneratorLosses {
        identity_a: identity_a * weights.identity,
        identity_b: identity_b * weights.identity,
        gan_a2b: gan_a2b * weights.adversarial,
        gan_b2a: gan_b2a * weights.adversarial,
        cycle_aba: cycle_aba * weights.cycle,
        cycle_bab: cycle_bab * weights.cycle,
        ssim_a: ssim_a * weights.ssim,
        ssim_b: ssim_b * weights.ssim,
        total: 0.0,
    };
    losses.total = losses.terms().iter().sum();

    GeneratorOutputs {
        fake_a,
        fake_b,
        rec_a,
        rec_b,
        losses,
    }
}

/// Update one discriminator on real images and replay-mixed fakes.
///
/// The fake branch's input gradient is dropped, so nothing flows back to the
/// generator that produced `fake`.
pub fn discriminator_step<D, R>(
    d: &mut D,
    optimizer: &mut Adam,
    buffer: &mut ReplayBuffer<R>,
    real: &ImageBatch,
    fake: &ImageBatch,
) -> DiscriminatorLosses
where
    D: Discriminator,
    R: Rng,
{
    d.zero_grad();

    let (pred, trace) = d.forward(real);
    let (real_loss, d_pred) = gan_loss(&pred, true);
    d.backward(&trace, &scaled(d_pred, 0.5));

    let sample = buffer.push_and_pop(fake);
    let (pred, trace) = d.forward(&sample);
    let (fake_loss, d_pred) = gan_loss(&pred, false);
    d.backward(&trace, &scaled(d_pred, 0.5));

    optimizer.step(&mut d.parameters_mut());

    DiscriminatorLosses {
        real: real_loss,
        fake: fake_loss,
        total: discriminator_total(real_loss, fake_loss),
    }
}
