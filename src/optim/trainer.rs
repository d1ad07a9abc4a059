//! Training orchestration.
//!
//! Per batch: generator step, then discriminator A, then discriminator B.
//! Per epoch: advance the three learning-rate schedules, checkpoint all four
//! networks every `checkpoint_interval` epochs (1-based), and save sample
//! images from the epoch's last batch.

use super::adam::Adam;
use super::replay::ReplayBuffer;
use super::schedule::{LinearDecaySchedule, ScheduleError};
use super::step::{
    discriminator_step, generator_step, DiscriminatorLosses, GeneratorOutputs, LossWeights,
};
use crate::core::{image_to_unit_range, Batch, ImageBatch};
use crate::io::{ArtifactError, ArtifactSink, BatchSource, DatasetError};
use crate::logging::TrainLogger;
use crate::models::{Discriminator, Generator, Network};
use ndarray::Axis;
use serde::Serialize;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

/// Network names used for checkpoints.
pub const NET_G_A2B: &str = "netG_A2B";
pub const NET_G_B2A: &str = "netG_B2A";
pub const NET_D_A: &str = "netD_A";
pub const NET_D_B: &str = "netD_B";

#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("failed to save artifact: {0}")]
    Artifact(#[from] ArtifactError),
}

#[derive(Clone, Debug, Serialize)]
pub struct TrainSettings {
    pub start_epoch: usize,
    pub n_epochs: usize,
    pub decay_epoch: usize,
    pub lr: f32,
    pub pool_size: usize,
    pub seed: u64,
    pub checkpoint_interval: usize,
    pub weights: LossWeights,
}

impl Default for TrainSettings {
    fn default() -> Self {
        Self {
            start_epoch: 0,
            n_epochs: 200,
            decay_epoch: 100,
            lr: 2e-4,
            pool_size: 50,
            seed: 0,
            checkpoint_interval: 5,
            weights: LossWeights::default(),
        }
    }
}

/// Everything one training step produced.
#[derive(Clone, Debug)]
pub struct StepReport {
    pub generator: GeneratorOutputs,
    pub d_a: DiscriminatorLosses,
    pub d_b: DiscriminatorLosses,
}

impl StepReport {
    /// Logged scalar losses. `loss_cycle` holds only the A→B→A term.
    pub fn losses(&self) -> [(&'static str, f32); 7] {
        let g = &self.generator.losses;
        [
            ("loss_G", g.total),
            ("loss_GAN", g.gan_a2b + g.gan_b2a),
            ("loss_cycle", g.cycle_aba),
            ("loss_identity", g.identity_a + g.identity_b),
            ("ssim_A", g.ssim_a),
            ("ssim_B", g.ssim_b),
            ("loss_D", self.d_a.total + self.d_b.total),
        ]
    }
}

struct EpochSample {
    real_a: ImageBatch,
    fake_b: ImageBatch,
}

/// Two generators, two discriminators and all optimisation state.
pub struct CycleGan<G, D> {
    pub g_a2b: G,
    pub g_b2a: G,
    pub d_a: D,
    pub d_b: D,
    settings: TrainSettings,
    opt_g: Adam,
    opt_d_a: Adam,
    opt_d_b: Adam,
    sched_g: LinearDecaySchedule,
    sched_d_a: LinearDecaySchedule,
    sched_d_b: LinearDecaySchedule,
    buffer_a: ReplayBuffer,
    buffer_b: ReplayBuffer,
}

impl<G: Generator, D: Discriminator> CycleGan<G, D> {
    pub fn new(g_a2b: G, g_b2a: G, d_a: D, d_b: D, settings: TrainSettings) -> Result<Self, TrainError> {
        let schedule = || {
            LinearDecaySchedule::new(settings.n_epochs, settings.start_epoch, settings.decay_epoch)
        };
        let (sched_g, sched_d_a, sched_d_b) = (schedule()?, schedule()?, schedule()?);
        let lr = sched_g.lr(settings.lr);

        Ok(Self {
            g_a2b,
            g_b2a,
            d_a,
            d_b,
            opt_g: Adam::with_lr(lr),
            opt_d_a: Adam::with_lr(lr),
            opt_d_b: Adam::with_lr(lr),
            sched_g,
            sched_d_a,
            sched_d_b,
            buffer_a: ReplayBuffer::new(settings.pool_size, settings.seed),
            buffer_b: ReplayBuffer::new(settings.pool_size, settings.seed.wrapping_add(1)),
            settings,
        })
    }

    pub fn settings(&self) -> &TrainSettings {
        &self.settings
    }

    /// Current learning rates of the G, D_A and D_B optimizers.
    pub fn learning_rates(&self) -> [f32; 3] {
        [self.opt_g.lr, self.opt_d_a.lr, self.opt_d_b.lr]
    }

    pub fn networks(&self) -> [(&'static str, &dyn Network); 4] {
        [
            (NET_G_A2B, &self.g_a2b),
            (NET_G_B2A, &self.g_b2a),
            (NET_D_A, &self.d_a),
            (NET_D_B, &self.d_b),
        ]
    }

    pub fn networks_mut(&mut self) -> [(&'static str, &mut dyn Network); 4] {
        [
            (NET_G_A2B, &mut self.g_a2b),
            (NET_G_B2A, &mut self.g_b2a),
            (NET_D_A, &mut self.d_a),
            (NET_D_B, &mut self.d_b),
        ]
    }

    pub fn train_step(&mut self, batch: &Batch) -> StepReport {
        let generator = generator_step(
            &mut self.g_a2b,
            &mut self.g_b2a,
            &mut self.d_a,
            &mut self.d_b,
            &mut self.opt_g,
            &batch.a,
            &batch.b,
            &self.settings.weights,
        );
        let d_a = discriminator_step(
            &mut self.d_a,
            &mut self.opt_d_a,
            &mut self.buffer_a,
            &batch.a,
            &generator.fake_a,
        );
        let d_b = discriminator_step(
            &mut self.d_b,
            &mut self.opt_d_b,
            &mut self.buffer_b,
            &batch.b,
            &generator.fake_b,
        );
        StepReport { generator, d_a, d_b }
    }

    fn step_schedules(&mut self) {
        let base = self.settings.lr;
        for (sched, opt) in [
            (&mut self.sched_g, &mut self.opt_g),
            (&mut self.sched_d_a, &mut self.opt_d_a),
            (&mut self.sched_d_b, &mut self.opt_d_b),
        ] {
            sched.step();
            opt.set_lr(sched.lr(base));
        }
    }

    fn save_checkpoints(&self, label: usize, sink: &mut dyn ArtifactSink) -> Result<(), ArtifactError> {
        for (name, net) in self.networks() {
            sink.save_checkpoint(label, name, net)?;
        }
        Ok(())
    }

    /// Train from `start_epoch` up to `n_epochs`.
    ///
    /// Any dataset or artifact error aborts training immediately.
    pub fn fit(
        &mut self,
        source: &mut dyn BatchSource,
        logger: &mut dyn TrainLogger,
        sink: &mut dyn ArtifactSink,
    ) -> Result<(), TrainError> {
        let (start, end) = (self.settings.start_epoch, self.settings.n_epochs);
        info!(
            start_epoch = start,
            n_epochs = end,
            batches = source.num_batches(),
            "starting training"
        );

        for epoch in start..end {
            let started = Instant::now();
            source.begin_epoch(epoch);
            logger.begin_epoch(epoch, end, source.num_batches());

            let mut sample = None;
            while let Some(batch) = source.next_batch() {
                let batch = batch?;
                let report = self.train_step(&batch);
                let out = &report.generator;
                logger.log_batch(
                    &report.losses(),
                    &[
                        ("real_A", &batch.a),
                        ("fake_B", &out.fake_b),
                        ("rec_A", &out.rec_a),
                        ("real_B", &batch.b),
                        ("fake_A", &out.fake_a),
                        ("rec_B", &out.rec_b),
                    ],
                );
                sample = Some(EpochSample {
                    real_a: batch.a,
                    fake_b: report.generator.fake_b,
                });
            }
            logger.end_epoch(epoch, started.elapsed());

            self.step_schedules();
            let label = epoch + 1;
            if label % self.settings.checkpoint_interval.max(1) == 0 {
                self.save_checkpoints(label, sink)?;
            }

            match sample {
                Some(s) if s.real_a.len_of(Axis(0)) > 0 => {
                    let real_a = image_to_unit_range(s.real_a.index_axis(Axis(0), 0));
                    let fake_b = image_to_unit_range(s.fake_b.index_axis(Axis(0), 0));
                    sink.save_sample(label, "A", real_a.view())?;
                    sink.save_sample(label, "real_A", real_a.view())?;
                    sink.save_sample(label, "fake_B", fake_b.view())?;
                }
                _ => warn!(epoch = label, "no batches this epoch, skipping sample images"),
            }
        }
        Ok(())
    }
}
