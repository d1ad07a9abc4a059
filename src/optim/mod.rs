//! Optimisation: losses, the Adam optimizer, the learning-rate schedule, the
//! replay buffer, and the per-step and per-run training logic.
//!
//! - `loss`: L1 / MSE / SSIM with analytic gradients
//! - `gan_loss`: multi-scale least-squares adversarial loss
//! - `step`: generator-pair and discriminator updates
//! - `trainer`: epoch loop, schedules, checkpoints and samples

pub mod adam;
pub mod gan_loss;
pub mod loss;
pub mod replay;
pub mod schedule;
pub mod step;
pub mod trainer;

pub use adam::Adam;
pub use gan_loss::gan_loss;
pub use replay::ReplayBuffer;
pub use schedule::{LinearDecaySchedule, ScheduleError};
pub use step::{
    discriminator_step, discriminator_total, generator_step, DiscriminatorLosses,
    GeneratorLosses, GeneratorOutputs, LossWeights,
};
pub use trainer::{CycleGan, StepReport, TrainError, TrainSettings};
