//! Command-line options for training and their validation.

use crate::core::Device;
use crate::io::DatasetOptions;
use crate::models::{DiscriminatorConfig, GeneratorConfig};
use crate::optim::{LossWeights, TrainSettings};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("--n-epochs ({n_epochs}) must be greater than --decay-epoch ({decay_epoch})")]
    DecayAfterEnd { n_epochs: usize, decay_epoch: usize },

    #[error("--epoch ({epoch}) must be smaller than --n-epochs ({n_epochs})")]
    StartAfterEnd { epoch: usize, n_epochs: usize },

    #[error("--lr must be positive and finite, got {0}")]
    LearningRate(f32),

    #[error("--size must be a multiple of 4 and at least 8, got {0}")]
    Size(u32),

    #[error("--{flag} must be 1 or 3, got {value}")]
    Channels { flag: &'static str, value: usize },

    #[error("--input-nc ({input}) and --output-nc ({output}) must match for the identity loss")]
    ChannelMismatch { input: usize, output: usize },

    #[error("--{0} must be at least 1")]
    Zero(&'static str),
}

/// Train an unpaired image-to-image translation model.
#[derive(Parser, Debug, Clone, Serialize)]
#[command(name = "cyclegan-train", version, about)]
pub struct TrainOptions {
    /// Epoch to start training from
    #[arg(long, default_value_t = 0)]
    pub epoch: usize,

    /// Number of epochs of training
    #[arg(long, default_value_t = 200)]
    pub n_epochs: usize,

    /// Size of the batches
    #[arg(long, default_value_t = 4)]
    pub batch_size: usize,

    /// Root directory of the dataset (expects train/A and train/B)
    #[arg(long, default_value = "datasets/horse2zebra/")]
    pub dataroot: PathBuf,

    /// Initial learning rate
    #[arg(long, default_value_t = 0.0002)]
    pub lr: f32,

    /// Epoch to start linearly decaying the learning rate to 0
    #[arg(long, default_value_t = 100)]
    pub decay_epoch: usize,

    /// Size of the data crop (squared assumed)
    #[arg(long, default_value_t = 256)]
    pub size: u32,

    /// Number of channels of input data
    #[arg(long, default_value_t = 3)]
    pub input_nc: usize,

    /// Number of channels of output data
    #[arg(long, default_value_t = 3)]
    pub output_nc: usize,

    /// Compute device: cpu | parallel
    #[arg(long, default_value_t = Device::Parallel)]
    pub device: Device,

    /// Number of threads for batch decoding and parallel kernels
    #[arg(long, default_value_t = 8)]
    pub n_cpu: usize,

    /// Print a progress line every N batches
    #[arg(long, default_value_t = 5)]
    pub display: usize,

    /// Discriminator filters in the first conv layer
    #[arg(long, default_value_t = 64)]
    pub ndf: usize,

    /// Number of stride-2 layers per discriminator scale
    #[arg(long, default_value_t = 3)]
    pub n_layers_d: usize,

    /// Number of discriminator scales
    #[arg(long, default_value_t = 1)]
    pub num_d: usize,

    /// Generator filters in the first conv layer
    #[arg(long, default_value_t = 64)]
    pub ngf: usize,

    #[arg(long, default_value_t = 9)]
    pub n_residual_blocks: usize,

    /// Capacity of each fake-image replay buffer
    #[arg(long, default_value_t = 50)]
    pub pool_size: usize,

    /// Random seed (drawn from the OS if omitted)
    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long, default_value = "checkpoint")]
    pub checkpoint_root: PathBuf,

    /// Directory for per-epoch sample images
    #[arg(long, default_value = "medium")]
    pub medium_root: PathBuf,

    /// Save all four networks every N epochs
    #[arg(long, default_value_t = 5)]
    pub checkpoint_interval: usize,

    /// Append per-batch losses to this CSV file
    #[arg(long)]
    pub metrics_csv: Option<PathBuf>,

    /// Load `<net>_<epoch>.ckpt` for all networks before training
    #[arg(long)]
    pub resume: bool,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self::parse_from(["cyclegan-train"])
    }
}

impl TrainOptions {
    /// Reject option combinations that cannot train.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_epochs <= self.decay_epoch {
            return Err(ConfigError::DecayAfterEnd {
                n_epochs: self.n_epochs,
                decay_epoch: self.decay_epoch,
            });
        }
        if self.epoch >= self.n_epochs {
            return Err(ConfigError::StartAfterEnd {
                epoch: self.epoch,
                n_epochs: self.n_epochs,
            });
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(ConfigError::LearningRate(self.lr));
        }
        if self.size < 8 || self.size % 4 != 0 {
            return Err(ConfigError::Size(self.size));
        }
        for (flag, value) in [("input-nc", self.input_nc), ("output-nc", self.output_nc)] {
            if value != 1 && value != 3 {
                return Err(ConfigError::Channels { flag, value });
            }
        }
        if self.input_nc != self.output_nc {
            return Err(ConfigError::ChannelMismatch {
                input: self.input_nc,
                output: self.output_nc,
            });
        }
        let counts = [
            ("batch-size", self.batch_size),
            ("pool-size", self.pool_size),
            ("display", self.display),
            ("ndf", self.ndf),
            ("n-layers-d", self.n_layers_d),
            ("num-d", self.num_d),
            ("ngf", self.ngf),
            ("checkpoint-interval", self.checkpoint_interval),
            ("n-cpu", self.n_cpu),
        ];
        if let Some(&(flag, _)) = counts.iter().find(|&&(_, v)| v == 0) {
            return Err(ConfigError::Zero(flag));
        }
        Ok(())
    }

    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            input_nc: self.input_nc,
            output_nc: self.output_nc,
            ngf: self.ngf,
            n_residual_blocks: self.n_residual_blocks,
        }
    }

    /// Both discriminators see images with `input_nc` channels.
    pub fn discriminator_config(&self) -> DiscriminatorConfig {
        DiscriminatorConfig {
            input_nc: self.input_nc,
            ndf: self.ndf,
            n_layers: self.n_layers_d,
            num_d: self.num_d,
        }
    }

    pub fn train_settings(&self, seed: u64) -> TrainSettings {
        TrainSettings {
            start_epoch: self.epoch,
            n_epochs: self.n_epochs,
            decay_epoch: self.decay_epoch,
            lr: self.lr,
            pool_size: self.pool_size,
            seed,
            checkpoint_interval: self.checkpoint_interval,
            weights: LossWeights::default(),
        }
    }

    pub fn dataset_options(&self, seed: u64) -> DatasetOptions {
        DatasetOptions {
            root: self.dataroot.clone(),
            size: self.size,
            channels: self.input_nc,
            batch_size: self.batch_size,
            seed,
            device: self.device,
        }
    }
}
