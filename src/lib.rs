//! # cyclegan-rs: unpaired image-to-image translation in Rust
//!
//! This crate trains a CycleGAN: two generators (A→B, B→A) and two
//! multi-scale PatchGAN discriminators, optimised with identity, adversarial,
//! cycle-consistency and SSIM losses.
//!
//! ## Architecture
//!
//! - `core`: image batches, trainable parameters, device selection
//! - `diff`: layers with explicit forward and backward passes
//! - `models`: `Generator` / `Discriminator` traits and default networks
//! - `optim`: losses, Adam, LR schedule, replay buffer, training loop
//! - `io`: dataset loading, checkpoints, sample images
//! - `logging`: progress reporting
//! - `config`: command-line options
//!
//! Gradients are derived by hand for every op and verified against finite
//! differences in `tests/gradient_check.rs`.

// Core data structures
pub mod core;

// Differentiable layers (forward + backward)
pub mod diff;

// Network architectures
pub mod models;

// Optimization (losses, training loop)
pub mod optim;

// I/O (datasets, checkpoints, samples)
pub mod io;

pub mod config;
pub mod logging;

// Re-export commonly used types at crate root for convenience
pub use config::{ConfigError, TrainOptions};
pub use crate::core::{Batch, Device, ImageBatch};
pub use models::{Discriminator, Generator, Network};
pub use optim::{CycleGan, TrainError, TrainSettings};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
