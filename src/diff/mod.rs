//! Differentiable building blocks.
//!
//! Every op exposes a forward pass and a hand-written backward pass. Ops with
//! parameters accumulate into `Param::grad`; callers zero gradients between
//! optimiser steps. Correctness is checked against finite differences in
//! `tests/gradient_check.rs`.

pub mod activation;
pub mod conv;
pub mod norm;
pub mod pad;
pub mod resample;
pub mod sequential;

pub use activation::Activation;
pub use conv::Conv2d;
pub use norm::{InstanceNorm2d, NormCache};
pub use pad::{Pad2d, PadMode};
pub use resample::{AvgPool2d, Upsample2x};
pub use sequential::{Layer, LayerCache, ResidualBlock, Sequential, Trace};
