//! Core data structures.
//!
//! This module contains the fundamental types used throughout the system:
//! - `ImageBatch` / `PredictionMap`: NCHW tensors
//! - `Param`: a trainable tensor with its gradient
//! - `Device`: where per-sample kernels run
//!
//! All types here are "pure data" - no I/O, no training logic.

mod device;
mod param;
mod tensor;

// Re-export public types
pub use device::Device;
pub use param::{Param, ParamKind, WeightInit};
pub use tensor::{image_to_unit_range, sign0, to_unit_range, Batch, ImageBatch, PredictionMap};
