//! Compute device selection.
//!
//! Everything runs on the CPU. `Parallel` spreads per-sample kernels (and batch
//! decoding) over the global rayon pool; `Cpu` keeps every op on the calling
//! thread, which makes runs bit-for-bit reproducible.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Device {
    /// Single thread
    Cpu,
    /// rayon thread pool
    #[default]
    Parallel,
}

impl Device {
    pub fn is_parallel(&self) -> bool {
        matches!(self, Device::Parallel)
    }

    /// Evaluate `f(0..n)` on this device, preserving index order in the result.
    pub fn map_indices<T, F>(&self, n: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        match self {
            Device::Cpu => (0..n).map(f).collect(),
            Device::Parallel => (0..n).into_par_iter().map(f).collect(),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Parallel => write!(f, "parallel"),
        }
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            "parallel" | "rayon" => Ok(Device::Parallel),
            other => Err(format!("unknown device `{other}` (expected: cpu | parallel)")),
        }
    }
}
