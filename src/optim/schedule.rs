//! Linear learning-rate decay.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("decay must start before training ends (decay_start_epoch={decay_start}, n_epochs={n_epochs})")]
    DecayAfterEnd { n_epochs: usize, decay_start: usize },
}

/// Multiplier 1.0 until `decay_start_epoch`, then linear down to 0 at `n_epochs`.
///
/// The internal counter starts at 0 and is offset by the epoch training
/// resumed from, so a resumed run continues on the same curve.
#[derive(Clone, Debug)]
pub struct LinearDecaySchedule {
    n_epochs: usize,
    offset: usize,
    decay_start: usize,
    counter: usize,
}

impl LinearDecaySchedule {
    pub fn new(n_epochs: usize, offset: usize, decay_start: usize) -> Result<Self, ScheduleError> {
        if decay_start >= n_epochs {
            return Err(ScheduleError::DecayAfterEnd {
                n_epochs,
                decay_start,
            });
        }
        Ok(Self {
            n_epochs,
            offset,
            decay_start,
            counter: 0,
        })
    }

    /// Multiplier for the `epoch`-th call since construction.
    pub fn multiplier(&self, epoch: usize) -> f32 {
        let decayed = (epoch + self.offset).saturating_sub(self.decay_start) as f32;
        let span = (self.n_epochs - self.decay_start) as f32;
        (1.0 - decayed / span).max(0.0)
    }

    pub fn current_multiplier(&self) -> f32 {
        self.multiplier(self.counter)
    }

    /// Advance one epoch and return the new multiplier.
    pub fn step(&mut self) -> f32 {
        self.counter += 1;
        self.current_multiplier()
    }

    pub fn lr(&self, base_lr: f32) -> f32 {
        base_lr * self.current_multiplier()
    }
}
