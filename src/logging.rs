//! Training progress reporting.
//!
//! The trainer hands every batch's named losses and images to a
//! [`TrainLogger`]. [`ProgressLogger`] keeps per-epoch running means, prints a
//! progress line through `tracing` every `display` batches, and can append the
//! raw per-batch losses to a CSV file.

use crate::core::ImageBatch;
use std::fs::File;
use std::io::{BufWriter, IsTerminal, Write};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Install the global `fmt` subscriber, filtered by `RUST_LOG` (default `info`).
///
/// Returns `false` if a subscriber was already installed.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr);
    Registry::default().with(filter).with(fmt_layer).try_init().is_ok()
}

/// Per-batch logging collaborator of the trainer.
pub trait TrainLogger {
    fn begin_epoch(&mut self, _epoch: usize, _n_epochs: usize, _n_batches: usize) {}

    fn log_batch(&mut self, losses: &[(&str, f32)], images: &[(&str, &ImageBatch)]);

    fn end_epoch(&mut self, _epoch: usize, _elapsed: Duration) {}
}

pub struct ProgressLogger {
    display: usize,
    epoch: usize,
    n_epochs: usize,
    n_batches: usize,
    batch: usize,
    names: Vec<String>,
    sums: Vec<f64>,
    run_start: Instant,
    batches_done: usize,
    csv: Option<BufWriter<File>>,
    csv_header_written: bool,
}

fn format_eta(secs: f64) -> String {
    let secs = secs.max(0.0).round() as u64;
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h{m:02}m{s:02}s")
    } else {
        format!("{m}m{s:02}s")
    }
}

impl ProgressLogger {
    /// Print a progress line every `display` batches (and at each epoch's last batch).
    pub fn new(display: usize) -> Self {
        Self {
            display: display.max(1),
            epoch: 0,
            n_epochs: 0,
            n_batches: 0,
            batch: 0,
            names: Vec::new(),
            sums: Vec::new(),
            run_start: Instant::now(),
            batches_done: 0,
            csv: None,
            csv_header_written: false,
        }
    }

    /// Also append `epoch,batch,<losses…>` rows to `path`.
    pub fn with_csv(mut self, path: &Path) -> std::io::Result<Self> {
        self.csv = Some(BufWriter::new(File::create(path)?));
        Ok(self)
    }

    /// Running means of the current epoch, in first-seen order.
    pub fn means(&self) -> Vec<(String, f32)> {
        let n = self.batch.max(1) as f64;
        self.names
            .iter()
            .zip(&self.sums)
            .map(|(name, sum)| (name.clone(), (sum / n) as f32))
            .collect()
    }

    fn accumulate(&mut self, losses: &[(&str, f32)]) {
        for &(name, value) in losses {
            match self.names.iter().position(|n| n == name) {
                Some(i) => self.sums[i] += value as f64,
                None => {
                    self.names.push(name.to_string());
                    self.sums.push(value as f64);
                }
            }
        }
    }

    fn write_csv(&mut self, losses: &[(&str, f32)]) -> std::io::Result<()> {
        let Some(csv) = self.csv.as_mut() else {
            return Ok(());
        };
        if !self.csv_header_written {
            let names: Vec<&str> = losses.iter().map(|(n, _)| *n).collect();
            writeln!(csv, "epoch,batch,{}", names.join(","))?;
            self.csv_header_written = true;
        }
        let values: Vec<String> = losses.iter().map(|(_, v)| v.to_string()).collect();
        writeln!(csv, "{},{},{}", self.epoch + 1, self.batch, values.join(","))?;
        csv.flush()
    }

    fn eta(&self) -> String {
        if self.batches_done == 0 {
            return "?".to_string();
        }
        let per_batch = self.run_start.elapsed().as_secs_f64() / self.batches_done as f64;
        let remaining_epochs = self.n_epochs.saturating_sub(self.epoch + 1);
        let remaining = self.n_batches.saturating_sub(self.batch) + remaining_epochs * self.n_batches;
        format_eta(per_batch * remaining as f64)
    }

    fn report(&self) {
        let losses: Vec<String> = self
            .means()
            .iter()
            .map(|(name, mean)| format!("{name}: {mean:.4}"))
            .collect();
        info!(
            "Epoch {:03}/{:03} [{:04}/{:04}] -- {} -- ETA: {}",
            self.epoch + 1,
            self.n_epochs,
            self.batch,
            self.n_batches,
            losses.join(" | "),
            self.eta()
        );
    }
}

impl TrainLogger for ProgressLogger {
    fn begin_epoch(&mut self, epoch: usize, n_epochs: usize, n_batches: usize) {
        self.epoch = epoch;
        self.n_epochs = n_epochs;
        self.n_batches = n_batches;
        self.batch = 0;
        self.sums.iter_mut().for_each(|s| *s = 0.0);
    }

    fn log_batch(&mut self, losses: &[(&str, f32)], images: &[(&str, &ImageBatch)]) {
        self.batch += 1;
        self.batches_done += 1;
        self.accumulate(losses);
        debug!(batch = self.batch, images = images.len(), "batch done");

        if let Err(e) = self.write_csv(losses) {
            warn!("failed to write metrics csv, disabling it: {e}");
            self.csv = None;
        }
        if self.batch % self.display == 0 || self.batch == self.n_batches {
            self.report();
        }
    }

    fn end_epoch(&mut self, epoch: usize, elapsed: Duration) {
        info!("time per epoch {}: {:.2}s", epoch + 1, elapsed.as_secs_f64());
    }
}
