//! Where training writes checkpoints and sample images.

use super::checkpoint::{save_checkpoint, CheckpointError};
use super::image_io::{array_to_image, save_jpeg};
use crate::models::Network;
use ndarray::ArrayView3;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::info;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("failed to encode {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("cannot save a {0}-channel image")]
    Channels(usize),
}

/// Storage for the artifacts of a run.
///
/// `epoch` is the 1-based number of the epoch that just finished.
pub trait ArtifactSink {
    fn save_checkpoint(&mut self, epoch: usize, name: &str, network: &dyn Network) -> Result<(), ArtifactError>;

    /// `image` is CHW with values in [0, 1].
    fn save_sample(&mut self, epoch: usize, tag: &str, image: ArrayView3<f32>) -> Result<(), ArtifactError>;
}

/// Writes `<checkpoint_root>/<dataset>/<name>_<epoch>.ckpt` and
/// `<medium_root>/<dataset>/<epoch>_<tag>.jpg`.
pub struct FsArtifacts {
    checkpoint_dir: PathBuf,
    medium_dir: PathBuf,
}

fn create_dir(path: &Path) -> Result<(), ArtifactError> {
    std::fs::create_dir_all(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl FsArtifacts {
    pub fn new(checkpoint_root: &Path, medium_root: &Path, dataset: &str) -> Result<Self, ArtifactError> {
        let checkpoint_dir = checkpoint_root.join(dataset);
        let medium_dir = medium_root.join(dataset);
        create_dir(&checkpoint_dir)?;
        create_dir(&medium_dir)?;
        Ok(Self {
            checkpoint_dir,
            medium_dir,
        })
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    pub fn medium_dir(&self) -> &Path {
        &self.medium_dir
    }

    pub fn checkpoint_path(&self, epoch: usize, name: &str) -> PathBuf {
        self.checkpoint_dir.join(format!("{name}_{epoch}.ckpt"))
    }

    pub fn sample_path(&self, epoch: usize, tag: &str) -> PathBuf {
        self.medium_dir.join(format!("{epoch}_{tag}.jpg"))
    }

    /// Record how the run was started next to its checkpoints.
    pub fn write_run_metadata(&self, args: &[String], seed: u64, options_json: &str) -> Result<PathBuf, ArtifactError> {
        let path = self.checkpoint_dir.join("run_metadata.txt");
        let io_err = |source| ArtifactError::Io {
            path: path.clone(),
            source,
        };
        let started = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string());

        let mut file = std::fs::File::create(&path).map_err(io_err)?;
        let text = format!(
            "=== Training Run Metadata ===\n\n\
             Command:\n{}\n\n\
             Started: {started}\n\n\
             Seed: {seed}\n\n\
             Options:\n{options_json}\n\n\
             System:\n  Platform: {}\n  Architecture: {}\n  Package version: {}\n",
            args.join(" "),
            std::env::consts::OS,
            std::env::consts::ARCH,
            crate::VERSION,
        );
        file.write_all(text.as_bytes()).map_err(io_err)?;
        Ok(path)
    }
}

impl ArtifactSink for FsArtifacts {
    fn save_checkpoint(&mut self, epoch: usize, name: &str, network: &dyn Network) -> Result<(), ArtifactError> {
        let path = self.checkpoint_path(epoch, name);
        save_checkpoint(&path, network)?;
        info!(path = %path.display(), "saved checkpoint");
        Ok(())
    }

    fn save_sample(&mut self, epoch: usize, tag: &str, image: ArrayView3<f32>) -> Result<(), ArtifactError> {
        let path = self.sample_path(epoch, tag);
        let img = array_to_image(image).ok_or(ArtifactError::Channels(image.dim().0))?;
        save_jpeg(&path, &img).map_err(|source| ArtifactError::Image {
            path: path.clone(),
            source,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_paths_follow_layout() {
        let root = tempfile::tempdir().unwrap();
        let sink = FsArtifacts::new(&root.path().join("checkpoint"), &root.path().join("medium"), "h2z").unwrap();
        assert!(sink
            .checkpoint_path(5, "netG_A2B")
            .ends_with("checkpoint/h2z/netG_A2B_5.ckpt"));
        assert!(sink.sample_path(3, "fake_B").ends_with("medium/h2z/3_fake_B.jpg"));
        assert!(sink.medium_dir().is_dir());
    }

    #[test]
    fn test_sample_is_written_as_jpeg() {
        let root = tempfile::tempdir().unwrap();
        let mut sink = FsArtifacts::new(root.path(), root.path(), "d").unwrap();
        let img = Array3::from_elem((3, 8, 8), 0.5);
        sink.save_sample(1, "real_A", img.view()).unwrap();
        let decoded = image::open(sink.sample_path(1, "real_A")).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 8));

        let err = sink.save_sample(1, "bad", Array3::zeros((2, 4, 4)).view()).unwrap_err();
        assert!(matches!(err, ArtifactError::Channels(2)));
    }

    #[test]
    fn test_run_metadata_mentions_seed() {
        let root = tempfile::tempdir().unwrap();
        let sink = FsArtifacts::new(root.path(), root.path(), "d").unwrap();
        let path = sink
            .write_run_metadata(&["cyclegan-train".into(), "--size".into(), "64".into()], 42, "{}")
            .unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("Seed: 42"));
        assert!(text.contains("--size 64"));
    }
}
