//! File I/O: datasets, checkpoints and training artifacts.
//!
//! - Unaligned image-folder dataset (`<root>/train/{A,B}`)
//! - Binary checkpoints (`.ckpt`)
//! - JPEG sample images and run metadata

mod artifacts;
mod checkpoint;
mod dataset;
mod image_io;

pub use artifacts::{ArtifactError, ArtifactSink, FsArtifacts};
pub use checkpoint::{load_checkpoint, read_checkpoint, save_checkpoint, write_checkpoint, CheckpointError};
pub use dataset::{
    dataset_name, BatchSource, DatasetError, DatasetOptions, InMemoryBatches, UnalignedImageDataset,
};
pub use image_io::{array_to_image, prepare_image, save_jpeg, Augment, RESIZE_FACTOR};
