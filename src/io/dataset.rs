//! Training batch sources.
//!
//! Directory layout for the unaligned image dataset:
//! ```text
//! <root>/train/A/*.{jpg,jpeg,png,bmp}
//! <root>/train/B/*.{jpg,jpeg,png,bmp}
//! ```
//! Item `i` pairs `A[i mod |A|]` with a uniformly random B image, so the two
//! domains never need matching file counts or any correspondence.

use super::image_io::{prepare_image, Augment};
use crate::core::{Batch, Device, ImageBatch};
use ndarray::{Array3, Array4, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no images found in {0}")]
    Empty(PathBuf),

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("unsupported channel count {0} (expected 1 or 3)")]
    Channels(usize),
}

/// A finite, re-startable sequence of training batches.
pub trait BatchSource {
    fn num_batches(&self) -> usize;

    /// Reset (and reshuffle) for a new pass.
    fn begin_epoch(&mut self, epoch: usize);

    fn next_batch(&mut self) -> Option<Result<Batch, DatasetError>>;
}

/// Image-folder dataset settings.
#[derive(Clone, Debug)]
pub struct DatasetOptions {
    pub root: PathBuf,
    pub size: u32,
    pub channels: usize,
    pub batch_size: usize,
    pub seed: u64,
    pub device: Device,
}

/// Name of a dataset for output paths: the last non-empty component of its root.
pub fn dataset_name(root: &Path) -> String {
    root.components()
        .filter_map(|c| match c {
            std::path::Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .last()
        .unwrap_or_else(|| "dataset".to_string())
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    let entries = std::fs::read_dir(dir).map_err(|source| DatasetError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    if files.is_empty() {
        return Err(DatasetError::Empty(dir.to_path_buf()));
    }
    files.sort();
    Ok(files)
}

fn load_item(path: &Path, size: u32, channels: usize, augment: Augment) -> Result<Array3<f32>, DatasetError> {
    let img = image::open(path).map_err(|source| DatasetError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(prepare_image(&img, size, channels, augment))
}

fn stack(images: Vec<Array3<f32>>) -> ImageBatch {
    let (c, h, w) = images.first().map(|i| i.dim()).unwrap_or((0, 0, 0));
    let mut batch = Array4::zeros((images.len(), c, h, w));
    for (i, img) in images.iter().enumerate() {
        batch.index_axis_mut(Axis(0), i).assign(img);
    }
    batch
}

struct ItemPlan {
    a: usize,
    b: usize,
    augment_a: Augment,
    augment_b: Augment,
}

pub struct UnalignedImageDataset {
    options: DatasetOptions,
    files_a: Vec<PathBuf>,
    files_b: Vec<PathBuf>,
    order: Vec<usize>,
    cursor: usize,
    rng: StdRng,
}

impl UnalignedImageDataset {
    pub fn open(options: DatasetOptions) -> Result<Self, DatasetError> {
        if options.channels != 1 && options.channels != 3 {
            return Err(DatasetError::Channels(options.channels));
        }
        let train = options.root.join("train");
        let files_a = list_images(&train.join("A"))?;
        let files_b = list_images(&train.join("B"))?;
        debug!(a = files_a.len(), b = files_b.len(), "indexed dataset");

        let len = files_a.len().max(files_b.len());
        let rng = StdRng::seed_from_u64(options.seed);
        Ok(Self {
            options,
            files_a,
            files_b,
            order: (0..len).collect(),
            cursor: len,
            rng,
        })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn name(&self) -> String {
        dataset_name(&self.options.root)
    }

    fn random_augment(&mut self) -> Augment {
        Augment {
            crop: (self.rng.gen::<f32>(), self.rng.gen::<f32>()),
            flip: self.rng.gen_bool(0.5),
        }
    }
}

impl BatchSource for UnalignedImageDataset {
    fn num_batches(&self) -> usize {
        self.len().div_ceil(self.options.batch_size.max(1))
    }

    fn begin_epoch(&mut self, _epoch: usize) {
        self.order.shuffle(&mut self.rng);
        self.cursor = 0;
    }

    fn next_batch(&mut self) -> Option<Result<Batch, DatasetError>> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.options.batch_size.max(1)).min(self.order.len());
        let indices: Vec<usize> = self.order[self.cursor..end].to_vec();
        self.cursor = end;

        // Draw every random choice up front so decoding order cannot change the stream.
        let (n_a, n_b) = (self.files_a.len(), self.files_b.len());
        let mut plans = Vec::with_capacity(indices.len());
        for i in indices {
            let b = self.rng.gen_range(0..n_b);
            plans.push(ItemPlan {
                a: i % n_a,
                b,
                augment_a: self.random_augment(),
                augment_b: self.random_augment(),
            });
        }

        let (size, channels) = (self.options.size, self.options.channels);
        let (files_a, files_b) = (&self.files_a, &self.files_b);
        let decoded = self.options.device.map_indices(plans.len(), |k| {
            let plan = &plans[k];
            let a = load_item(&files_a[plan.a], size, channels, plan.augment_a)?;
            let b = load_item(&files_b[plan.b], size, channels, plan.augment_b)?;
            Ok::<_, DatasetError>((a, b))
        });

        let pairs: Result<Vec<(Array3<f32>, Array3<f32>)>, DatasetError> = decoded.into_iter().collect();
        Some(pairs.map(|pairs| {
            let (a, b): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
            Batch::new(stack(a), stack(b))
        }))
    }
}

/// Serves a fixed list of batches every epoch.
pub struct InMemoryBatches {
    batches: Vec<Batch>,
    cursor: usize,
}

impl InMemoryBatches {
    pub fn new(batches: Vec<Batch>) -> Self {
        let cursor = batches.len();
        Self { batches, cursor }
    }
}

impl BatchSource for InMemoryBatches {
    fn num_batches(&self) -> usize {
        self.batches.len()
    }

    fn begin_epoch(&mut self, _epoch: usize) {
        self.cursor = 0;
    }

    fn next_batch(&mut self) -> Option<Result<Batch, DatasetError>> {
        let batch = self.batches.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(Ok(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    fn write_images(dir: &Path, n: usize) {
        std::fs::create_dir_all(dir).unwrap();
        for i in 0..n {
            let img = RgbImage::from_fn(20, 24, |x, y| image::Rgb([(x * 10) as u8, (y * 10) as u8, (i * 40) as u8]));
            DynamicImage::ImageRgb8(img).save(dir.join(format!("{i}.png"))).unwrap();
        }
        std::fs::write(dir.join("notes.txt"), "not an image").unwrap();
    }

    #[test]
    fn test_dataset_name_ignores_trailing_slash() {
        assert_eq!(dataset_name(Path::new("datasets/horse2zebra/")), "horse2zebra");
        assert_eq!(dataset_name(Path::new("/data/apple2orange")), "apple2orange");
    }

    #[test]
    fn test_batches_cover_longer_domain() {
        let root = tempfile::tempdir().unwrap();
        write_images(&root.path().join("train/A"), 5);
        write_images(&root.path().join("train/B"), 2);

        let mut ds = UnalignedImageDataset::open(DatasetOptions {
            root: root.path().to_path_buf(),
            size: 16,
            channels: 3,
            batch_size: 2,
            seed: 1,
            device: Device::Cpu,
        })
        .unwrap();
        assert_eq!(ds.len(), 5);
        assert_eq!(ds.num_batches(), 3);

        ds.begin_epoch(0);
        let mut sizes = Vec::new();
        while let Some(batch) = ds.next_batch() {
            let batch = batch.unwrap();
            let (_, c, h, w) = batch.a.dim();
            assert_eq!((c, h, w), (3, 16, 16));
            assert_eq!(batch.a.dim(), batch.b.dim());
            sizes.push(batch.len());
        }
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn test_empty_domain_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        write_images(&root.path().join("train/A"), 1);
        std::fs::create_dir_all(root.path().join("train/B")).unwrap();
        let err = UnalignedImageDataset::open(DatasetOptions {
            root: root.path().to_path_buf(),
            size: 16,
            channels: 3,
            batch_size: 1,
            seed: 0,
            device: Device::Cpu,
        });
        assert!(matches!(err, Err(DatasetError::Empty(_))));
    }

    #[test]
    fn test_in_memory_restarts_each_epoch() {
        let batch = Batch::new(Array4::zeros((1, 3, 8, 8)), Array4::zeros((1, 3, 8, 8)));
        let mut src = InMemoryBatches::new(vec![batch.clone(), batch]);
        for epoch in 0..2 {
            src.begin_epoch(epoch);
            let mut n = 0;
            while let Some(b) = src.next_batch() {
                b.unwrap();
                n += 1;
            }
            assert_eq!(n, 2);
        }
    }
}
