//! End-to-end training on a tiny image-folder dataset.
//!
//! Runs the default networks for a couple of epochs and checks the artifacts
//! a real run leaves behind: checkpoints that load back, sample JPEGs and the
//! metrics CSV.

#[cfg(test)]
mod tests {
    use image::{DynamicImage, Rgb, RgbImage};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::path::Path;

    use cyclegan_rs::core::{Device, WeightInit};
    use cyclegan_rs::io::{
        load_checkpoint, BatchSource, CheckpointError, DatasetOptions, FsArtifacts,
        UnalignedImageDataset,
    };
    use cyclegan_rs::logging::ProgressLogger;
    use cyclegan_rs::models::{
        DiscriminatorConfig, GeneratorConfig, MultiscaleDiscriminator, Network, ResnetGenerator,
    };
    use cyclegan_rs::optim::{CycleGan, TrainSettings};

    fn write_domain(dir: &Path, n: usize, tint: u8) {
        std::fs::create_dir_all(dir).unwrap();
        for i in 0..n {
            let img = RgbImage::from_fn(20, 18, |x, y| {
                Rgb([(x * 12) as u8, (y * 13) as u8, tint.wrapping_add((i * 30) as u8)])
            });
            DynamicImage::ImageRgb8(img)
                .save(dir.join(format!("{i:03}.png")))
                .unwrap();
        }
    }

    const G_CONFIG: GeneratorConfig = GeneratorConfig {
        input_nc: 3,
        output_nc: 3,
        ngf: 4,
        n_residual_blocks: 1,
    };

    const D_CONFIG: DiscriminatorConfig = DiscriminatorConfig {
        input_nc: 3,
        ndf: 4,
        n_layers: 2,
        num_d: 2,
    };

    #[test]
    fn test_tiny_run_writes_artifacts() {
        let root = tempfile::tempdir().unwrap();
        let data = root.path().join("toy");
        write_domain(&data.join("train/A"), 3, 0);
        write_domain(&data.join("train/B"), 2, 200);

        let mut source = UnalignedImageDataset::open(DatasetOptions {
            root: data.clone(),
            size: 16,
            channels: 3,
            batch_size: 2,
            seed: 5,
            device: Device::Parallel,
        })
        .unwrap();
        assert_eq!(source.len(), 3);
        assert_eq!(source.num_batches(), 2);

        let mut sink = FsArtifacts::new(
            &root.path().join("checkpoint"),
            &root.path().join("medium"),
            &source.name(),
        )
        .unwrap();
        let csv = root.path().join("metrics.csv");
        let mut logger = ProgressLogger::new(1).with_csv(&csv).unwrap();

        let mut gan = CycleGan::new(
            ResnetGenerator::new(G_CONFIG, Device::Parallel),
            ResnetGenerator::new(G_CONFIG, Device::Parallel),
            MultiscaleDiscriminator::new(D_CONFIG, Device::Parallel),
            MultiscaleDiscriminator::new(D_CONFIG, Device::Parallel),
            TrainSettings {
                n_epochs: 2,
                decay_epoch: 1,
                pool_size: 4,
                seed: 5,
                checkpoint_interval: 2,
                ..TrainSettings::default()
            },
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        for (_, net) in gan.networks_mut() {
            net.init_weights(WeightInit::default(), &mut rng);
        }

        gan.fit(&mut source, &mut logger, &mut sink).unwrap();

        // Checkpoints only at the 2nd epoch.
        for name in ["netG_A2B", "netG_B2A", "netD_A", "netD_B"] {
            assert!(!sink.checkpoint_path(1, name).exists());
            assert!(sink.checkpoint_path(2, name).is_file(), "{name}");
        }
        for epoch in [1, 2] {
            for tag in ["A", "real_A", "fake_B"] {
                let path = sink.sample_path(epoch, tag);
                let img = image::open(&path).unwrap();
                assert_eq!((img.width(), img.height()), (16, 16), "{}", path.display());
            }
        }
        assert!(sink.checkpoint_dir().ends_with("checkpoint/toy"));

        // Header plus two batches per epoch.
        let text = std::fs::read_to_string(&csv).unwrap();
        assert_eq!(text.lines().count(), 5);
        assert!(text.starts_with("epoch,batch,loss_G,"));
        assert!(gan.learning_rates().iter().all(|&lr| lr == 0.0));

        // The saved generator loads back into a fresh network.
        let mut restored = ResnetGenerator::new(G_CONFIG, Device::Cpu);
        load_checkpoint(sink.checkpoint_path(2, "netG_A2B"), &mut restored).unwrap();
        for (a, b) in restored.parameters().iter().zip(gan.g_a2b.parameters()) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.value, b.value);
        }

        // A different architecture is rejected.
        let mut other = ResnetGenerator::new(GeneratorConfig { ngf: 8, ..G_CONFIG }, Device::Cpu);
        let err = load_checkpoint(sink.checkpoint_path(2, "netG_A2B"), &mut other).unwrap_err();
        assert!(matches!(err, CheckpointError::ShapeMismatch { .. }), "{err:?}");
    }
}
