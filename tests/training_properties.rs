//! Behavioural properties of the CycleGAN training core.
//!
//! These tests use stub networks with closed-form outputs so the expected
//! losses can be computed by hand.

mod common;

#[cfg(test)]
mod tests {
    use super::common::{wave_batch, CountingLogger, MeanDiscriminator, RecordingSink, ShiftGenerator};
    use approx::assert_relative_eq;
    use ndarray::{Array4, Axis};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use cyclegan_rs::core::{to_unit_range, Batch, ImageBatch};
    use cyclegan_rs::io::{BatchSource, DatasetError, InMemoryBatches};
    use cyclegan_rs::optim::loss::ssim;
    use cyclegan_rs::optim::{
        discriminator_step, discriminator_total, gan_loss, generator_step, Adam, CycleGan,
        LinearDecaySchedule, LossWeights, ReplayBuffer, ScheduleError, TrainError, TrainSettings,
    };

    fn single_images(n: usize) -> Vec<ImageBatch> {
        (0..n)
            .map(|i| Array4::from_elem((1, 3, 4, 4), i as f32 * 0.01))
            .collect()
    }

    // ---------------------------------------------------------------------
    // Replay buffer
    // ---------------------------------------------------------------------

    #[test]
    fn test_replay_buffer_fills_then_stays_bounded() {
        let mut buffer = ReplayBuffer::new(3, 7);
        let images = single_images(12);

        for (i, img) in images.iter().take(3).enumerate() {
            let out = buffer.push_and_pop(img);
            assert_eq!(&out, img, "push {i} should be echoed while filling");
            assert_eq!(buffer.len(), i + 1);
        }

        for img in images.iter().skip(3) {
            let out = buffer.push_and_pop(img);
            assert_eq!(out.dim(), img.dim());
            assert_eq!(buffer.len(), 3);
            // Either the new image or one pushed earlier comes back.
            let value = out[[0, 0, 0, 0]];
            assert!(images.iter().any(|prev| prev[[0, 0, 0, 0]] == value));
        }
    }

    #[test]
    fn test_replay_buffer_fills_from_within_one_batch() {
        let mut buffer = ReplayBuffer::new(3, 1);
        let batch = Array4::from_shape_fn((5, 1, 2, 2), |(n, _, _, _)| n as f32);
        let out = buffer.push_and_pop(&batch);

        assert_eq!(out.dim(), batch.dim());
        assert_eq!(buffer.len(), 3);
        for n in 0..3 {
            assert_eq!(out.index_axis(Axis(0), n), batch.index_axis(Axis(0), n));
        }
    }

    #[test]
    fn test_replay_buffer_disabled() {
        let mut buffer = ReplayBuffer::new(0, 0);
        for img in single_images(10) {
            assert_eq!(buffer.push_and_pop(&img), img);
        }
        assert!(buffer.is_empty());
    }

    // ---------------------------------------------------------------------
    // GAN loss
    // ---------------------------------------------------------------------

    #[test]
    fn test_gan_loss_values() {
        let half = Array4::from_elem((4, 1, 1, 1), 0.5);
        assert_relative_eq!(gan_loss(&[half.clone()], true).0, 0.25);
        assert_relative_eq!(gan_loss(&[half.clone()], false).0, 0.25);

        let ones = Array4::from_elem((4, 1, 3, 3), 1.0);
        let zeros = Array4::zeros((4, 1, 3, 3));
        assert_eq!(gan_loss(&[ones], true).0, 0.0);
        assert_eq!(gan_loss(&[zeros], false).0, 0.0);

        // Scales add up rather than average.
        let (two_scales, grads) = gan_loss(&[half.clone(), half], true);
        assert_relative_eq!(two_scales, 0.5);
        assert_eq!(grads.len(), 2);
    }

    // ---------------------------------------------------------------------
    // Learning-rate schedule
    // ---------------------------------------------------------------------

    #[test]
    fn test_schedule_shape() {
        let schedule = LinearDecaySchedule::new(10, 0, 5).unwrap();
        for epoch in 0..5 {
            assert_eq!(schedule.multiplier(epoch), 1.0);
        }
        for epoch in 5..9 {
            assert!(schedule.multiplier(epoch + 1) < schedule.multiplier(epoch));
        }
        assert_eq!(schedule.multiplier(10), 0.0);
        assert_eq!(schedule.multiplier(15), 0.0);
    }

    #[test]
    fn test_schedule_offset_shifts_epochs() {
        let resumed = LinearDecaySchedule::new(10, 6, 5).unwrap();
        let fresh = LinearDecaySchedule::new(10, 0, 5).unwrap();
        assert_relative_eq!(resumed.multiplier(0), fresh.multiplier(6));
    }

    #[test]
    fn test_schedule_rejects_decay_at_end() {
        assert_eq!(
            LinearDecaySchedule::new(10, 0, 10).unwrap_err(),
            ScheduleError::DecayAfterEnd {
                n_epochs: 10,
                decay_start: 10
            }
        );
        assert!(LinearDecaySchedule::new(10, 0, 12).is_err());
    }

    // ---------------------------------------------------------------------
    // Optimisation steps
    // ---------------------------------------------------------------------

    #[test]
    fn test_generator_total_is_weighted_sum() {
        let (s1, s2, c) = (0.05f32, -0.02f32, 0.3f32);
        let mut g_a2b = ShiftGenerator::new(s1);
        let mut g_b2a = ShiftGenerator::new(s2);
        let mut d_a = MeanDiscriminator::constant(c);
        let mut d_b = MeanDiscriminator::constant(c);
        let mut opt = Adam::with_lr(2e-4);

        let real_a = wave_batch((2, 3, 16, 16), 0.0);
        let real_b = wave_batch((2, 3, 16, 16), 1.3);
        let out = generator_step(
            &mut g_a2b,
            &mut g_b2a,
            &mut d_a,
            &mut d_b,
            &mut opt,
            &real_a,
            &real_b,
            &LossWeights::default(),
        );
        let l = out.losses;

        assert_relative_eq!(l.identity_b, 5.0 * s1.abs(), epsilon = 1e-5);
        assert_relative_eq!(l.identity_a, 5.0 * s2.abs(), epsilon = 1e-5);
        assert_relative_eq!(l.gan_a2b, (c - 1.0).powi(2), epsilon = 1e-6);
        assert_relative_eq!(l.gan_b2a, (c - 1.0).powi(2), epsilon = 1e-6);
        assert_relative_eq!(l.cycle_aba, 10.0 * (s1 + s2).abs(), epsilon = 1e-4);
        assert_relative_eq!(l.cycle_bab, 10.0 * (s1 + s2).abs(), epsilon = 1e-4);

        let rec_a = (&real_a + s1) + s2;
        let rec_b = (&real_b + s2) + s1;
        let ssim_a = 1.0 - ssim(&to_unit_range(&real_a), &to_unit_range(&rec_a));
        let ssim_b = 1.0 - ssim(&to_unit_range(&real_b), &to_unit_range(&rec_b));
        assert_relative_eq!(l.ssim_a, ssim_a, epsilon = 1e-5);
        assert_relative_eq!(l.ssim_b, ssim_b, epsilon = 1e-5);

        let sum: f32 = l.terms().iter().sum();
        assert_eq!(l.total, sum);
        let by_hand = 5.0 * (s1.abs() + s2.abs())
            + 2.0 * (c - 1.0).powi(2)
            + 20.0 * (s1 + s2).abs()
            + ssim_a
            + ssim_b;
        assert_relative_eq!(l.total, by_hand, epsilon = 1e-4);

        // Outputs are the stub's closed form.
        assert_relative_eq!(out.fake_b[[1, 2, 3, 4]], real_a[[1, 2, 3, 4]] + s1, epsilon = 1e-6);
        assert_relative_eq!(out.rec_a[[0, 1, 5, 5]], rec_a[[0, 1, 5, 5]], epsilon = 1e-6);
    }

    #[test]
    fn test_generator_step_updates_only_generators() {
        let mut g_a2b = ShiftGenerator::new(0.05);
        let mut g_b2a = ShiftGenerator::new(0.04);
        let mut d_a = MeanDiscriminator::constant(0.3);
        let mut d_b = MeanDiscriminator::constant(0.3);
        let mut opt = Adam::with_lr(1e-2);

        let real_a = wave_batch((1, 3, 8, 8), 0.0);
        let real_b = wave_batch((1, 3, 8, 8), 0.7);
        generator_step(
            &mut g_a2b,
            &mut g_b2a,
            &mut d_a,
            &mut d_b,
            &mut opt,
            &real_a,
            &real_b,
            &LossWeights::default(),
        );

        // Positive shifts inflate identity and cycle terms, so both move down.
        assert!(g_a2b.value() < 0.05, "g_a2b = {}", g_a2b.value());
        assert!(g_b2a.value() < 0.04, "g_b2a = {}", g_b2a.value());
        assert_eq!(d_a.bias.value[[0, 0]], 0.3);
        assert_eq!(d_b.bias.value[[0, 0]], 0.3);
        assert_eq!(opt.timestep(), 1);
    }

    #[test]
    fn test_discriminator_total_is_mean_of_parts() {
        assert_relative_eq!(discriminator_total(0.4, 0.6), 0.5);
    }

    #[test]
    fn test_discriminator_step_losses() {
        let mut d = MeanDiscriminator::new(1.0, 0.0);
        let mut opt = Adam::with_lr(1e-2);
        let mut buffer = ReplayBuffer::new(0, 0);

        let real = Array4::from_elem((2, 3, 4, 4), 0.6);
        let fake = Array4::from_elem((2, 3, 4, 4), -0.2);
        let losses = discriminator_step(&mut d, &mut opt, &mut buffer, &real, &fake);

        assert_relative_eq!(losses.real, 0.16, epsilon = 1e-6);
        assert_relative_eq!(losses.fake, 0.04, epsilon = 1e-6);
        assert_relative_eq!(losses.total, 0.1, epsilon = 1e-6);
        // d(loss)/d(bias) = 0.5·2(0.6-1) + 0.5·2(-0.2) < 0, so the bias grows.
        assert!(d.bias.value[[0, 0]] > 0.0);
    }

    #[test]
    fn test_discriminator_step_trains_on_replayed_fake() {
        // A seed whose first draw takes the swap branch; a one-slot store
        // always swaps with slot 0.
        let rng = (0..)
            .map(StdRng::seed_from_u64)
            .find(|rng| rng.clone().gen::<f64>() > 0.5)
            .unwrap();
        let mut buffer = ReplayBuffer::with_rng(1, rng);
        let stored = Array4::from_elem((1, 3, 4, 4), 0.8);
        assert_eq!(buffer.push_and_pop(&stored), stored);

        let mut d = MeanDiscriminator::new(1.0, 0.0);
        let mut opt = Adam::with_lr(1e-2);
        let real = Array4::from_elem((1, 3, 4, 4), 0.6);
        let fake = Array4::from_elem((1, 3, 4, 4), -0.2);
        let losses = discriminator_step(&mut d, &mut opt, &mut buffer, &real, &fake);

        // Scored on the stored 0.8 image, not on the fresh -0.2 fake.
        assert_relative_eq!(losses.real, 0.16, epsilon = 1e-6);
        assert_relative_eq!(losses.fake, 0.64, epsilon = 1e-6);
        assert_relative_eq!(losses.total, 0.4, epsilon = 1e-6);
        // The fresh fake replaced the stored image.
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.images()[0], fake.index_axis(Axis(0), 0));
        // d(loss)/d(bias) = 0.5·2(0.6-1) + 0.5·2(0.8) > 0, so the bias shrinks.
        assert!(d.bias.value[[0, 0]] < 0.0);
    }

    // ---------------------------------------------------------------------
    // Training loop
    // ---------------------------------------------------------------------

    fn stub_gan(settings: TrainSettings) -> CycleGan<ShiftGenerator, MeanDiscriminator> {
        CycleGan::new(
            ShiftGenerator::new(0.1),
            ShiftGenerator::new(-0.1),
            MeanDiscriminator::new(1.0, 0.0),
            MeanDiscriminator::new(1.0, 0.0),
            settings,
        )
        .unwrap()
    }

    fn two_image_batches(n: usize) -> InMemoryBatches {
        let batches = (0..n)
            .map(|i| {
                Batch::new(
                    wave_batch((2, 3, 8, 8), i as f32),
                    wave_batch((2, 3, 8, 8), i as f32 + 0.5),
                )
            })
            .collect();
        InMemoryBatches::new(batches)
    }

    #[test]
    fn test_two_epoch_run_with_stub_networks() {
        let mut gan = stub_gan(TrainSettings {
            n_epochs: 2,
            decay_epoch: 1,
            ..TrainSettings::default()
        });
        let mut source = two_image_batches(1);
        let mut logger = CountingLogger::default();
        let mut sink = RecordingSink::default();

        gan.fit(&mut source, &mut logger, &mut sink).unwrap();

        assert_eq!(logger.epochs_begun, vec![0, 1]);
        assert_eq!(logger.batches, 2);
        assert!(sink.checkpoints.is_empty());
        assert_eq!(
            logger.image_names,
            ["real_A", "fake_B", "rec_A", "real_B", "fake_A", "rec_B"]
        );
        assert!(logger.loss_names.contains(&"loss_cycle".to_string()));

        let tags: Vec<(usize, &str)> = sink.samples.iter().map(|(e, t, _)| (*e, t.as_str())).collect();
        assert_eq!(
            tags,
            [(1, "A"), (1, "real_A"), (1, "fake_B"), (2, "A"), (2, "real_A"), (2, "fake_B")]
        );
        assert!(sink.samples.iter().all(|(_, _, dim)| *dim == (3, 8, 8)));
        assert_eq!(gan.learning_rates(), [0.0; 3]);
    }

    #[test]
    fn test_logger_called_once_per_batch() {
        let mut gan = stub_gan(TrainSettings {
            n_epochs: 3,
            decay_epoch: 1,
            ..TrainSettings::default()
        });
        let mut source = two_image_batches(4);
        let mut logger = CountingLogger::default();
        let mut sink = RecordingSink::default();

        gan.fit(&mut source, &mut logger, &mut sink).unwrap();
        assert_eq!(logger.batches, 12);
    }

    #[test]
    fn test_checkpoints_every_fifth_epoch() {
        let mut gan = stub_gan(TrainSettings {
            start_epoch: 3,
            n_epochs: 11,
            decay_epoch: 8,
            ..TrainSettings::default()
        });
        let mut source = two_image_batches(1);
        let mut logger = CountingLogger::default();
        let mut sink = RecordingSink::default();

        gan.fit(&mut source, &mut logger, &mut sink).unwrap();

        let epochs: Vec<usize> = sink.checkpoints.iter().map(|(e, _)| *e).collect();
        assert_eq!(epochs, [5, 5, 5, 5, 10, 10, 10, 10]);
        let names: Vec<&str> = sink.checkpoints[..4].iter().map(|(_, n)| n.as_str()).collect();
        assert_eq!(names, ["netG_A2B", "netG_B2A", "netD_A", "netD_B"]);
    }

    struct BrokenSource;

    impl BatchSource for BrokenSource {
        fn num_batches(&self) -> usize {
            1
        }

        fn begin_epoch(&mut self, _epoch: usize) {}

        fn next_batch(&mut self) -> Option<Result<Batch, DatasetError>> {
            Some(Err(DatasetError::Channels(2)))
        }
    }

    #[test]
    fn test_dataset_error_halts_training() {
        let mut gan = stub_gan(TrainSettings {
            n_epochs: 2,
            decay_epoch: 1,
            ..TrainSettings::default()
        });
        let mut logger = CountingLogger::default();
        let mut sink = RecordingSink::default();

        let err = gan.fit(&mut BrokenSource, &mut logger, &mut sink).unwrap_err();
        assert!(matches!(err, TrainError::Dataset(DatasetError::Channels(2))));
        assert_eq!(logger.batches, 0);
        assert!(sink.samples.is_empty());
    }
}
