//! CycleGAN training entry point.
//!
//! Example:
//!   cyclegan-train --dataroot datasets/horse2zebra/ --n-epochs 200 --decay-epoch 100

use anyhow::Context;
use clap::Parser;
use cyclegan_rs::core::WeightInit;
use cyclegan_rs::io::{dataset_name, load_checkpoint, FsArtifacts, UnalignedImageDataset};
use cyclegan_rs::logging::{init_tracing, ProgressLogger};
use cyclegan_rs::models::{MultiscaleDiscriminator, ResnetGenerator};
use cyclegan_rs::optim::CycleGan;
use cyclegan_rs::TrainOptions;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args: Vec<String> = std::env::args().collect();
    let opts = TrainOptions::parse_from(&args);
    opts.validate()?;

    info!("cyclegan-train v{}", cyclegan_rs::VERSION);

    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.n_cpu)
        .build_global()
    {
        warn!("could not size the thread pool to {} threads: {e}", opts.n_cpu);
    }

    let seed = opts.seed.unwrap_or_else(rand::random);
    info!(seed, device = %opts.device, "configuration validated");

    let dataset = dataset_name(&opts.dataroot);
    let mut sink = FsArtifacts::new(&opts.checkpoint_root, &opts.medium_root, &dataset)?;
    let options_json = serde_json::to_string_pretty(&opts)?;
    sink.write_run_metadata(&args, seed, &options_json)?;

    let g_config = opts.generator_config();
    let d_config = opts.discriminator_config();
    let mut gan = CycleGan::new(
        ResnetGenerator::new(g_config, opts.device),
        ResnetGenerator::new(g_config, opts.device),
        MultiscaleDiscriminator::new(d_config, opts.device),
        MultiscaleDiscriminator::new(d_config, opts.device),
        opts.train_settings(seed),
    )?;

    let mut rng = StdRng::seed_from_u64(seed);
    for (name, net) in gan.networks_mut() {
        net.init_weights(WeightInit::default(), &mut rng);
        info!(network = name, parameters = net.num_parameters(), "initialised");
    }

    if opts.resume {
        for (name, net) in gan.networks_mut() {
            let path = sink.checkpoint_path(opts.epoch, name);
            load_checkpoint(&path, net)
                .with_context(|| format!("resuming {name} from {}", path.display()))?;
            info!(network = name, path = %path.display(), "resumed");
        }
    }

    let mut source = UnalignedImageDataset::open(opts.dataset_options(seed))
        .with_context(|| format!("opening dataset {}", opts.dataroot.display()))?;
    info!(dataset = %dataset, images = source.len(), "dataset ready");

    let mut logger = ProgressLogger::new(opts.display);
    if let Some(path) = &opts.metrics_csv {
        logger = logger
            .with_csv(path)
            .with_context(|| format!("creating {}", path.display()))?;
    }

    gan.fit(&mut source, &mut logger, &mut sink)?;
    info!("training finished");
    Ok(())
}
