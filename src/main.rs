use std::{fs::File, path::PathBuf, sync::Mutex};

use anyhow::{Context, Result};
use burn::{
    backend::{wgpu::WgpuDevice, Autodiff, Wgpu},
    optim::SgdConfig,
};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use vgg16_idenprof::{
    classes::ClassDictionary,
    inference::Predictor,
    model::Vgg16Config,
    training::{train, DatasetPaths, TrainingConfig},
};

type Backend = Wgpu<f32, i32>;
type AutodiffBackend = Autodiff<Backend>;

#[derive(Parser)]
#[command(version = "0.1.0")]
#[command(about = "VGG16 profession classifier for the IdenProf dataset")]
struct Cli {
    #[arg(short, long, help = "Log at debug level")]
    verbose: bool,

    #[arg(long, help = "Write logs to this file instead of stderr")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Train on an image tree and save weights to the artifact directory")]
    Train {
        #[arg(long, default_value = "idenprof/train")]
        train_dir: PathBuf,

        #[arg(long, default_value = "idenprof/test")]
        test_dir: PathBuf,

        #[arg(long, default_value = "artifact")]
        artifact_dir: PathBuf,

        #[arg(long, help = "JSON class dictionary, IdenProf professions when omitted")]
        classes: Option<PathBuf>,

        #[arg(long, default_value_t = 100)]
        epochs: usize,

        #[arg(long, default_value_t = 16)]
        batch_size: usize,

        #[arg(long, default_value_t = 4)]
        workers: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[arg(long, default_value_t = 224)]
        image_dim: usize,

        #[arg(long, help = "Disable random horizontal flips of training images")]
        no_flip: bool,
    },

    #[command(about = "Print the most probable labels for each image")]
    Predict {
        #[arg(required = true)]
        images: Vec<PathBuf>,

        #[arg(long, default_value = "artifact")]
        artifact_dir: PathBuf,

        #[arg(long, help = "Weights file, the final-epoch weights when omitted")]
        weights: Option<PathBuf>,

        #[arg(long, default_value_t = 5)]
        top: usize,
    },

    #[command(about = "Report top-1 accuracy on an image tree")]
    Evaluate {
        #[arg(long, default_value = "idenprof/test")]
        test_dir: PathBuf,

        #[arg(long, default_value = "artifact")]
        artifact_dir: PathBuf,

        #[arg(long, help = "Weights file, the final-epoch weights when omitted")]
        weights: Option<PathBuf>,

        #[arg(long, default_value_t = 16)]
        batch_size: usize,
    },
}

fn initialize_tracing(verbose: bool, log_file: Option<PathBuf>) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let builder = tracing_subscriber::fmt().with_max_level(level);

    match log_file {
        Some(path) => {
            let file = File::create(&path)
                .with_context(|| format!("creating log file {}", path.display()))?;
            tracing::subscriber::set_global_default(
                builder.with_ansi(false).with_writer(Mutex::new(file)).finish(),
            )?;
        }
        None => {
            tracing::subscriber::set_global_default(
                builder.with_writer(std::io::stderr).finish(),
            )?;
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    initialize_tracing(cli.verbose, cli.log_file)?;

    let device = WgpuDevice::default();

    match cli.command {
        Command::Train {
            train_dir,
            test_dir,
            artifact_dir,
            classes,
            epochs,
            batch_size,
            workers,
            seed,
            image_dim,
            no_flip,
        } => {
            let classes = match classes {
                Some(path) => ClassDictionary::load(&path)
                    .with_context(|| format!("loading classes from {}", path.display()))?,
                None => ClassDictionary::idenprof(),
            };

            let config = TrainingConfig::new(
                Vgg16Config::new(classes.len()).with_image_dim(image_dim),
                SgdConfig::new(),
            )
            .with_epoch_count(epochs)
            .with_batch_size(batch_size)
            .with_worker_count(workers)
            .with_seed(seed)
            .with_horizontal_flip(!no_flip);

            train::<AutodiffBackend>(
                &artifact_dir,
                config,
                &DatasetPaths {
                    train_dir,
                    test_dir,
                },
                &classes,
                device,
            )
            .context("training failed")?;

            info!(artifact_dir = %artifact_dir.display(), "training finished");
        }
        Command::Predict {
            images,
            artifact_dir,
            weights,
            top,
        } => {
            let predictor = Predictor::<Backend>::load(&artifact_dir, weights.as_deref(), device)
                .context("loading the trained model")?;

            for prediction in predictor.predict_images(&images, top)? {
                println!("{}", prediction.path.display());
                for ranked in prediction.ranked {
                    println!("{} : {}", ranked.label, ranked.probability);
                }
            }
        }
        Command::Evaluate {
            test_dir,
            artifact_dir,
            weights,
            batch_size,
        } => {
            let predictor = Predictor::<Backend>::load(&artifact_dir, weights.as_deref(), device)
                .context("loading the trained model")?;

            let evaluation = predictor
                .evaluate(&test_dir, batch_size)
                .with_context(|| format!("evaluating {}", test_dir.display()))?;

            println!("accuracy: {evaluation}");
        }
    }

    Ok(())
}
