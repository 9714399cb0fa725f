use std::path::Path;
use std::sync::Arc;

use burn::{
    data::dataset::{transform::PartialDataset, Dataset},
    module::AutodiffModule,
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::checkpoint::{self, DISCRIMINATOR, FSRCNN, GENERATOR};
use crate::cli::ModelKind;
use crate::data::{ImagePair, PairLoader, SrBatcher, SrImageFolder};
use crate::logging::install_logger;
use crate::model::FeatureExtractor;
use crate::training::{FsrcnnTrainingConfig, RegressionHistory, SrganTrainingConfig, TrainingHistory};
use crate::visual::{evaluate, EvaluationReport, ImageDirSink};
use crate::{SrError, SCALE_FACTOR};

/// Name of the saved run configuration.
pub const CONFIG_FILE: &str = "config.json";

/// Outcome of a training run followed by evaluation on the held-out split.
#[derive(Clone, Debug)]
pub struct RunReport<H> {
    /// What the training loop reported.
    pub history: H,
    /// Evaluation of the trained model.
    pub evaluation: EvaluationReport,
}

struct Splits {
    train: Arc<dyn Dataset<ImagePair>>,
    test: Arc<dyn Dataset<ImagePair>>,
}

fn load_splits(
    data_dir: &Path,
    hr_size: usize,
    test_split: f64,
    seed: u64,
    max_samples: Option<usize>,
) -> Result<Splits, SrError> {
    let (train, test) = SrImageFolder::new(data_dir, hr_size, SCALE_FACTOR)?.split(test_split, seed);
    if train.is_empty() {
        return Err(SrError::Config(format!(
            "no training images under {}",
            data_dir.display()
        )));
    }

    let train: Arc<dyn Dataset<ImagePair>> = match max_samples {
        Some(max) if max < train.len() => Arc::new(PartialDataset::new(train, 0, max)),
        _ => Arc::new(train),
    };
    log::info!("Train images: {}, test images: {}", train.len(), test.len());

    Ok(Splits {
        train,
        test: Arc::new(test),
    })
}

fn prepare_artifact_dir(artifact_dir: &Path) -> Result<(), SrError> {
    std::fs::create_dir_all(artifact_dir)?;
    install_logger(artifact_dir);
    Ok(())
}

fn save_config<C: Config>(config: &C, artifact_dir: &Path) -> Result<(), SrError> {
    config
        .save(artifact_dir.join(CONFIG_FILE))
        .map_err(SrError::from)
}

/// Train the generator and discriminator on the images under `data_dir`, save both
/// networks to `artifact_dir`, then evaluate the generator on the held-out split.
///
/// Without `vgg_weights` the feature extractor is randomly initialized.
pub fn run_srgan<B: AutodiffBackend>(
    config: &SrganTrainingConfig,
    data_dir: &Path,
    artifact_dir: &Path,
    vgg_weights: Option<&Path>,
    device: B::Device,
) -> Result<RunReport<TrainingHistory>, SrError> {
    prepare_artifact_dir(artifact_dir)?;
    save_config(config, artifact_dir)?;
    B::seed(config.seed);

    let splits = load_splits(
        data_dir,
        config.discriminator.hr_size,
        config.test_split,
        config.seed,
        config.max_samples,
    )?;
    let loader_train = PairLoader::new(
        splits.train,
        SrBatcher::<B>::new(device.clone()),
        config.batch_size,
    )
    .shuffle(config.seed);

    let extractor: FeatureExtractor<B> = match vgg_weights {
        Some(path) => config.feature_extractor.load_pretrained(path, &device)?,
        None => {
            log::warn!("No VGG19 weights given, the content loss uses a random frozen extractor");
            config.feature_extractor.init_frozen(&device)
        }
    };

    let mut trainer = config.init(extractor, &device);
    let mut sink = ImageDirSink::new(artifact_dir.join("epochs"))?;
    let history = trainer.fit(&loader_train, config.num_epochs, Some(&mut sink))?;

    let (generator, discriminator) = trainer.into_models();
    checkpoint::save(generator.clone(), artifact_dir, GENERATOR)?;
    checkpoint::save(discriminator, artifact_dir, DISCRIMINATOR)?;

    let loader_test = PairLoader::new(
        splits.test,
        SrBatcher::<B::InnerBackend>::new(device),
        config.batch_size,
    );
    let mut sink = ImageDirSink::new(artifact_dir.join("samples"))?;
    let evaluation = evaluate(
        &generator.valid(),
        &loader_test,
        config.num_eval_samples,
        Some(&mut sink),
    )?;

    Ok(RunReport {
        history,
        evaluation,
    })
}

/// Train the FSRCNN baseline on the images under `data_dir`, save it to
/// `artifact_dir`, then evaluate it on the held-out split.
pub fn run_fsrcnn<B: AutodiffBackend>(
    config: &FsrcnnTrainingConfig,
    data_dir: &Path,
    artifact_dir: &Path,
    device: B::Device,
) -> Result<RunReport<RegressionHistory>, SrError> {
    prepare_artifact_dir(artifact_dir)?;
    save_config(config, artifact_dir)?;
    B::seed(config.seed);

    let splits = load_splits(
        data_dir,
        config.hr_size,
        config.test_split,
        config.seed,
        config.max_samples,
    )?;
    let loader_train = PairLoader::new(
        splits.train,
        SrBatcher::<B>::new(device.clone()),
        config.batch_size,
    )
    .shuffle(config.seed);

    let mut trainer = config.init::<B>(&device);
    let mut sink = ImageDirSink::new(artifact_dir.join("epochs"))?;
    let history = trainer.fit(&loader_train, config.num_epochs, Some(&mut sink))?;

    let model = trainer.into_model();
    checkpoint::save(model.clone(), artifact_dir, FSRCNN)?;

    let loader_test = PairLoader::new(
        splits.test,
        SrBatcher::<B::InnerBackend>::new(device),
        config.batch_size,
    );
    let mut sink = ImageDirSink::new(artifact_dir.join("samples"))?;
    let evaluation = evaluate(
        &model.valid(),
        &loader_test,
        config.num_eval_samples,
        Some(&mut sink),
    )?;

    Ok(RunReport {
        history,
        evaluation,
    })
}

/// Reload a trained model and its configuration from `artifact_dir` and evaluate it
/// on the same held-out split it was trained without.
pub fn run_evaluate<B: Backend>(
    model: ModelKind,
    data_dir: &Path,
    artifact_dir: &Path,
    device: B::Device,
) -> Result<EvaluationReport, SrError> {
    install_logger(artifact_dir);
    let config_path = artifact_dir.join(CONFIG_FILE);
    let mut sink = ImageDirSink::new(artifact_dir.join("evaluation"))?;

    match model {
        ModelKind::Srgan => {
            let config = SrganTrainingConfig::load(&config_path)
                .map_err(|err| SrError::Config(format!("{}: {err:?}", config_path.display())))?;
            let splits = load_splits(
                data_dir,
                config.discriminator.hr_size,
                config.test_split,
                config.seed,
                None,
            )?;
            let generator = checkpoint::load(
                config.generator.init::<B>(&device),
                artifact_dir,
                GENERATOR,
                &device,
            )?;
            let loader = PairLoader::new(splits.test, SrBatcher::new(device), config.batch_size);

            evaluate(&generator, &loader, config.num_eval_samples, Some(&mut sink))
        }
        ModelKind::Fsrcnn => {
            let config = FsrcnnTrainingConfig::load(&config_path)
                .map_err(|err| SrError::Config(format!("{}: {err:?}", config_path.display())))?;
            let splits = load_splits(
                data_dir,
                config.hr_size,
                config.test_split,
                config.seed,
                None,
            )?;
            let model = checkpoint::load(
                config.model.init::<B>(&device),
                artifact_dir,
                FSRCNN,
                &device,
            )?;
            let loader = PairLoader::new(splits.test, SrBatcher::new(device), config.batch_size);

            evaluate(&model, &loader, config.num_eval_samples, Some(&mut sink))
        }
    }
}
