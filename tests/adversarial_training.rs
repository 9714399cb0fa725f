use std::sync::Arc;

use burn::{
    backend::{Autodiff, NdArray},
    data::dataset::InMemDataset,
    optim::{AdamConfig, GradientsParams},
    prelude::*,
};
use image::{Rgb, RgbImage};
use srgan::{
    data::{ImagePair, PairLoader, SrBatch, SrBatcher},
    frozen::Frozen,
    loss::AdversarialLossConfig,
    model::{
        Discriminator, DiscriminatorConfig, FeatureExtractorConfig, Generator, GeneratorConfig,
    },
    training::{BatchPosition, ParamDigest, SrganTrainer, SrganTrainingConfig},
    visual::MemorySink,
    SrError,
};

type B = Autodiff<NdArray<f32>>;

/// Small widths and a shallow extractor, but the real 32x32 to 128x128 geometry.
fn config(hr_size: usize) -> SrganTrainingConfig {
    SrganTrainingConfig::new()
        .with_generator(
            GeneratorConfig::new()
                .with_num_features(8)
                .with_num_residual_blocks(2),
        )
        .with_discriminator(
            DiscriminatorConfig::new()
                .with_base_channels(4)
                .with_hr_size(hr_size)
                .with_hidden_features(16),
        )
        .with_feature_extractor(FeatureExtractorConfig::new().with_depth(4))
}

fn pattern(size: u32, seed: u8) -> RgbImage {
    RgbImage::from_fn(size, size, |x, y| {
        Rgb([
            (x * 7 + y * 3) as u8 ^ seed,
            (x * y) as u8 ^ seed.wrapping_mul(3),
            (x + y * 11) as u8,
        ])
    })
}

fn pairs(count: u8, hr_size: u32) -> Vec<ImagePair> {
    (0..count)
        .map(|seed| {
            let high = pattern(hr_size, seed);
            let low = image::imageops::resize(
                &high,
                hr_size / 4,
                hr_size / 4,
                image::imageops::FilterType::Triangle,
            );
            ImagePair::from_images(&low, &high)
        })
        .collect()
}

fn loader(count: u8, hr_size: u32, device: &<B as Backend>::Device) -> PairLoader<B> {
    PairLoader::new(
        Arc::new(InMemDataset::new(pairs(count, hr_size))),
        SrBatcher::new(device.clone()),
        1,
    )
}

fn first_batch(hr_size: u32, device: &<B as Backend>::Device) -> SrBatch<B> {
    loader(1, hr_size, device).iter(0).next().unwrap().unwrap()
}

const START: BatchPosition = BatchPosition { epoch: 0, batch: 0 };

#[test]
fn one_full_step_from_32_to_128_gives_finite_losses() {
    let device = Default::default();
    let config = config(128);
    let extractor = config.feature_extractor.init_frozen::<B>(&device);
    let mut trainer = config.init(extractor, &device);
    let batch = first_batch(128, &device);

    assert_eq!(batch.low_res.dims(), [1, 3, 32, 32]);
    let (losses, generated) = trainer.train_batch(START, &batch).unwrap();

    assert_eq!(generated.dims(), [1, 3, 128, 128]);
    assert!(losses.gen_total.is_finite());
    assert!(losses.disc_total.is_finite());
    assert!((losses.gen_total - (losses.gen_content + 1e-3 * losses.gen_adversarial)).abs() < 1e-5);
    assert!((losses.disc_total - (losses.disc_real + losses.disc_fake) / 2.0).abs() < 1e-6);
}

#[test]
fn each_step_moves_only_its_own_network() {
    let device = Default::default();
    // Zero momentum keeps batch-norm running statistics fixed, so only optimizer steps
    // move the digests.
    let base = config(32);
    let generator = base.generator.clone().with_momentum(0.0);
    let discriminator = base.discriminator.clone().with_momentum(0.0);
    let config = base
        .with_generator(generator)
        .with_discriminator(discriminator);
    let extractor = config.feature_extractor.init_frozen::<B>(&device);
    let mut trainer = config.init(extractor, &device);
    let batch = first_batch(32, &device);

    let generator_before = ParamDigest::of(trainer.generator());
    let discriminator_before = ParamDigest::of(trainer.discriminator());

    let step = trainer.generator_step(START, &batch).unwrap();
    let generator_after = ParamDigest::of(trainer.generator());
    assert_ne!(generator_before, generator_after);
    assert_eq!(discriminator_before, ParamDigest::of(trainer.discriminator()));

    trainer
        .discriminator_step(START, batch.high_res.clone(), &step.generated)
        .unwrap();
    assert_eq!(generator_after, ParamDigest::of(trainer.generator()));
    assert_ne!(discriminator_before, ParamDigest::of(trainer.discriminator()));
}

#[test]
fn generator_step_updates_discriminator_running_statistics() {
    let device = Default::default();
    let config = config(32);
    let extractor = config.feature_extractor.init_frozen::<B>(&device);
    let mut trainer = config.init(extractor, &device);
    let batch = first_batch(32, &device);
    let discriminator_before = ParamDigest::of(trainer.discriminator());

    trainer.generator_step(START, &batch).unwrap();

    assert_ne!(discriminator_before, ParamDigest::of(trainer.discriminator()));
}

#[test]
fn discriminator_loss_never_reaches_the_generator() {
    let device = Default::default();
    let config = config(32);
    let generator = config.generator.init::<B>(&device);
    let discriminator = config.discriminator.init::<B>(&device);
    let extractor = config.feature_extractor.init_frozen::<B>(&device);
    let loss = AdversarialLossConfig::new().init::<B>(&device);
    let batch = first_batch(32, &device);

    let generated = generator.forward(batch.low_res.clone());

    let disc_loss = loss.discriminator(
        &discriminator,
        batch.high_res.clone(),
        &Frozen::new(generated.clone()),
    );
    let grads = disc_loss.total.backward();
    assert!(GradientsParams::from_grads(grads, &generator).is_empty());

    let gen_loss = loss.generator(&discriminator, &extractor, generated, batch.high_res);
    let grads = gen_loss.total.backward();
    assert!(!GradientsParams::from_grads(grads, &generator).is_empty());
}

#[test]
fn feature_extractor_is_unchanged_by_training() {
    let device = Default::default();
    let config = config(32);
    let extractor = config.feature_extractor.init_frozen::<B>(&device);
    let before = ParamDigest::of(&extractor);
    let mut trainer = config.init(extractor, &device);

    let history = trainer.fit(&loader(3, 32, &device), 2, None).unwrap();

    assert_eq!(history.batches.len(), 6);
    assert_eq!(before, ParamDigest::of(trainer.extractor()));
}

#[test]
fn one_comparison_image_per_epoch() {
    let device = Default::default();
    let config = config(32);
    let extractor = config.feature_extractor.init_frozen::<B>(&device);
    let mut trainer = config.init(extractor, &device);
    let mut sink = MemorySink::default();

    let history = trainer
        .fit(&loader(2, 32, &device).shuffle(3), 2, Some(&mut sink))
        .unwrap();

    let names: Vec<_> = sink.images.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, ["epoch_0", "epoch_1"]);
    assert_eq!(sink.images[0].1.dimensions(), (3 * 32, 32));
    assert_eq!(history.epochs.len(), 2);
    assert_eq!(history.epochs[1].num_batches, 2);
}

#[test]
fn non_finite_loss_halts_the_run() {
    let device = Default::default();
    let config = config(32);
    let extractor = config.feature_extractor.init_frozen::<B>(&device);
    let mut trainer = config.init(extractor, &device);
    let batch = SrBatch {
        low_res: Tensor::<B, 4>::full([1, 3, 8, 8], f32::NAN, &device),
        high_res: Tensor::zeros([1, 3, 32, 32], &device),
    };

    let result = trainer.train_batch(START, &batch);

    assert!(matches!(
        result,
        Err(SrError::NonFiniteLoss {
            loss: "generator",
            epoch: 0,
            batch: 0,
            ..
        })
    ));
}

#[test]
fn resolution_other_than_the_head_size_is_rejected() {
    let device = Default::default();
    let config = config(32);
    let extractor = config.feature_extractor.init_frozen::<B>(&device);
    let mut trainer = config.init(extractor, &device);
    let batch = first_batch(64, &device);

    assert!(matches!(
        trainer.train_batch(START, &batch),
        Err(SrError::ShapeMismatch(_))
    ));
}

#[test]
fn explicit_optimizers_can_be_supplied() {
    let device = Default::default();
    let config = config(32);
    let mut trainer = SrganTrainer::new(
        config.generator.init::<B>(&device),
        config.discriminator.init::<B>(&device),
        config.feature_extractor.init_frozen::<B>(&device),
        AdamConfig::new().init::<B, Generator<B>>(),
        AdamConfig::new().init::<B, Discriminator<B>>(),
        config.loss.init(&device),
    )
    .with_learning_rates(2e-4, 1e-4);

    let (losses, _) = trainer.train_batch(START, &first_batch(32, &device)).unwrap();

    assert!(losses.gen_total.is_finite());
}
