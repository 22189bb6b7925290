//! Batch Iteration and Burn Integration
//!
//! `SplitBatches` walks a split in batch-sized chunks, decoding (and for
//! training, augmenting) each chunk in parallel with rayon while keeping
//! sample order. `JaundiceBatcher` implements Burn's `Batcher` to turn the
//! decoded items into NCHW image tensors plus float targets.

use std::marker::PhantomData;
use std::path::PathBuf;

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use super::augmentation::Augmenter;
use super::codec::{ImageCodec, ImageTensor};
use super::loader::{Sample, SplitSamples};
use super::Label;
use crate::utils::error::Result;

/// A decoded sample ready for batching
#[derive(Clone, Debug)]
pub struct JaundiceItem {
    /// Normalized image, shape `[1, H, W, 3]`
    pub image: ImageTensor,
    pub label: Label,
    /// Image path (for debugging/logging)
    pub path: PathBuf,
}

impl JaundiceItem {
    /// Decode one sample, optionally augmenting it with its own RNG stream
    pub fn load(
        sample: &Sample,
        codec: &ImageCodec,
        augmentation: Option<(&Augmenter, u64)>,
    ) -> Result<Self> {
        let mut resized = codec.decode_file(&sample.path)?;

        if let Some((augmenter, seed)) = augmentation {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            resized = augmenter.augment(&resized, &mut rng);
        }

        Ok(Self {
            image: codec.normalize(&resized),
            label: sample.label,
            path: sample.path.clone(),
        })
    }
}

/// Ordered (validate/test) or shuffled+augmented (train) batch iterator
pub struct SplitBatches {
    samples: Vec<Sample>,
    /// Per-sample augmentation seeds, aligned with `samples`
    seeds: Option<Vec<u64>>,
    augmenter: Option<Augmenter>,
    codec: ImageCodec,
    batch_size: usize,
    cursor: usize,
}

impl SplitBatches {
    /// Samples in enumeration order, no augmentation
    pub fn ordered(split: &SplitSamples, codec: ImageCodec, batch_size: usize) -> Self {
        Self {
            samples: split.samples.clone(),
            seeds: None,
            augmenter: None,
            codec,
            batch_size: batch_size.max(1),
            cursor: 0,
        }
    }

    /// Shuffled, augmented pass over the training split for one epoch
    ///
    /// The permutation and per-sample augmentation seeds depend only on
    /// `(seed, epoch)`, so a run is reproducible.
    pub fn shuffled(
        split: &SplitSamples,
        codec: ImageCodec,
        augmenter: Augmenter,
        batch_size: usize,
        seed: u64,
        epoch: usize,
    ) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(epoch as u64);

        let mut samples = split.samples.clone();
        samples.shuffle(&mut rng);
        let seeds = samples.iter().map(|_| rng.gen::<u64>()).collect();

        Self {
            samples,
            seeds: Some(seeds),
            augmenter: Some(augmenter),
            codec,
            batch_size: batch_size.max(1),
            cursor: 0,
        }
    }

    pub fn num_batches(&self) -> usize {
        self.samples.len().div_ceil(self.batch_size)
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    /// Sample order for this pass
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    fn load_range(&self, start: usize, end: usize) -> Result<Vec<JaundiceItem>> {
        self.samples[start..end]
            .par_iter()
            .enumerate()
            .map(|(offset, sample)| {
                let augmentation = match (&self.augmenter, &self.seeds) {
                    (Some(augmenter), Some(seeds)) => Some((augmenter, seeds[start + offset])),
                    _ => None,
                };
                JaundiceItem::load(sample, &self.codec, augmentation)
            })
            .collect()
    }
}

impl Iterator for SplitBatches {
    type Item = Result<Vec<JaundiceItem>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.samples.len() {
            return None;
        }
        let start = self.cursor;
        let end = (start + self.batch_size).min(self.samples.len());
        self.cursor = end;
        Some(self.load_range(start, end))
    }
}

/// A batch of images for the model
#[derive(Clone, Debug)]
pub struct JaundiceBatch<B: Backend> {
    /// Images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Targets (0.0 normal, 1.0 jaundice) with shape [batch_size]
    pub targets: Tensor<B, 1>,
}

/// Batcher converting decoded NHWC items into NCHW tensors
#[derive(Clone, Debug, Default)]
pub struct JaundiceBatcher<B: Backend> {
    _backend: PhantomData<B>,
}

impl<B: Backend> JaundiceBatcher<B> {
    pub fn new() -> Self {
        Self {
            _backend: PhantomData,
        }
    }

    /// Image tensor only, for inference
    pub fn images(&self, images: &[&ImageTensor], device: &B::Device) -> Tensor<B, 4> {
        let batch_size = images.len();
        let (height, width) = images
            .first()
            .map(|img| (img.height(), img.width()))
            .unwrap_or((0, 0));

        let data: Vec<f32> = images.iter().flat_map(|img| img.data().iter().copied()).collect();

        Tensor::<B, 4>::from_floats(TensorData::new(data, [batch_size, height, width, 3]), device)
            .permute([0, 3, 1, 2])
    }
}

impl<B: Backend> Batcher<B, JaundiceItem, JaundiceBatch<B>> for JaundiceBatcher<B> {
    fn batch(&self, items: Vec<JaundiceItem>, device: &B::Device) -> JaundiceBatch<B> {
        let batch_size = items.len();
        let images: Vec<&ImageTensor> = items.iter().map(|item| &item.image).collect();
        let images = self.images(&images, device);

        let targets_data: Vec<f32> = items.iter().map(|item| item.label.as_target()).collect();
        let targets = Tensor::<B, 1>::from_floats(TensorData::new(targets_data, [batch_size]), device);

        JaundiceBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::augmentation::AugmentationConfig;
    use crate::dataset::loader::tests::build_dataset;
    use crate::dataset::loader::DatasetSplits;
    use tempfile::TempDir;

    type TestBackend = burn_ndarray::NdArray<f32>;

    fn fixture(counts: [(usize, usize); 3]) -> (TempDir, DatasetSplits) {
        let dir = TempDir::new().unwrap();
        build_dataset(dir.path(), counts, 12);
        let splits = DatasetSplits::load(dir.path()).unwrap();
        (dir, splits)
    }

    #[test]
    fn test_ordered_batches_keep_enumeration_order() {
        let (_dir, splits) = fixture([(1, 1), (1, 1), (4, 3)]);
        let codec = ImageCodec::square(8);

        let batches: Vec<Vec<JaundiceItem>> = SplitBatches::ordered(&splits.test, codec, 3)
            .collect::<Result<_>>()
            .unwrap();

        let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![3, 3, 1]);

        let paths: Vec<PathBuf> = batches.iter().flatten().map(|item| item.path.clone()).collect();
        let expected: Vec<PathBuf> = splits.test.samples.iter().map(|s| s.path.clone()).collect();
        assert_eq!(paths, expected);
        assert!(batches.iter().flatten().all(|item| item.image.shape() == [1, 8, 8, 3]));
    }

    #[test]
    fn test_shuffle_is_reproducible_per_epoch() {
        let (_dir, splits) = fixture([(8, 8), (1, 1), (1, 1)]);
        let codec = ImageCodec::square(8);
        let augmenter = Augmenter::new(AugmentationConfig::default());

        let order = |epoch| -> Vec<PathBuf> {
            SplitBatches::shuffled(&splits.train, codec, augmenter.clone(), 4, 42, epoch)
                .samples()
                .iter()
                .map(|s| s.path.clone())
                .collect()
        };

        assert_eq!(order(0), order(0));
        assert_ne!(order(0), order(1));

        let mut epoch_one = order(1);
        epoch_one.sort();
        let mut all: Vec<PathBuf> = splits.train.samples.iter().map(|s| s.path.clone()).collect();
        all.sort();
        assert_eq!(epoch_one, all);
    }

    #[test]
    fn test_augmented_items_are_reproducible() {
        let (_dir, splits) = fixture([(2, 2), (1, 1), (1, 1)]);
        let codec = ImageCodec::square(8);
        let augmenter = Augmenter::new(AugmentationConfig::default());

        let load = || -> Vec<JaundiceItem> {
            SplitBatches::shuffled(&splits.train, codec, augmenter.clone(), 4, 7, 3)
                .next()
                .unwrap()
                .unwrap()
        };

        let first = load();
        let second = load();
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.image, b.image);
        }
    }

    #[test]
    fn test_batcher_produces_nchw_tensors() {
        let (_dir, splits) = fixture([(1, 1), (1, 1), (1, 1)]);
        let codec = ImageCodec::new(6, 8);
        let items = SplitBatches::ordered(&splits.test, codec, 8).next().unwrap().unwrap();
        let first_pixel = items[0].image.pixel(0, 1);

        let device = Default::default();
        let batch: JaundiceBatch<TestBackend> = JaundiceBatcher::new().batch(items, &device);

        assert_eq!(batch.images.dims(), [2, 3, 6, 8]);
        let targets = batch.targets.into_data().to_vec::<f32>().unwrap();
        assert_eq!(targets, vec![0.0, 1.0]);

        // Channel planes: value at (c, y=0, x=1) of the first image
        let data = batch.images.into_data().to_vec::<f32>().unwrap();
        let plane = 6 * 8;
        for (c, expected) in first_pixel.iter().enumerate() {
            assert!((data[c * plane + 1] - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_corrupt_file_fails_batch() {
        let (dir, _) = fixture([(1, 1), (1, 1), (2, 0)]);
        // Overwrite a test image with garbage
        let victim = std::fs::read_dir(dir.path().join("test").join("test N"))
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        std::fs::write(&victim, b"garbage").unwrap();

        let splits = DatasetSplits::load(dir.path()).unwrap();
        let result = SplitBatches::ordered(&splits.test, ImageCodec::square(8), 4).next().unwrap();
        assert!(result.is_err());
    }
}
