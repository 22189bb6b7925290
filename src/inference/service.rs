//! Inference service
//!
//! Owns the lazily loaded artifact and turns raw image bytes into verdicts.
//! The first successful load is cached for the lifetime of the service and
//! shared read-only; concurrent first calls wait on a mutex so the loader runs
//! once. A failed load is not cached, so later calls retry.

use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use tracing::{debug, info, warn};

use super::prediction::{BatchItemResult, BatchPrediction, ItemOutcome, PredictionResult};
use crate::artifact::MetricsRecord;
use crate::dataset::{ImageCodec, ImageTensor};
use crate::utils::error::{JaundiceError, Result};

/// Anything that maps decoded images to jaundice probabilities
pub trait ProbabilityModel: Send + Sync {
    /// One probability per image, in input order
    fn predict_probabilities(&self, images: &[ImageTensor]) -> Result<Vec<f32>>;
}

/// Source of the serving artifact
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<LoadedArtifact>;

    /// Input size of the artifact, if it can be read without loading weights
    fn declared_input_size(&self) -> Result<Option<usize>> {
        Ok(None)
    }
}

impl<L: ModelLoader + ?Sized> ModelLoader for Box<L> {
    fn load(&self) -> Result<LoadedArtifact> {
        (**self).load()
    }

    fn declared_input_size(&self) -> Result<Option<usize>> {
        (**self).declared_input_size()
    }
}

/// Model plus everything needed to interpret its output
pub struct LoadedArtifact {
    pub model: Box<dyn ProbabilityModel>,
    /// Decision threshold (`p > threshold` means jaundice)
    pub threshold: f32,
    /// Square input size the model was trained on
    pub input_size: usize,
    pub metrics: Option<MetricsRecord>,
}

impl std::fmt::Debug for LoadedArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedArtifact")
            .field("threshold", &self.threshold)
            .field("input_size", &self.input_size)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

/// A named image submitted for batch prediction
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

/// Lazily loading predictor shared by all callers
pub struct InferenceService<L: ModelLoader> {
    loader: L,
    codec: ImageCodec,
    artifact: OnceLock<Arc<LoadedArtifact>>,
    init_lock: Mutex<()>,
}

impl<L: ModelLoader> InferenceService<L> {
    /// `codec` fixes the preprocessing; the artifact must match its size
    pub fn new(loader: L, codec: ImageCodec) -> Self {
        Self {
            loader,
            codec,
            artifact: OnceLock::new(),
            init_lock: Mutex::new(()),
        }
    }

    pub fn codec(&self) -> &ImageCodec {
        &self.codec
    }

    pub fn is_loaded(&self) -> bool {
        self.artifact.get().is_some()
    }

    /// Loaded artifact, loading it on first use
    pub fn artifact(&self) -> Result<Arc<LoadedArtifact>> {
        if let Some(artifact) = self.artifact.get() {
            return Ok(Arc::clone(artifact));
        }

        let _guard = self
            .init_lock
            .lock()
            .map_err(|_| JaundiceError::ModelUnavailable("model loader lock poisoned".to_string()))?;

        // Another caller may have finished loading while we waited
        if let Some(artifact) = self.artifact.get() {
            return Ok(Arc::clone(artifact));
        }

        let start = Instant::now();
        let artifact = self
            .loader
            .declared_input_size()
            .and_then(|declared| match declared {
                Some(size) => self.check_input_size(size),
                None => Ok(()),
            })
            .and_then(|_| self.loader.load())
            .and_then(|artifact| {
                self.check_input_size(artifact.input_size)?;
                Ok(artifact)
            })
            .map_err(|e| match e {
                JaundiceError::ModelUnavailable(_) => e,
                other => JaundiceError::ModelUnavailable(other.to_string()),
            });
        let artifact = match artifact {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!("Model load failed: {}", e);
                return Err(e);
            }
        };

        info!(
            "Model loaded in {:.2?} (threshold {:.4})",
            start.elapsed(),
            artifact.threshold
        );

        let artifact = Arc::new(artifact);
        // The init lock is held, so nobody else can have set it
        let _ = self.artifact.set(Arc::clone(&artifact));
        Ok(artifact)
    }

    fn check_input_size(&self, input_size: usize) -> Result<()> {
        let (height, width) = self.codec.target_size();
        if (input_size as u32, input_size as u32) != (height, width) {
            return Err(JaundiceError::ModelUnavailable(format!(
                "model expects {}x{} input but the service decodes {}x{}",
                input_size, input_size, height, width
            )));
        }
        Ok(())
    }

    /// Classify one image
    ///
    /// The image is decoded before the model is loaded, so a bad upload is
    /// `InvalidImage` even when no model is available.
    pub fn predict(&self, bytes: &[u8], filename: Option<&str>) -> Result<PredictionResult> {
        let image = self.codec.decode_and_normalize(bytes, filename)?;
        let artifact = self.artifact()?;
        let result = classify(&artifact, image)?;

        info!(
            "Prediction: {} (confidence: {:.2}%)",
            result.prediction,
            result.confidence * 100.0
        );
        Ok(result)
    }

    /// Classify several images; per-item failures are reported, not raised
    ///
    /// Fails as a whole only when the model cannot be loaded.
    pub fn predict_batch(&self, uploads: &[ImageUpload]) -> Result<BatchPrediction> {
        let artifact = self.artifact()?;

        let results = uploads
            .iter()
            .map(|upload| {
                let outcome = self
                    .codec
                    .decode_and_normalize(&upload.bytes, Some(&upload.filename))
                    .and_then(|image| classify(&artifact, image));

                let outcome = match outcome {
                    Ok(result) => ItemOutcome::Success(result),
                    Err(e) => {
                        debug!("Batch item {} failed: {}", upload.filename, e);
                        ItemOutcome::Error { error: e.to_string() }
                    }
                };

                BatchItemResult {
                    filename: upload.filename.clone(),
                    outcome,
                }
            })
            .collect();

        let batch = BatchPrediction::new(results);
        info!("Batch prediction: {}/{} successful", batch.successful, batch.total);
        Ok(batch)
    }
}

fn classify(artifact: &LoadedArtifact, image: ImageTensor) -> Result<PredictionResult> {
    let probabilities = artifact.model.predict_probabilities(std::slice::from_ref(&image))?;
    let p = match probabilities.as_slice() {
        [p] if p.is_finite() => *p,
        [p] => return Err(JaundiceError::Model(format!("model returned non-finite probability {}", p))),
        other => {
            return Err(JaundiceError::Model(format!(
                "expected 1 probability, model returned {}",
                other.len()
            )))
        }
    };
    Ok(PredictionResult::from_probability(p, artifact.threshold))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dataset::codec::tests::png_bytes;
    use crate::dataset::Label;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    pub(crate) const SIZE: u32 = 8;

    /// Returns the same probability for every image
    pub(crate) struct ConstantModel(pub f32);

    impl ProbabilityModel for ConstantModel {
        fn predict_probabilities(&self, images: &[ImageTensor]) -> Result<Vec<f32>> {
            Ok(vec![self.0; images.len()])
        }
    }

    /// Counts loads; fails the first `failures` attempts
    pub(crate) struct CountingLoader {
        pub probability: f32,
        pub threshold: f32,
        pub failures: usize,
        pub delay: Duration,
        pub loads: AtomicUsize,
    }

    impl CountingLoader {
        pub(crate) fn new(probability: f32, threshold: f32) -> Self {
            Self {
                probability,
                threshold,
                failures: 0,
                delay: Duration::ZERO,
                loads: AtomicUsize::new(0),
            }
        }

        fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    impl ModelLoader for CountingLoader {
        fn load(&self) -> Result<LoadedArtifact> {
            let attempt = self.loads.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            if attempt < self.failures {
                return Err(JaundiceError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "jaundice_model.mpk not found",
                )));
            }
            Ok(LoadedArtifact {
                model: Box::new(ConstantModel(self.probability)),
                threshold: self.threshold,
                input_size: SIZE as usize,
                metrics: None,
            })
        }

        fn declared_input_size(&self) -> Result<Option<usize>> {
            Ok(Some(SIZE as usize))
        }
    }

    fn service(loader: CountingLoader) -> InferenceService<CountingLoader> {
        InferenceService::new(loader, ImageCodec::square(SIZE))
    }

    #[test]
    fn test_calibrated_threshold_is_honored() {
        let service = service(CountingLoader::new(0.5, 0.42));
        let result = service.predict(&png_bytes(12, 10), Some("face.png")).unwrap();

        assert_eq!(result.prediction, Label::Jaundice);
        assert_eq!(result.confidence, 0.5);
        assert_eq!(result.probability_jaundice, 0.5);
        assert_eq!(result.probability_normal, 0.5);
    }

    #[test]
    fn test_invalid_image_never_loads_model() {
        let service = service(CountingLoader::new(0.5, 0.5));

        let err = service.predict(b"definitely not an image", None).unwrap_err();
        assert!(matches!(err, JaundiceError::InvalidImage { .. }));

        let err = service.predict(&png_bytes(8, 8), Some("scan.tiff")).unwrap_err();
        assert!(err.is_client_error());

        assert_eq!(service.loader.loads(), 0);
        assert!(!service.is_loaded());
    }

    #[test]
    fn test_batch_isolates_corrupt_item() {
        let service = service(CountingLoader::new(0.8, 0.5));
        let uploads = vec![
            ImageUpload::new("one.png", png_bytes(8, 8)),
            ImageUpload::new("two.png", b"\x89PNG broken".to_vec()),
            ImageUpload::new("three.png", png_bytes(16, 9)),
        ];

        let batch = service.predict_batch(&uploads).unwrap();

        assert_eq!(batch.total, 3);
        assert_eq!(batch.successful, 2);
        let names: Vec<&str> = batch.results.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["one.png", "two.png", "three.png"]);
        assert!(batch.results[0].outcome.is_success());
        assert!(matches!(batch.results[1].outcome, ItemOutcome::Error { .. }));
        let third = batch.results[2].outcome.prediction().unwrap();
        assert_eq!(third.prediction, Label::Jaundice);
        assert_eq!(third.probability_jaundice, 0.8);
    }

    #[test]
    fn test_batch_rejects_disallowed_extension_per_item() {
        let service = service(CountingLoader::new(0.2, 0.5));
        let uploads = vec![
            ImageUpload::new("ok.jpg", png_bytes(8, 8)),
            ImageUpload::new("notes.txt", png_bytes(8, 8)),
        ];

        let batch = service.predict_batch(&uploads).unwrap();
        assert_eq!(batch.successful, 1);
        assert_eq!(batch.results[0].outcome.prediction().unwrap().prediction, Label::Normal);
    }

    #[test]
    fn test_concurrent_first_calls_load_once() {
        let mut loader = CountingLoader::new(0.7, 0.5);
        loader.delay = Duration::from_millis(50);
        let service = service(loader);
        let bytes = png_bytes(8, 8);

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| service.predict(&bytes, None)))
                .collect();
            for handle in handles {
                assert!(handle.join().unwrap().is_ok());
            }
        });

        assert_eq!(service.loader.loads(), 1);
        assert!(service.is_loaded());
    }

    #[test]
    fn test_failed_load_is_retried() {
        let mut loader = CountingLoader::new(0.7, 0.5);
        loader.failures = 2;
        let service = service(loader);
        let bytes = png_bytes(8, 8);

        for _ in 0..2 {
            let err = service.predict(&bytes, None).unwrap_err();
            assert!(matches!(err, JaundiceError::ModelUnavailable(_)));
        }
        assert!(service.predict(&bytes, None).is_ok());
        assert!(service.predict(&bytes, None).is_ok());
        assert_eq!(service.loader.loads(), 3);
    }

    #[test]
    fn test_batch_fails_without_model() {
        let mut loader = CountingLoader::new(0.7, 0.5);
        loader.failures = usize::MAX;
        let service = service(loader);

        let err = service
            .predict_batch(&[ImageUpload::new("a.png", png_bytes(8, 8))])
            .unwrap_err();
        assert!(matches!(err, JaundiceError::ModelUnavailable(_)));
    }

    #[test]
    fn test_input_size_mismatch_is_unavailable() {
        let service = InferenceService::new(CountingLoader::new(0.7, 0.5), ImageCodec::square(16));
        let err = service.predict(&png_bytes(8, 8), None).unwrap_err();
        assert!(matches!(err, JaundiceError::ModelUnavailable(_)));
        assert!(!service.is_loaded());
    }

    #[test]
    fn test_input_size_mismatch_skips_weight_loading() {
        let service = InferenceService::new(CountingLoader::new(0.7, 0.5), ImageCodec::square(16));
        let bytes = png_bytes(8, 8);

        for _ in 0..2 {
            let err = service.predict(&bytes, None).unwrap_err();
            assert!(matches!(err, JaundiceError::ModelUnavailable(_)));
        }
        assert_eq!(service.loader.loads(), 0);
    }

    #[test]
    fn test_non_finite_probability_is_model_error() {
        let service = service(CountingLoader::new(f32::NAN, 0.5));
        let err = service.predict(&png_bytes(8, 8), None).unwrap_err();
        assert!(matches!(err, JaundiceError::Model(_)));
    }
}
