//! Shared server state

use std::sync::Arc;
use std::time::Instant;

use burn::tensor::backend::Backend;
use tracing::{info, warn};

use crate::artifact::ArtifactStore;
use crate::dataset::ImageCodec;
use crate::inference::{ArtifactLoader, InferenceService, ModelLoader};
use crate::IMAGE_SIZE;

pub type SharedState = Arc<AppState>;

/// State shared by every handler
///
/// The model behind `service` loads on first use; `store` is read directly
/// for the stats endpoint.
pub struct AppState {
    pub service: InferenceService<Box<dyn ModelLoader>>,
    pub store: ArtifactStore,
    started: Instant,
}

impl AppState {
    pub fn new(service: InferenceService<Box<dyn ModelLoader>>, store: ArtifactStore) -> Self {
        Self {
            service,
            store,
            started: Instant::now(),
        }
    }

    /// State serving the artifact in `store` on backend `B`
    ///
    /// Uploads are resized to the stored architecture's input size, or to
    /// [`IMAGE_SIZE`] when no artifact exists yet.
    pub fn for_artifact<B: Backend>(store: ArtifactStore, device: B::Device) -> Self {
        let input_size = match store.load_config() {
            Ok(config) => config.input_size,
            Err(e) => {
                warn!("No readable model config in {:?} ({}); assuming {}px input", store.dir(), e, IMAGE_SIZE);
                IMAGE_SIZE
            }
        };
        info!("Serving artifact from {:?} at {}px", store.dir(), input_size);

        let loader: Box<dyn ModelLoader> = Box::new(ArtifactLoader::<B>::new(store.clone(), device));
        let service = InferenceService::new(loader, ImageCodec::square(input_size as u32));
        Self::new(service, store)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}
