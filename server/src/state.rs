//! Application state for the inference server
//!
//! Holds the configuration and the lazily loaded model. The model is loaded
//! at most once; a failed attempt leaves the slot empty so a later request
//! can try again.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use cropdoc::backend::{default_device, InferenceBackend};
use cropdoc::inference::{ModelLocator, Predictor};
use cropdoc::CropDocError;
use tokio::sync::OnceCell;
use tracing::info;

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Directory searched for the model artifact
    pub model_dir: PathBuf,
    /// Square resolution uploads are resized to
    pub image_size: usize,
    /// Request body limit in bytes
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("."),
            image_size: cropdoc::IMAGE_SIZE,
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

/// A loaded model, shared between requests
#[derive(Clone)]
pub struct LoadedModel {
    /// Inference is serialized on this lock
    pub predictor: Arc<Mutex<Predictor<InferenceBackend>>>,
    pub path: PathBuf,
}

/// Shared application state
pub struct AppState {
    pub config: ServerConfig,
    model: OnceCell<LoadedModel>,
    /// Server start time
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            model: OnceCell::new(),
            started_at: Instant::now(),
        }
    }

    /// The model, loading it on first use
    ///
    /// Concurrent callers wait on the same load.
    pub async fn model(&self) -> Result<LoadedModel, CropDocError> {
        self.model
            .get_or_try_init(|| async {
                let dir = self.config.model_dir.clone();
                let image_size = self.config.image_size;

                let loaded = tokio::task::spawn_blocking(move || {
                    let artifact = ModelLocator::new(&dir).locate()?;
                    let predictor = Predictor::<InferenceBackend>::load(
                        &artifact,
                        image_size,
                        &default_device(),
                    )?;
                    Ok::<_, CropDocError>(LoadedModel {
                        predictor: Arc::new(Mutex::new(predictor)),
                        path: artifact.path,
                    })
                })
                .await
                .map_err(|e| CropDocError::ModelLoad {
                    path: self.config.model_dir.clone(),
                    reason: format!("loader task failed: {e}"),
                })??;

                info!("Model loaded from {:?}", loaded.path);
                Ok::<_, CropDocError>(loaded)
            })
            .await
            .cloned()
    }

    /// Path of the loaded model, if any
    pub fn model_path(&self) -> Option<PathBuf> {
        self.model.get().map(|m| m.path.clone())
    }

    pub fn model_loaded(&self) -> bool {
        self.model.initialized()
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;
