//! HTTP handlers
//!
//! Inference runs on the blocking pool; handlers only parse uploads and
//! shape responses.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::error::ApiError;
use super::state::SharedState;
use crate::artifact::MetricsRecord;
use crate::dataset::CLASS_NAMES;
use crate::inference::{BatchPrediction, ImageUpload, PredictionResult, MODEL_NAME};
use crate::utils::error::Result;

/// Largest accepted upload per file
pub const MAX_FILE_SIZE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub model_loaded: bool,
    pub uptime_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InfoMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub training_date: String,
    pub test_samples: usize,
}

#[derive(Debug, Serialize)]
pub struct ModelInfoResponse {
    pub model_name: &'static str,
    pub version: String,
    pub input_shape: [usize; 3],
    pub classes: [&'static str; 2],
    pub threshold: f32,
    pub timestamp: String,
    #[serde(flatten)]
    pub metrics: Option<InfoMetrics>,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    #[serde(flatten)]
    pub result: PredictionResult,
    pub timestamp: String,
    pub model_version: String,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    #[serde(flatten)]
    pub batch: BatchPrediction,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct StatsMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

#[derive(Debug, Serialize)]
pub struct ConfusionCounts {
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_positives: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub model_name: &'static str,
    pub version: String,
    pub training_date: String,
    pub threshold: f32,
    pub metrics: StatsMetrics,
    pub confusion_matrix: ConfusionCounts,
    pub test_samples: usize,
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn version_of(record: Option<&MetricsRecord>) -> String {
    match record {
        Some(r) if !r.model_version.is_empty() => r.model_version.clone(),
        _ => crate::VERSION.to_string(),
    }
}

/// Run `f` on the blocking pool
async fn blocking<T, F>(f: F) -> std::result::Result<T, ApiError>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::internal(format!("inference task failed: {}", e)))?
        .map_err(ApiError::from)
}

/// GET /api/health - Loads the model if needed and reports readiness
pub async fn health(State(state): State<SharedState>) -> Response {
    let service_state = state.clone();
    let loaded = blocking(move || service_state.service.artifact().map(|_| ())).await;

    match loaded {
        Ok(()) => Json(HealthResponse {
            status: "ok",
            timestamp: now(),
            model_loaded: true,
            uptime_seconds: state.uptime_seconds(),
            error: None,
        })
        .into_response(),
        Err(e) => (
            e.status,
            Json(HealthResponse {
                status: "error",
                timestamp: now(),
                model_loaded: false,
                uptime_seconds: state.uptime_seconds(),
                error: Some(e.message),
            }),
        )
            .into_response(),
    }
}

/// GET /api/model/info
pub async fn model_info(State(state): State<SharedState>) -> std::result::Result<Json<ModelInfoResponse>, ApiError> {
    let service_state = state.clone();
    let artifact = blocking(move || service_state.service.artifact()).await?;

    let record = artifact.metrics.as_ref();
    let size = artifact.input_size;

    Ok(Json(ModelInfoResponse {
        model_name: MODEL_NAME,
        version: version_of(record),
        input_shape: [size, size, 3],
        classes: CLASS_NAMES,
        threshold: artifact.threshold,
        timestamp: now(),
        metrics: record.map(|r| InfoMetrics {
            accuracy: r.accuracy,
            precision: r.precision,
            recall: r.recall,
            f1_score: r.f1_score,
            training_date: r.training_date.clone(),
            test_samples: r.total_samples,
        }),
    }))
}

/// Read every multipart field named `name` as an upload
async fn read_uploads(multipart: &mut Multipart, name: &str) -> std::result::Result<Vec<ImageUpload>, ApiError> {
    let mut uploads = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        if field.name() != Some(name) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;

        if bytes.len() > MAX_FILE_SIZE_BYTES {
            return Err(ApiError::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("'{}' exceeds {} MB", filename, MAX_FILE_SIZE_BYTES / (1024 * 1024)),
            ));
        }

        uploads.push(ImageUpload::new(filename, bytes.to_vec()));
    }

    Ok(uploads)
}

/// POST /api/predict - multipart field `file`
pub async fn predict(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> std::result::Result<Json<PredictResponse>, ApiError> {
    let upload = read_uploads(&mut multipart, "file")
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::bad_request("No file provided"))?;

    if upload.filename.is_empty() {
        return Err(ApiError::bad_request("Empty filename"));
    }

    let service_state = state.clone();
    let (result, version) = blocking(move || {
        let result = service_state
            .service
            .predict(&upload.bytes, Some(&upload.filename))?;
        let version = service_state
            .service
            .artifact()
            .map(|artifact| version_of(artifact.metrics.as_ref()))?;
        Ok((result, version))
    })
    .await?;

    Ok(Json(PredictResponse {
        result,
        timestamp: now(),
        model_version: version,
    }))
}

/// POST /api/batch-predict - one or more multipart fields `files`
pub async fn batch_predict(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> std::result::Result<Json<BatchResponse>, ApiError> {
    let uploads = read_uploads(&mut multipart, "files").await?;
    if uploads.is_empty() {
        return Err(ApiError::bad_request("No files provided"));
    }

    info!("Batch request with {} files", uploads.len());
    let service_state = state.clone();
    let batch = blocking(move || service_state.service.predict_batch(&uploads)).await?;

    Ok(Json(BatchResponse {
        batch,
        timestamp: now(),
    }))
}

/// GET /api/stats - Stored evaluation of the current artifact
pub async fn stats(State(state): State<SharedState>) -> std::result::Result<Json<StatsResponse>, ApiError> {
    let store = state.store.clone();
    let record = blocking(move || store.load_metrics())
        .await?
        .ok_or_else(|| ApiError::not_found("Model metrics not available"))?;

    Ok(Json(StatsResponse {
        model_name: MODEL_NAME,
        version: version_of(Some(&record)),
        training_date: record.training_date.clone(),
        threshold: record.threshold,
        metrics: StatsMetrics {
            accuracy: record.accuracy,
            precision: record.precision,
            recall: record.recall,
            f1_score: record.f1_score,
        },
        confusion_matrix: ConfusionCounts {
            true_negatives: record.true_negatives,
            false_positives: record.false_positives,
            false_negatives: record.false_negatives,
            true_positives: record.true_positives,
        },
        test_samples: record.total_samples,
    }))
}

/// Fallback for unknown routes
pub async fn not_found() -> ApiError {
    ApiError::not_found("Endpoint not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactStore;
    use crate::dataset::codec::tests::png_bytes;
    use crate::dataset::ImageCodec;
    use crate::inference::service::tests::{CountingLoader, SIZE};
    use crate::inference::{InferenceService, ModelLoader};
    use crate::server::state::AppState;
    use axum::body::Body;
    use axum::extract::FromRequest;
    use axum::http::{header::CONTENT_TYPE, Request};
    use serde_json::Value;
    use std::sync::Arc;
    use tempfile::TempDir;

    const BOUNDARY: &str = "jaundice-test-boundary";

    fn state(loader: CountingLoader, dir: &TempDir) -> SharedState {
        let loader: Box<dyn ModelLoader> = Box::new(loader);
        Arc::new(AppState::new(
            InferenceService::new(loader, ImageCodec::square(SIZE)),
            ArtifactStore::new(dir.path()),
        ))
    }

    async fn multipart(parts: &[(&str, &str, Vec<u8>)]) -> Multipart {
        let mut body = Vec::new();
        for (field, filename, bytes) in parts {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::builder()
            .method("POST")
            .header(CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap();
        Multipart::from_request(request, &()).await.unwrap()
    }

    async fn json_body(response: Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_reports_loaded_model() {
        let dir = TempDir::new().unwrap();
        let (status, body) = json_body(health(State(state(CountingLoader::new(0.5, 0.5), &dir))).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["model_loaded"], true);
    }

    #[tokio::test]
    async fn test_health_without_model_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let mut loader = CountingLoader::new(0.5, 0.5);
        loader.failures = usize::MAX;

        let (status, body) = json_body(health(State(state(loader, &dir))).await).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["model_loaded"], false);
    }

    #[tokio::test]
    async fn test_predict_uses_calibrated_threshold() {
        let dir = TempDir::new().unwrap();
        let state = state(CountingLoader::new(0.5, 0.42), &dir);
        let upload = multipart(&[("file", "face.jpg", png_bytes(10, 10))]).await;

        let (status, body) = json_body(predict(State(state), upload).await.into_response()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["prediction"], "jaundice");
        assert_eq!(body["confidence"], 0.5);
        assert_eq!(body["probability_normal"], 0.5);
        assert!(body.get("timestamp").is_some());
    }

    #[tokio::test]
    async fn test_predict_client_errors() {
        let dir = TempDir::new().unwrap();
        let state = state(CountingLoader::new(0.5, 0.5), &dir);

        let missing = multipart(&[("other", "a.png", png_bytes(8, 8))]).await;
        let response = predict(State(state.clone()), missing).await.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let corrupt = multipart(&[("file", "a.png", b"garbage".to_vec())]).await;
        let response = predict(State(state.clone()), corrupt).await.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let wrong_type = multipart(&[("file", "a.pdf", png_bytes(8, 8))]).await;
        let (status, body) = json_body(predict(State(state), wrong_type).await.into_response()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Allowed"));
    }

    #[tokio::test]
    async fn test_predict_without_model_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let mut loader = CountingLoader::new(0.5, 0.5);
        loader.failures = usize::MAX;
        let upload = multipart(&[("file", "a.png", png_bytes(8, 8))]).await;

        let response = predict(State(state(loader, &dir)), upload).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_batch_predict_reports_partial_failure() {
        let dir = TempDir::new().unwrap();
        let state = state(CountingLoader::new(0.9, 0.5), &dir);
        let upload = multipart(&[
            ("files", "1.png", png_bytes(8, 8)),
            ("files", "2.png", b"not an image".to_vec()),
            ("files", "3.png", png_bytes(9, 9)),
        ])
        .await;

        let (status, body) = json_body(batch_predict(State(state), upload).await.into_response()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 3);
        assert_eq!(body["successful"], 2);
        assert_eq!(body["results"][1]["status"], "error");
        assert_eq!(body["results"][1]["filename"], "2.png");
        assert_eq!(body["results"][2]["status"], "success");
        assert_eq!(body["results"][2]["prediction"], "jaundice");
    }

    #[tokio::test]
    async fn test_stats_requires_metrics_record() {
        let dir = TempDir::new().unwrap();
        let state = state(CountingLoader::new(0.5, 0.5), &dir);

        let response = stats(State(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let record = MetricsRecord {
            accuracy: 0.9,
            true_positives: 7,
            total_samples: 10,
            model_version: "1.0".to_string(),
            ..Default::default()
        };
        state.store.save_metrics(&record).unwrap();

        let (status, body) = json_body(stats(State(state)).await.into_response()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["metrics"]["accuracy"], 0.9);
        assert_eq!(body["confusion_matrix"]["true_positives"], 7);
        assert_eq!(body["test_samples"], 10);
        assert_eq!(body["version"], "1.0");
    }

    #[tokio::test]
    async fn test_model_info_shape() {
        let dir = TempDir::new().unwrap();
        let (status, body) = json_body(
            model_info(State(state(CountingLoader::new(0.5, 0.3), &dir)))
                .await
                .into_response(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["model_name"], "jaundice_detection_model");
        assert_eq!(body["input_shape"], serde_json::json!([8, 8, 3]));
        assert_eq!(body["classes"], serde_json::json!(["normal", "jaundice"]));
        // No metrics record in the fake artifact
        assert!(body.get("accuracy").is_none());
    }
}
