//! Prediction endpoint

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, error, warn};

use cropdoc::{CropDocError, Prediction};

use crate::state::SharedState;

/// Multipart field carrying the image
pub const FILE_FIELD: &str = "file";

#[derive(Serialize)]
pub struct PredictResponse {
    pub result: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Failures of `/predict`, each with its fixed wire message
#[derive(Debug)]
pub enum ApiError {
    NoFile,
    ModelLoad(String),
    Prediction(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NoFile => StatusCode::BAD_REQUEST,
            ApiError::ModelLoad(_) | ApiError::Prediction(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::NoFile => "No file uploaded".to_string(),
            ApiError::ModelLoad(e) => format!("Error al cargar el modelo: {e}"),
            ApiError::Prediction(e) => format!("Error en la predicción: {e}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Bytes of the first `file` field
async fn read_file_field(multipart: &mut Multipart) -> Result<Vec<u8>, ApiError> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(ApiError::NoFile),
            Err(e) => {
                warn!("Malformed multipart body: {}", e);
                return Err(ApiError::NoFile);
            }
        };

        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        return match field.bytes().await {
            Ok(bytes) => Ok(bytes.to_vec()),
            Err(e) => {
                warn!("Failed to read upload: {}", e);
                Err(ApiError::NoFile)
            }
        };
    }
}

/// POST /predict - classify the uploaded image
pub async fn predict(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let mut multipart = multipart.map_err(|e| {
        debug!("Rejected upload: {}", e);
        ApiError::NoFile
    })?;
    let bytes = read_file_field(&mut multipart).await?;
    debug!("Received {} bytes", bytes.len());

    let model = state.model().await.map_err(|e| {
        error!("Model load failed: {}", e);
        ApiError::ModelLoad(e.to_string())
    })?;

    let prediction = tokio::task::spawn_blocking(move || -> Result<Prediction, CropDocError> {
        // predict_bytes never mutates the predictor, so a poisoned lock is still usable
        let predictor = model.predictor.lock().unwrap_or_else(|p| p.into_inner());
        predictor.predict_bytes(&bytes)
    })
    .await
    .map_err(|e| ApiError::Prediction(format!("inference task failed: {e}")))?
    .map_err(|e| {
        warn!("Prediction failed: {}", e);
        ApiError::Prediction(e.to_string())
    })?;

    Ok(Json(PredictResponse {
        result: prediction.label,
    }))
}
