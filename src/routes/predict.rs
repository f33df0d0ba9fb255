use crate::{
    inference_service::InferenceError, model_service::ModelService, prediction::Prediction,
    server::SharedState,
};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

const ROUTE: &str = "/predict";
const FILE_FIELD: &str = "file";
const GENERIC_SERVER_ERROR: &str = "Internal server error";

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("No file part")]
    NoFilePart,
    #[error("No selected file")]
    NoSelectedFile,
    #[error("Failed to read upload: {0}")]
    Upload(#[from] MultipartError),
    #[error(transparent)]
    Processing(#[from] InferenceError),
}

impl PredictError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PredictError::NoFilePart | PredictError::NoSelectedFile => StatusCode::BAD_REQUEST,
            PredictError::Upload(e) => e.status(),
            PredictError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            PredictError::NoFilePart | PredictError::NoSelectedFile => "missing_input",
            PredictError::Upload(_) => "upload",
            PredictError::Processing(_) => "processing",
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}

/// Error response with the message already chosen for the client.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn from_predict_error(err: &PredictError, expose_details: bool) -> Self {
        let status = err.status_code();
        let message = if status.is_server_error() && !expose_details {
            GENERIC_SERVER_ERROR.to_string()
        } else {
            err.to_string()
        };
        Self { status, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

#[instrument(skip(state, multipart))]
pub async fn predict<M: ModelService>(
    State(state): State<SharedState<M>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Prediction>, ApiError> {
    state.metrics.record_request(ROUTE);
    let start = Instant::now();

    let result = match multipart {
        Ok(multipart) => classify_upload(&state, multipart).await,
        Err(rejection) => {
            tracing::debug!("Request is not a multipart form: {}", rejection);
            Err(PredictError::NoFilePart)
        }
    };

    state
        .metrics
        .record_prediction_duration(start.elapsed().as_millis() as u64, ROUTE);

    match result {
        Ok(prediction) => {
            state.metrics.record_prediction(prediction.top_class().label());
            Ok(Json(prediction))
        }
        Err(err) => {
            match &err {
                PredictError::Processing(source) => {
                    tracing::error!("Prediction failed: {}", source)
                }
                other => tracing::warn!("Rejected prediction request: {}", other),
            }
            state.metrics.record_error(err.kind());
            Err(ApiError::from_predict_error(
                &err,
                state.expose_error_details,
            ))
        }
    }
}

async fn classify_upload<M: ModelService>(
    state: &SharedState<M>,
    multipart: Multipart,
) -> Result<Prediction, PredictError> {
    let (file_name, image_data) = read_file_field(multipart).await?;
    tracing::debug!("Received {} ({} bytes)", file_name, image_data.len());

    Ok(state.inference_service.predict(image_data).await?)
}

async fn read_file_field(mut multipart: Multipart) -> Result<(String, Vec<u8>), PredictError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        // A part without a filename is a plain form value, not an upload.
        let file_name = match field.file_name() {
            None => return Err(PredictError::NoFilePart),
            Some("") => return Err(PredictError::NoSelectedFile),
            Some(name) => name.to_string(),
        };

        let image_data = field.bytes().await?;
        if image_data.is_empty() {
            return Err(PredictError::NoSelectedFile);
        }

        return Ok((file_name, image_data.to_vec()));
    }

    Err(PredictError::NoFilePart)
}
