use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Fatal startup errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set and non-empty (environment or .env file)")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Failures talking to FusionBrain. Logged where they happen and collapsed into an
/// [`ApiError`] category before reaching the client.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Status { status: reqwest::StatusCode, body: String },

    #[error("cannot decode upstream response: {0}")]
    Decode(String),

    #[error("cannot encode generation params: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("model catalog is empty")]
    NoModels,

    #[error("submission response has no job id")]
    MissingJobId,
}

impl UpstreamError {
    pub(crate) fn status(status: reqwest::StatusCode, body: &str) -> Self {
        Self::Status {
            status,
            body: body.chars().take(500).collect(),
        }
    }
}

/// Errors returned by the HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Текстовый промпт не может быть пустым")]
    EmptyPrompt,

    #[error("Не удалось получить ID модели")]
    ModelUnavailable,

    #[error("Не удалось запустить генерацию")]
    SubmissionFailed,

    #[error("Не удалось сгенерировать изображение или истекло время ожидания")]
    GenerationFailedOrTimedOut,

    #[error("Не удалось загрузить стили")]
    StylesUnavailable,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::EmptyPrompt => StatusCode::BAD_REQUEST,
            Self::ModelUnavailable | Self::SubmissionFailed | Self::GenerationFailedOrTimedOut => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::StylesUnavailable => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status_code(), Json(body)).into_response()
    }
}
