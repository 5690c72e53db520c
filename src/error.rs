use actix_web::HttpResponse;
use actix_web::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::asr::TranscribeError;
use crate::audio::DecodeError;

/// Request-boundary error. Every failure in the transcription pipeline is
/// converted into one of these and rendered as a structured JSON response;
/// nothing past the handler is allowed to crash the serving process.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Model(String),

    #[error("internal server error")]
    Internal,
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "invalid_input",
            ApiError::Model(_) => "model_error",
            ApiError::Internal => "internal_error",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    code: &'a str,
    message: String,
}

impl actix_web::ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Model(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
            },
        })
    }
}

impl From<DecodeError> for ApiError {
    fn from(err: DecodeError) -> Self {
        ApiError::InvalidInput(err.to_string())
    }
}

impl From<TranscribeError> for ApiError {
    fn from(err: TranscribeError) -> Self {
        match err {
            // too-short audio is a property of the upload, not the model
            TranscribeError::AudioTooShort => ApiError::InvalidInput(err.to_string()),
            TranscribeError::Model(msg) => ApiError::Model(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::ResponseError;

    #[test]
    fn status_codes_match_error_kinds() {
        assert_eq!(
            ApiError::InvalidInput("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Model("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::Internal.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(ApiError::InvalidInput("x".into()).code(), "invalid_input");
        assert_eq!(ApiError::Model("x".into()).code(), "model_error");
        assert_eq!(ApiError::Internal.code(), "internal_error");
    }

    #[test]
    fn internal_error_leaks_no_detail() {
        assert_eq!(ApiError::Internal.to_string(), "internal server error");
    }

    #[test]
    fn decode_failures_map_to_invalid_input() {
        let err: ApiError = DecodeError::UnsupportedFormat.into();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn short_audio_maps_to_invalid_input() {
        let err: ApiError = TranscribeError::AudioTooShort.into();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn model_failure_maps_to_model_error() {
        let err: ApiError = TranscribeError::Model("engine exploded".into()).into();
        assert_eq!(err.code(), "model_error");
        assert_eq!(err.to_string(), "engine exploded");
    }
}
