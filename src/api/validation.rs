use actix_multipart::{form::MultipartFormConfig, MultipartError};
use actix_web::{error::PayloadError, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use tracing::warn;
use validator::ValidationErrors;

use crate::api::job::UploadLimits;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub fields: serde_json::Value,
}

impl ErrorResponse {
    pub fn message(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            fields: serde_json::json!({"message": message.into()}),
        }
    }
}

/// Render validation errors as `{"<field>": {"errors": [..]}}`.
pub fn field_errors(validation_errors: &ValidationErrors) -> serde_json::Value {
    let mut fields = serde_json::Map::new();

    for (field, errors) in validation_errors.field_errors() {
        let messages: Vec<String> = errors
            .iter()
            .map(|e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Validation error in field: {}", field))
            })
            .collect();
        fields.insert(field.to_string(), serde_json::json!({"errors": messages}));
    }

    serde_json::Value::Object(fields)
}

fn bad_request(error_response: ErrorResponse) -> actix_web::Error {
    actix_web::error::InternalError::from_response(
        "",
        HttpResponse::BadRequest().json(error_response),
    )
    .into()
}

/// Creates a configured QueryConfig with the project's standard error body
pub fn query_config() -> actix_web_validator::QueryConfig {
    actix_web_validator::QueryConfig::default().error_handler(|err, _req| match err {
        actix_web_validator::Error::Validate(validation_errors) => bad_request(ErrorResponse {
            error: "Validation failed".to_string(),
            fields: field_errors(&validation_errors),
        }),
        actix_web_validator::Error::Deserialize(de_err) => {
            let err_string = de_err.to_string();

            let message = if err_string.contains("unknown variant") {
                "Invalid enum value. Check allowed values for this field".to_string()
            } else {
                format!("Invalid query string: {}", err_string)
            };

            bad_request(ErrorResponse::message("Request validation failed", message))
        }
        _ => bad_request(ErrorResponse::message("Validation failed", "Validation error")),
    })
}

/// Multipart limits plus the standard error body for malformed or oversized
/// uploads and missing fields.
///
/// A body over `total_limit` is cut off before the form is complete; it is
/// reported as the same `video_file` size error the submission check gives.
pub fn multipart_config(limits: &UploadLimits, total_limit: usize) -> MultipartFormConfig {
    let size_error = limits.size_error();

    MultipartFormConfig::default()
        .total_limit(total_limit)
        .error_handler(move |err, _req| {
            if matches!(err, MultipartError::Payload(PayloadError::Overflow)) {
                warn!("Upload exceeded {} bytes", total_limit);
                let mut errors = ValidationErrors::new();
                errors.add("video_file", size_error.clone());
                return bad_request(ErrorResponse {
                    error: "Validation failed".to_string(),
                    fields: field_errors(&errors),
                });
            }

            let response = HttpResponse::build(err.status_code()).json(ErrorResponse::message(
                "Request validation failed",
                err.to_string(),
            ));
            actix_web::error::InternalError::from_response("", response).into()
        })
}
