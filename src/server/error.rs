use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use mcp_views::{CacheError, McpError};
use serde::Serialize;

#[derive(Serialize)]
struct ErrorResponse<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    #[serde(rename = "type")]
    error_type: &'static str,
    code: &'a str,
    message: &'a str,
}

pub const HEADER_X_ERROR_CODE: &str = "X-Proxy-Error-Code";

pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Response {
    create_error(StatusCode::NOT_FOUND, code, message)
}

pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Response {
    create_error(StatusCode::BAD_REQUEST, code, message)
}

pub fn internal_error(code: impl Into<String>, message: impl Into<String>) -> Response {
    create_error(StatusCode::INTERNAL_SERVER_ERROR, code, message)
}

pub fn create_error(
    status: StatusCode,
    code: impl Into<String>,
    message: impl Into<String>,
) -> Response {
    let code_str = code.into();
    let message_str = message.into();

    let mut headers = HeaderMap::with_capacity(1);
    if let Ok(val) = HeaderValue::from_str(&code_str) {
        headers.insert(HEADER_X_ERROR_CODE, val);
    }

    (
        status,
        headers,
        Json(ErrorResponse {
            error: ErrorDetail {
                error_type: status
                    .canonical_reason()
                    .unwrap_or("Unknown Status Code"),
                code: &code_str,
                message: &message_str,
            },
        }),
    )
        .into_response()
}

/// Status for a failed capability URL.
pub fn cache_error(err: &CacheError) -> Response {
    let status = match err {
        CacheError::Expired => StatusCode::GONE,
        CacheError::InvalidSignature => StatusCode::FORBIDDEN,
        CacheError::NotFound => StatusCode::NOT_FOUND,
    };
    create_error(status, err.code(), err.to_string())
}

pub fn mcp_error(err: &McpError) -> Response {
    match err {
        McpError::ViewNotFound(_) | McpError::ToolNotFound(_) | McpError::ServerNotFound(_) => {
            not_found(err.code(), err.to_string())
        }
        McpError::InvalidArguments(_) => bad_request(err.code(), err.to_string()),
        McpError::Cache(cache) => cache_error(cache),
        _ => internal_error(err.code(), err.to_string()),
    }
}
