//! HTTP adapter: `POST /computer_tool` in, JSON tool result out
//!
//! Status is 400 only when the result carries a non-empty error. A result with
//! no error field at all (a bare screenshot) is a 200.

use crate::runner::RunnerHandle;
use crate::tools::computer::ComputerAction;
use crate::tools::ToolResult;
use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

pub const COMPUTER_TOOL_PATH: &str = "/computer_tool";

#[derive(Debug, Clone)]
pub struct AppState {
    pub runner: RunnerHandle,
}

/// Response body. Absent and empty fields are left out.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct ToolResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(rename = "base64image", skip_serializing_if = "Option::is_none")]
    pub base64_image: Option<String>,
}

impl From<ToolResult> for ToolResponse {
    fn from(result: ToolResult) -> Self {
        let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());
        Self {
            error_message: non_empty(result.error),
            system: non_empty(result.system),
            output: non_empty(result.output),
            base64_image: non_empty(result.base64_image),
        }
    }
}

impl ToolResponse {
    fn error(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::default()
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(COMPUTER_TOOL_PATH, post(computer_tool).fallback(unsupported))
        .fallback(unsupported)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn computer_tool(State(state): State<AppState>, body: Bytes) -> Response {
    let action: ComputerAction = match serde_json::from_slice(&body) {
        Ok(action) => action,
        Err(e) => {
            tracing::warn!("Rejected request body: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(ToolResponse::error(format!("Invalid request body: {}", e))),
            )
                .into_response();
        }
    };

    let name = action.action.clone().unwrap_or_default();
    let input = match serde_json::to_value(&action) {
        Ok(input) => input,
        Err(e) => {
            tracing::error!("Failed to build tool input: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ToolResponse::error(e.to_string())),
            )
                .into_response();
        }
    };

    let result = match state.runner.run("computer", input).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("Tool runner unavailable: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ToolResponse::error(e.to_string())),
            )
                .into_response();
        }
    };

    let status = if result.is_error() {
        tracing::info!(action = %name, error = result.error.as_deref().unwrap_or_default(), "Action failed");
        StatusCode::BAD_REQUEST
    } else {
        tracing::info!(action = %name, "Action completed");
        StatusCode::OK
    };

    (status, Json(ToolResponse::from(result))).into_response()
}

/// Everything except `POST /computer_tool`
async fn unsupported(method: Method) -> Response {
    let (status, message) = match method {
        Method::GET | Method::HEAD => (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"),
        Method::POST => (StatusCode::NOT_FOUND, "Not Found"),
        _ => (StatusCode::NOT_IMPLEMENTED, "Unsupported method"),
    };

    (status, Json(ToolResponse::error(message))).into_response()
}
