use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use meter_core::store::StoreError;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{context}: {source}")]
    Store {
        context: &'static str,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn store(context: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| ApiError::Store { context, source }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store { .. } | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::BadRequest(msg) | ApiError::NotFound(msg) => ErrorBody {
                status: "error",
                message: msg.clone(),
                error_details: None,
            },
            ApiError::Store { context, source } => ErrorBody {
                status: "error",
                message: (*context).to_string(),
                error_details: Some(source.to_string()),
            },
            ApiError::Internal(e) => ErrorBody {
                status: "error",
                message: "internal error".to_string(),
                error_details: Some(format!("{e:#}")),
            },
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        (status, Json(body)).into_response()
    }
}
