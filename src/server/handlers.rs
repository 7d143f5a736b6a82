//! Request handlers

use super::{error::ApiError, AppState};
use crate::config::{BackgroundColor, RemovalOptions};
use axum::{
    body::Bytes,
    extract::{Multipart, Query, State},
    http::header,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

/// Name of the multipart field carrying the image
pub const FILE_FIELD: &str = "file";

/// Query parameters of `POST /api/remove`
#[derive(Debug, Default, Deserialize)]
pub struct RemoveParams {
    #[serde(default)]
    pub only_mask: bool,
    /// Background color as `r,g,b` or `r,g,b,a`
    pub bgcolor: Option<String>,
}

impl RemoveParams {
    fn to_options(&self) -> Result<RemovalOptions, ApiError> {
        let background = match self.bgcolor.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(value) => Some(value.parse::<BackgroundColor>()?),
        };

        Ok(RemovalOptions {
            only_mask: self.only_mask,
            background,
        })
    }
}

/// `POST /api/remove`: multipart upload in, PNG out
pub async fn remove_handler(
    State(state): State<AppState>,
    Query(params): Query<RemoveParams>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let start_time = Instant::now();
    let options = params.to_options()?;

    let mut image_data: Option<Bytes> = None;
    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();

        if field_name == FILE_FIELD {
            let data = field.bytes().await?;
            if data.is_empty() {
                return Err(ApiError::bad_request("Empty file"));
            }
            tracing::debug!("Received file: {} bytes", data.len());
            image_data = Some(data);
        } else {
            tracing::debug!("Ignoring unknown field: {}", field_name);
        }
    }

    let image_data =
        image_data.ok_or_else(|| ApiError::bad_request("No image file provided in field 'file'"))?;
    let input_bytes = image_data.len();

    let session = Arc::clone(&state.session);
    let png = tokio::task::spawn_blocking(move || session.remove_bytes(&image_data, &options))
        .await
        .map_err(|e| {
            ApiError::from(crate::error::RemovalError::internal(format!(
                "Processing task failed: {e}"
            )))
        })??;

    tracing::info!(
        input_bytes,
        output_bytes = png.len(),
        only_mask = options.only_mask,
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "background removed"
    );

    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

/// `GET /health`
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "model": state.session.descriptor().name(),
        "backend": state.session.backend_name(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
