//! 图片上传与读取

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use crate::error::ApiError;
use crate::staging::StagedRef;
use crate::state::AppState;

/// 上传图片请求
#[derive(Debug, Deserialize)]
pub struct UploadImageRequest {
    /// `data:image/<subtype>;base64,<body>`
    pub image: String,
}

/// `POST /api/upload-image`
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UploadImageRequest>, JsonRejection>,
) -> Result<Json<StagedRef>, ApiError> {
    let Json(req) = payload.map_err(rejection_error)?;

    let staged = state.images.stage(&req.image).await?;
    tracing::info!(image_id = %staged.id, "image uploaded");

    Ok(Json(staged))
}

/// Body-limit rejections surface as 413, everything else as bad input
fn rejection_error(rejection: JsonRejection) -> ApiError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(rejection.body_text())
    } else {
        ApiError::InvalidInput(rejection.body_text())
    }
}

/// `GET /api/images/:id`
pub async fn get_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (bytes, media_type) = state.images.retrieve(&id).await?;
    Ok((image_headers(&media_type)?, bytes))
}

/// Response headers for staged bytes; SVG is served sandboxed
fn image_headers(media_type: &str) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    let content_type =
        HeaderValue::from_str(media_type).map_err(|e| ApiError::Storage(e.to_string()))?;
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    if media_type == "image/svg+xml" {
        headers.insert(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'none'; style-src 'unsafe-inline'; sandbox"),
        );
        headers.insert(
            header::CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment"),
        );
    }
    Ok(headers)
}
