//! Export download API
//!
//! `GET /api/v1/admin/export` accepts the admin export form's query
//! parameters and streams the WXR document as a file download. Filter
//! errors are reported as JSON before any byte of the document is sent;
//! failures after that truncate the download.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
};
use chrono::Utc;

use crate::api::middleware::{ApiError, AppState};
use crate::export::{ChannelSink, ExportFilter, RawExportRequest};

/// Chunks buffered between the export task and the response body
const EXPORT_CHANNEL_CAPACITY: usize = 8;

const CONTENT_DESCRIPTION: HeaderName = HeaderName::from_static("content-description");

/// GET /api/v1/admin/export - Stream an export document
pub async fn export_handler(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let raw = RawExportRequest::from_pairs(params);
    let filter = ExportFilter::from_request(&raw, state.exporter.config())?;

    let filename = state.exporter.filename(Utc::now().date_naive());
    let disposition = HeaderValue::from_str(&format!("attachment; filename={}", filename))
        .map_err(|e| ApiError::internal_error(format!("Invalid download filename: {}", e)))?;

    let (mut sink, body) = ChannelSink::new(EXPORT_CHANNEL_CAPACITY);
    let exporter = state.exporter.clone();
    tokio::spawn(async move {
        if let Err(e) = exporter.export(filter, &mut sink).await {
            tracing::error!("Export failed: {}", e);
            sink.abort(&e).await;
        }
    });

    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static("text/xml; charset=UTF-8")),
        (header::CONTENT_DISPOSITION, disposition),
        (CONTENT_DESCRIPTION, HeaderValue::from_static("File Transfer")),
    ];
    Ok((headers, Body::from_stream(body)).into_response())
}
