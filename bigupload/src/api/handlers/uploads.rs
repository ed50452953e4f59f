//! The three upload endpoints, each exercising a different ingest data path.
//!
//! All of them consume the request body chunk-by-chunk; none materializes the
//! whole payload in memory. On success and on internal failure alike they
//! answer `200 {"msg": ...}` - the failure detail goes to the server log, not
//! to the client (see [`crate::errors::Error`]).

use crate::AppState;
use crate::api::models::uploads::{MsgResponse, RelayQuery, UploadQuery};
use crate::errors::{Error, Result};
use crate::profiling::ProfileGuard;
use crate::relay::{self, BodyStream};
use crate::sink::{self, SinkDest, SinkReport};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Query, State},
    http::{HeaderMap, header},
};

fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Upload reading from a multipart form field named `file`.
///
/// This mirrors the buffered-field client strategy. The field content is
/// consumed incrementally and discarded; unlike frameworks that spool form
/// fields to temporary files before the handler runs, nothing is pre-buffered
/// here. The observable contract (named field in, content dropped) is the same.
pub async fn upload_request_files(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<MsgResponse>> {
    let guard = ProfileGuard::start(query.profile);

    let result = drain_file_field(&mut multipart).await;

    // The guard finishes on success and failure alike; a profiled request
    // always gets a report.
    if let Some(mut guard) = guard {
        if let Ok(report) = &result {
            guard.record_transfer(report.bytes_written, report.chunks);
        }
        guard
            .finish(
                content_type(&headers),
                content_length(&headers),
                &state.config.results_dir,
            )
            .await;
    }

    let report = result?;
    tracing::info!(
        bytes = report.bytes_written,
        chunks = report.chunks,
        "multipart upload drained to discard"
    );

    Ok(Json(MsgResponse {
        msg: "File saved".to_string(),
    }))
}

async fn drain_file_field(multipart: &mut Multipart) -> Result<SinkReport> {
    let mut report = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::debug!(error = %e, "malformed multipart body");
        Error::BadRequest {
            message: "failed to parse multipart data".to_string(),
        }
    })? {
        if field.name() == Some("file") {
            report = Some(sink::drain(field, SinkDest::discard()).await?);
        }
        // Other fields are ignored (forward compatibility).
    }

    report.ok_or_else(|| Error::BadRequest {
        message: "missing form field 'file'".to_string(),
    })
}

/// Upload reading directly from the raw request stream.
///
/// This is the path that achieves bounded memory and disk use at the framework
/// boundary: the body is persisted to a uniquely named file in the downloads
/// directory as it arrives, one chunk at a time.
pub async fn upload_request_stream(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<MsgResponse>> {
    let guard = ProfileGuard::start(query.profile);
    let declared_len = content_length(&headers);

    let result = async {
        let dest = SinkDest::file(&state.config.downloads_dir, declared_len).await?;
        sink::drain(body.into_data_stream(), dest).await
    }
    .await;

    if let Some(mut guard) = guard {
        if let Ok(report) = &result {
            guard.record_transfer(report.bytes_written, report.chunks);
        }
        guard
            .finish(
                content_type(&headers),
                declared_len,
                &state.config.results_dir,
            )
            .await;
    }

    let report = result?;
    tracing::info!(
        bytes = report.bytes_written,
        chunks = report.chunks,
        path = ?report.path,
        "stream upload persisted"
    );

    Ok(Json(MsgResponse {
        msg: "File saved".to_string(),
    }))
}

/// Pass the raw request stream on to the next service hop.
///
/// The body is forwarded to `http://{next}/request-stream` without buffering:
/// the outbound request body is the inbound stream itself. A single attempt,
/// no retry.
pub async fn stream_pass_to_next(
    State(state): State<AppState>,
    Query(query): Query<RelayQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<MsgResponse>> {
    let guard = ProfileGuard::start(query.profile);
    let next = query
        .next
        .unwrap_or_else(|| state.config.default_next.clone());
    let declared_len = content_length(&headers);

    let stream = BodyStream::new(body.into_data_stream(), declared_len);
    let result = relay::relay(stream, &next, &state.http_client).await;

    if let Some(guard) = guard {
        guard
            .finish(
                content_type(&headers),
                declared_len,
                &state.config.results_dir,
            )
            .await;
    }

    let report = result?;
    tracing::info!(next = %next, status = %report.status, "upload relayed downstream");

    Ok(Json(MsgResponse {
        msg: "File uploaded".to_string(),
    }))
}
