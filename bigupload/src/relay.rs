//! Stream relay: forwards an inbound byte stream as an outbound request body.
//!
//! The outbound POST carries the very same stream object the server is reading
//! the inbound request from, so bytes move connection-to-connection one chunk
//! at a time. The only buffering is whatever the transport's chunking needs.

use bytes::Bytes;
use futures::Stream;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::BoxError;

/// Path on the downstream instance that terminates relayed streams.
const DOWNSTREAM_PATH: &str = "/request-stream";

/// Failure while relaying an upload to the downstream service.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Connecting to or sending the request to the downstream failed. Inbound
    /// stream errors also surface here, since the transport polls the body.
    #[error("failed to forward upload to downstream")]
    Request(#[from] reqwest::Error),

    /// The downstream answered with a non-2xx status.
    #[error("downstream responded with status {0}")]
    Downstream(StatusCode),
}

/// Outcome of a successful relay.
#[derive(Debug)]
pub struct RelayReport {
    pub status: StatusCode,
}

/// A readable byte stream with a declared-length hint.
///
/// This is the minimal capability the relay needs: a read-next-chunk operation
/// and the byte limit the client declared, which outbound transports use to set
/// `Content-Length` even though the bytes themselves are streamed.
pub trait UploadStream: Stream<Item = Result<Bytes, BoxError>> + Send + 'static {
    fn declared_len(&self) -> Option<u64>;
}

/// [`UploadStream`] adapter over a request-body data stream.
pub struct BodyStream<S> {
    inner: S,
    declared_len: Option<u64>,
}

impl<S> BodyStream<S> {
    pub fn new(inner: S, declared_len: Option<u64>) -> Self {
        Self { inner, declared_len }
    }
}

impl<S, E> Stream for BodyStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<BoxError>,
{
    type Item = Result<Bytes, BoxError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner)
            .poll_next(cx)
            .map(|opt| opt.map(|res| res.map_err(Into::into)))
    }
}

impl<S, E> UploadStream for BodyStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    fn declared_len(&self) -> Option<u64> {
        self.declared_len
    }
}

/// Relay `stream` to `http://{target}/request-stream` in a single attempt.
///
/// The outbound content type is always `application/octet-stream`; the inbound
/// declared type is not preserved across the hop. That is a documented
/// limitation of this design, kept deliberately. Retries are the caller's
/// concern.
pub async fn relay<S>(
    stream: S,
    target: &str,
    client: &reqwest::Client,
) -> Result<RelayReport, RelayError>
where
    S: UploadStream,
{
    let url = format!("http://{target}{DOWNSTREAM_PATH}");
    let declared_len = stream.declared_len();

    let mut request = client
        .post(&url)
        .header(CONTENT_TYPE, "application/octet-stream");
    if let Some(len) = declared_len {
        request = request.header(CONTENT_LENGTH, len);
    }

    tracing::debug!(url = %url, declared_len, "relaying upload stream");

    let response = request
        .body(reqwest::Body::wrap_stream(stream))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(RelayError::Downstream(status));
    }
    Ok(RelayReport { status })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, extract::State, http::HeaderMap, routing::post};
    use futures::stream;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    #[derive(Clone, Default)]
    struct Received {
        bytes: Arc<Mutex<Vec<u8>>>,
        content_length: Arc<Mutex<Option<u64>>>,
    }

    async fn capture(State(received): State<Received>, headers: HeaderMap, body: Body) -> &'static str {
        *received.content_length.lock().unwrap() = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        received.bytes.lock().unwrap().extend_from_slice(&bytes);
        "ok"
    }

    async fn spawn_downstream(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr.to_string()
    }

    fn upload(chunks: Vec<&'static [u8]>, declared_len: Option<u64>) -> impl UploadStream {
        let items: Vec<Result<Bytes, io::Error>> =
            chunks.into_iter().map(|c| Ok(Bytes::from_static(c))).collect();
        BodyStream::new(stream::iter(items), declared_len)
    }

    #[tokio::test]
    async fn relay_forwards_bytes_and_declared_length() {
        let received = Received::default();
        let router = Router::new()
            .route(DOWNSTREAM_PATH, post(capture))
            .with_state(received.clone());
        let target = spawn_downstream(router).await;

        let client = reqwest::Client::new();
        let report = relay(upload(vec![b"abc", b"def"], Some(6)), &target, &client)
            .await
            .unwrap();

        assert!(report.status.is_success());
        assert_eq!(&*received.bytes.lock().unwrap(), b"abcdef");
        assert_eq!(*received.content_length.lock().unwrap(), Some(6));
    }

    #[tokio::test]
    async fn relay_without_declared_length_still_delivers() {
        let received = Received::default();
        let router = Router::new()
            .route(DOWNSTREAM_PATH, post(capture))
            .with_state(received.clone());
        let target = spawn_downstream(router).await;

        let client = reqwest::Client::new();
        relay(upload(vec![b"xyz"], None), &target, &client)
            .await
            .unwrap();
        assert_eq!(&*received.bytes.lock().unwrap(), b"xyz");
    }

    #[tokio::test]
    async fn downstream_failure_status_is_an_error() {
        let router = Router::new().route(
            DOWNSTREAM_PATH,
            post(|| async { axum::http::StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let target = spawn_downstream(router).await;

        let client = reqwest::Client::new();
        let err = relay(upload(vec![b"abc"], Some(3)), &target, &client)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::Downstream(StatusCode::INTERNAL_SERVER_ERROR)
        ));
    }

    #[tokio::test]
    async fn unreachable_downstream_is_a_request_error() {
        // Nothing listens here; the connection is refused.
        let client = reqwest::Client::new();
        let err = relay(upload(vec![b"abc"], Some(3)), "127.0.0.1:1", &client)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Request(_)));
    }
}
