//! Stream sink: drains a byte-chunk stream into a discardable destination.
//!
//! The sink never holds more than one chunk of the upload in memory: each chunk
//! is written to the destination before the next one is requested from the
//! stream. The destination is either a discard sink (pure transfer-cost
//! measurement) or a freshly created file with a collision-resistant name.

use bytes::Bytes;
use futures::{Stream, TryStreamExt, pin_mut};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

use crate::BoxError;

/// Failure while draining an upload stream.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The inbound stream produced an error mid-transfer (e.g. the client
    /// dropped the connection).
    #[error("failed to read upload stream")]
    Read(#[source] BoxError),

    /// Writing to the destination failed (disk full, permissions, ...).
    #[error("failed to write upload to destination")]
    Io(#[from] std::io::Error),
}

/// Outcome of a successful drain.
#[derive(Debug)]
pub struct SinkReport {
    pub bytes_written: u64,
    pub chunks: u64,
    /// Path of the persisted file, if the destination was a file.
    pub path: Option<PathBuf>,
}

/// Where drained bytes go.
pub enum SinkDest {
    /// Bytes are accepted and dropped.
    Discard,
    /// Bytes are appended to a newly created file.
    File { file: File, path: PathBuf },
}

impl SinkDest {
    pub fn discard() -> Self {
        SinkDest::Discard
    }

    /// Open a new upload file under `dir`, creating the directory on first use.
    ///
    /// The filename combines the declared upload size in whole megabytes with a
    /// v4 UUID, so concurrent uploads of the same declared size never collide.
    pub async fn file(dir: &Path, declared_len: Option<u64>) -> Result<Self, SinkError> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(unique_upload_name(declared_len));
        let file = File::create(&path).await?;
        Ok(SinkDest::File { file, path })
    }
}

/// Generate a persisted-upload filename: `{declared-size-in-MB}MB_{uuid}`.
///
/// The megabyte conversion truncates; an unknown declared length counts as 0.
pub fn unique_upload_name(declared_len: Option<u64>) -> String {
    let mb = declared_len.unwrap_or(0) / 1024 / 1024;
    format!("{mb}MB_{}", Uuid::new_v4())
}

/// Consume `stream` to completion, writing each chunk to `dest` in order.
///
/// On failure the partially written file (if any) is removed best-effort; the
/// error is returned either way so callers never report a truncated upload as
/// success.
pub async fn drain<S, E>(stream: S, dest: SinkDest) -> Result<SinkReport, SinkError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<BoxError>,
{
    pin_mut!(stream);

    let (mut writer, path): (Box<dyn AsyncWrite + Send + Unpin>, Option<PathBuf>) = match dest {
        SinkDest::Discard => (Box::new(tokio::io::sink()), None),
        SinkDest::File { file, path } => (Box::new(file), Some(path)),
    };

    let mut bytes_written = 0u64;
    let mut chunks = 0u64;

    let outcome: Result<(), SinkError> = async {
        while let Some(chunk) = stream
            .try_next()
            .await
            .map_err(|e| SinkError::Read(e.into()))?
        {
            writer.write_all(&chunk).await?;
            bytes_written += chunk.len() as u64;
            chunks += 1;
        }
        writer.flush().await?;
        Ok(())
    }
    .await;

    match outcome {
        Ok(()) => Ok(SinkReport {
            bytes_written,
            chunks,
            path,
        }),
        Err(e) => {
            drop(writer);
            if let Some(path) = &path
                && let Err(rm) = tokio::fs::remove_file(path).await
            {
                tracing::debug!(path = %path.display(), error = %rm, "could not remove partial upload file");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::collections::HashSet;
    use std::io;

    fn ok_chunks(chunks: Vec<&'static [u8]>) -> impl Stream<Item = Result<Bytes, io::Error>> {
        stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from_static(c))))
    }

    #[tokio::test]
    async fn drain_to_discard_counts_bytes() {
        let report = drain(ok_chunks(vec![b"hello", b" ", b"world"]), SinkDest::discard())
            .await
            .unwrap();
        assert_eq!(report.bytes_written, 11);
        assert_eq!(report.chunks, 3);
        assert!(report.path.is_none());
    }

    #[tokio::test]
    async fn drain_empty_stream_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = SinkDest::file(dir.path(), Some(0)).await.unwrap();
        let report = drain(ok_chunks(vec![]), dest).await.unwrap();
        assert_eq!(report.bytes_written, 0);
        let path = report.path.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn drain_to_file_preserves_byte_order() {
        let dir = tempfile::tempdir().unwrap();
        let dest = SinkDest::file(dir.path(), Some(11)).await.unwrap();
        let report = drain(ok_chunks(vec![b"hello", b" ", b"world"]), dest)
            .await
            .unwrap();
        let path = report.path.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn drain_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("downloads");
        let dest = SinkDest::file(&nested, None).await.unwrap();
        let report = drain(ok_chunks(vec![b"x"]), dest).await.unwrap();
        assert!(report.path.unwrap().starts_with(&nested));
    }

    #[tokio::test]
    async fn mid_stream_error_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let chunks: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")),
        ];
        let dest = SinkDest::file(dir.path(), Some(1024)).await.unwrap();
        let err = drain(stream::iter(chunks), dest).await.unwrap_err();
        assert!(matches!(err, SinkError::Read(_)));
        // Partial file was cleaned up, directory is empty again.
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[test]
    fn upload_names_truncate_to_whole_megabytes() {
        assert!(unique_upload_name(Some(5 * 1024 * 1024 + 123)).starts_with("5MB_"));
        assert!(unique_upload_name(Some(1024)).starts_with("0MB_"));
        assert!(unique_upload_name(None).starts_with("0MB_"));
    }

    #[test]
    fn upload_names_do_not_collide() {
        let names: HashSet<String> = (0..1000).map(|_| unique_upload_name(Some(1048576))).collect();
        assert_eq!(names.len(), 1000);
    }
}
