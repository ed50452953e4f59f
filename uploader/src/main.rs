//! Upload a local file to the bigupload server using one of two client-side
//! strategies: a multipart form field (the path most client SDKs force) or a
//! raw streamed octet-stream body. Either way the file is streamed from disk,
//! never read into memory as a whole.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::multipart;
use std::path::PathBuf;
use tokio_util::io::ReaderStream;
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum UploadType {
    /// Multipart form upload; the server parses the `file` form field
    RequestFiles,
    /// Raw streamed body posted as application/octet-stream
    RequestStream,
}

impl UploadType {
    fn endpoint(self) -> &'static str {
        match self {
            UploadType::RequestFiles => "request-files",
            UploadType::RequestStream => "request-stream",
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// File to upload
    file: PathBuf,

    /// Upload strategy to exercise
    #[arg(short = 't', long, value_enum, default_value_t = UploadType::RequestStream)]
    upload_type: UploadType,

    /// Ask the server to profile this upload and write a report
    #[arg(short, long)]
    profile: bool,

    /// Base URL of the upload server
    #[arg(
        long,
        env = "BIG_UPLOAD_SERVER_URL",
        default_value = "http://localhost:5000/"
    )]
    server_url: String,
}

fn endpoint_url(server_url: &str, endpoint: &str) -> String {
    format!("{}/{endpoint}", server_url.trim_end_matches('/'))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let endpoint = args.upload_type.endpoint();

    let file = tokio::fs::File::open(&args.file)
        .await
        .with_context(|| format!("could not open {}", args.file.display()))?;
    let len = file.metadata().await?.len();

    let url = endpoint_url(&args.server_url, endpoint);
    println!("Uploading {} using {endpoint} ...", args.file.display());
    tracing::debug!(url = %url, bytes = len, "starting upload");

    let client = reqwest::Client::new();
    let request = client.post(&url).query(&[("profile", args.profile)]);

    let response = match args.upload_type {
        UploadType::RequestFiles => {
            let file_name = args
                .file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string());
            let part = multipart::Part::stream_with_length(
                reqwest::Body::wrap_stream(ReaderStream::new(file)),
                len,
            )
            .file_name(file_name);
            request
                .multipart(multipart::Form::new().part("file", part))
                .send()
                .await
        }
        UploadType::RequestStream => {
            request
                .header(CONTENT_TYPE, "application/octet-stream")
                .header(CONTENT_LENGTH, len)
                .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
                .send()
                .await
        }
    }
    .with_context(|| format!("upload to {url} failed"))?;

    if !response.status().is_success() {
        anyhow::bail!("server responded with {}", response.status());
    }

    println!("File {} uploaded using {endpoint}.", args.file.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_urls_join_without_double_slashes() {
        assert_eq!(
            endpoint_url("http://localhost:5000/", "request-stream"),
            "http://localhost:5000/request-stream"
        );
        assert_eq!(
            endpoint_url("http://localhost:5000", "request-files"),
            "http://localhost:5000/request-files"
        );
    }

    #[test]
    fn upload_types_map_to_their_endpoints() {
        assert_eq!(UploadType::RequestFiles.endpoint(), "request-files");
        assert_eq!(UploadType::RequestStream.endpoint(), "request-stream");
    }
}
