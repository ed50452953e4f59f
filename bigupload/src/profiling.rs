//! Opt-in per-request profiling around an upload handler.
//!
//! When the `profile` query flag is set, the handler starts a [`ProfileGuard`]
//! before touching the body and finishes it after the sink/relay completes,
//! whether that succeeded or failed. The
//! guard measures wall time and process memory (RSS via `sysinfo`) and writes a
//! two-section text report named from the request's declared content type and
//! length. Profiling never alters the handler's response: every failure here is
//! logged and swallowed.

use std::path::Path;
use std::time::Instant;
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Failure to produce a profiling report. Always non-fatal.
#[derive(Debug, thiserror::Error)]
#[error("failed to write profiling report")]
pub struct ProfilingError(#[from] std::io::Error);

/// Live measurement state for one profiled request.
pub struct ProfileGuard {
    started: Instant,
    system: System,
    pid: Option<Pid>,
    rss_before: u64,
    bytes: Option<u64>,
    chunks: Option<u64>,
}

impl ProfileGuard {
    /// Start profiling if `enabled`, otherwise return `None` (zero overhead).
    pub fn start(enabled: bool) -> Option<Self> {
        if !enabled {
            return None;
        }
        let mut system = System::new();
        let pid = sysinfo::get_current_pid().ok();
        let rss_before = pid.map(|p| sample_rss(&mut system, p)).unwrap_or(0);
        Some(Self {
            started: Instant::now(),
            system,
            pid,
            rss_before,
            bytes: None,
            chunks: None,
        })
    }

    /// Record transfer statistics from a completed drain. The relay path has no
    /// local counters (the transport consumes the stream), so these stay unset.
    pub fn record_transfer(&mut self, bytes: u64, chunks: u64) {
        self.bytes = Some(bytes);
        self.chunks = Some(chunks);
    }

    /// Stop measuring and write the report. Errors are logged, not returned.
    pub async fn finish(
        mut self,
        content_type: Option<&str>,
        content_length: Option<u64>,
        results_dir: &Path,
    ) {
        let elapsed = self.started.elapsed();
        let rss_after = self
            .pid
            .map(|p| sample_rss(&mut self.system, p))
            .unwrap_or(0);

        let mut report = String::new();
        report.push_str("######## Time and calls profiling. ########\n");
        report.push_str(&format!("wall time: {:.6}s\n", elapsed.as_secs_f64()));
        match (self.chunks, self.bytes) {
            (Some(chunks), Some(bytes)) => {
                report.push_str(&format!("chunks read: {chunks}\n"));
                report.push_str(&format!("bytes transferred: {bytes}\n"));
                let secs = elapsed.as_secs_f64();
                if secs > 0.0 {
                    report.push_str(&format!(
                        "throughput: {:.2} MiB/s\n",
                        bytes as f64 / (1024.0 * 1024.0) / secs
                    ));
                }
            }
            _ => report.push_str("chunks read: not recorded (relayed)\n"),
        }
        report.push_str("########     Memory profiling.     ########\n");
        report.push_str(&format!("rss before: {} bytes\n", self.rss_before));
        report.push_str(&format!("rss after: {rss_after} bytes\n"));
        report.push_str(&format!(
            "rss delta: {} bytes\n",
            rss_after as i64 - self.rss_before as i64
        ));

        let file_name = report_file_name(content_type, content_length);
        if let Err(e) = write_report(results_dir, &file_name, &report).await {
            tracing::warn!(error = %e, file_name, "could not write profiling report");
        }
    }
}

fn sample_rss(system: &mut System, pid: Pid) -> u64 {
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).map(|p| p.memory()).unwrap_or(0)
}

async fn write_report(dir: &Path, file_name: &str, contents: &str) -> Result<(), ProfilingError> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(dir.join(file_name), contents).await?;
    Ok(())
}

/// Derive the report filename from the declared content type and length:
/// `{type-with-slashes-as-dashes}_{length-or-"size-not-known"}-bytes.txt`.
/// Content-type parameters (anything after `;`) are stripped.
pub fn report_file_name(content_type: Option<&str>, content_length: Option<u64>) -> String {
    let upload_type = content_type
        .and_then(|ct| ct.split(';').next())
        .map(str::trim)
        .filter(|ct| !ct.is_empty())
        .unwrap_or("unknown")
        .replace('/', "-");
    let size = content_length
        .map(|n| n.to_string())
        .unwrap_or_else(|| "size-not-known".to_string());
    format!("{upload_type}_{size}-bytes.txt")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_name_replaces_slashes_and_keeps_length() {
        assert_eq!(
            report_file_name(Some("application/octet-stream"), Some(1048576)),
            "application-octet-stream_1048576-bytes.txt"
        );
    }

    #[test]
    fn report_name_without_length_uses_placeholder() {
        assert_eq!(
            report_file_name(Some("application/octet-stream"), None),
            "application-octet-stream_size-not-known-bytes.txt"
        );
    }

    #[test]
    fn report_name_strips_content_type_parameters() {
        assert_eq!(
            report_file_name(Some("multipart/form-data; boundary=xyz"), Some(42)),
            "multipart-form-data_42-bytes.txt"
        );
    }

    #[test]
    fn report_name_handles_missing_content_type() {
        assert_eq!(report_file_name(None, Some(1)), "unknown_1-bytes.txt");
    }

    #[tokio::test]
    async fn guard_writes_report_into_results_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut guard = ProfileGuard::start(true).expect("profiling enabled");
        guard.record_transfer(2048, 2);
        guard
            .finish(Some("application/octet-stream"), Some(2048), dir.path())
            .await;

        let contents =
            std::fs::read_to_string(dir.path().join("application-octet-stream_2048-bytes.txt"))
                .unwrap();
        assert!(contents.contains("Time and calls profiling"));
        assert!(contents.contains("Memory profiling"));
        assert!(contents.contains("bytes transferred: 2048"));
    }

    #[test]
    fn disabled_guard_is_none() {
        assert!(ProfileGuard::start(false).is_none());
    }
}
