//! # External Transcoder
//!
//! Audio/video transcoding is delegated to an ffmpeg-class binary. This module only
//! defines the call boundary and a subprocess implementation of it; the argument
//! vector is passed through verbatim and never interpreted.
//!
//! ```text
//! inputs ──► private temp dir ──► <binary> argv… (cwd = temp dir) ──► read output_name
//!                                      │
//!                                      └─ stderr: Duration / time= ──► on_progress(pct)
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::spawn_blocking;
use tracing::{debug, info, warn};

use crate::error::{ToolError, ToolResult};

/// Lines of stderr kept for error reports.
const STDERR_TAIL: usize = 12;

/// One named input file.
#[derive(Clone, PartialEq, Eq)]
pub struct TranscodeInput {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl TranscodeInput {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

impl fmt::Debug for TranscodeInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscodeInput")
            .field("name", &self.name)
            .field("bytes", &format_args!("[{} bytes]", self.bytes.len()))
            .finish()
    }
}

/// Progress callback receiving a percentage in `[0, 100]`.
pub type ProgressFn = Arc<dyn Fn(f32) + Send + Sync>;

/// Opaque audio/video transcoding collaborator.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn run_transcode(
        &self,
        inputs: Vec<TranscodeInput>,
        argv: Vec<String>,
        output_name: &str,
        on_progress: Option<ProgressFn>,
    ) -> ToolResult<Vec<u8>>;
}

/// Reject names that could escape the working directory.
pub fn check_file_name(field: &str, name: &str) -> ToolResult<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if bad {
        return Err(ToolError::validation(
            field,
            "must be a plain file name without path separators",
            name,
        ));
    }
    Ok(())
}

/// Runs an ffmpeg-compatible binary as a subprocess.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    binary: PathBuf,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn run_transcode(
        &self,
        inputs: Vec<TranscodeInput>,
        argv: Vec<String>,
        output_name: &str,
        on_progress: Option<ProgressFn>,
    ) -> ToolResult<Vec<u8>> {
        for input in &inputs {
            check_file_name("input name", &input.name)?;
        }
        check_file_name("output name", output_name)?;

        let binary = self.binary.clone();
        let output_name = output_name.to_string();
        spawn_blocking(move || run_blocking(&binary, inputs, &argv, &output_name, on_progress)).await?
    }
}

fn run_blocking(
    binary: &Path,
    inputs: Vec<TranscodeInput>,
    argv: &[String],
    output_name: &str,
    on_progress: Option<ProgressFn>,
) -> ToolResult<Vec<u8>> {
    let workdir = tempfile::tempdir().map_err(|e| ToolError::io("create transcode workdir", e))?;
    for input in &inputs {
        let path = workdir.path().join(&input.name);
        std::fs::write(&path, &input.bytes)
            .map_err(|e| ToolError::io("write transcode input", e).with_path(path.display().to_string()))?;
    }
    drop(inputs);

    info!(binary = %binary.display(), args = argv.len(), "starting transcoder");
    let mut child = Command::new(binary)
        .args(argv)
        .current_dir(workdir.path())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            ToolError::io("spawn transcoder", e)
                .with_path(binary.display().to_string())
                .with_recovery_suggestion("Ensure ffmpeg is installed and on PATH")
        })?;

    let mut tail = VecDeque::with_capacity(STDERR_TAIL);
    if let Some(stderr) = child.stderr.take() {
        let mut parser = ProgressParser::default();
        let read = for_each_line(stderr, |line| {
            if let Some(pct) = parser.feed(line) {
                if let Some(callback) = &on_progress {
                    callback(pct);
                }
            }
            if tail.len() == STDERR_TAIL {
                tail.pop_front();
            }
            tail.push_back(line.to_string());
        });
        if let Err(e) = read {
            reap(&mut child);
            return Err(ToolError::io("read transcoder stderr", e));
        }
    }

    let status = child
        .wait()
        .map_err(|e| ToolError::io("wait for transcoder", e))?;
    if !status.success() {
        let log = tail.into_iter().collect::<Vec<_>>().join("\n");
        return Err(ToolError::processing(
            "transcode",
            format!("{} exited with {}", binary.display(), status),
        )
        .with_context(log));
    }

    let output = workdir.path().join(output_name);
    let bytes = std::fs::read(&output).map_err(|e| {
        ToolError::io("read transcode output", e).with_path(output_name.to_string())
    })?;
    if let Some(callback) = &on_progress {
        callback(100.0);
    }
    debug!(output = output_name, size = bytes.len(), "transcoder finished");
    Ok(bytes)
}

/// Kill and wait on a child that is being abandoned so it leaves no zombie.
fn reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!(error = %e, "transcoder already exited");
    }
    if let Err(e) = child.wait() {
        warn!(error = %e, "failed to reap transcoder");
    }
}

/// Split a byte stream on `\r` or `\n`; ffmpeg redraws its status line with `\r`.
fn for_each_line(mut reader: impl Read, mut f: impl FnMut(&str)) -> std::io::Result<()> {
    let mut buf = [0u8; 4096];
    let mut line = Vec::new();
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        for &byte in &buf[..n] {
            if byte == b'\r' || byte == b'\n' {
                if !line.is_empty() {
                    f(&String::from_utf8_lossy(&line));
                    line.clear();
                }
            } else {
                line.push(byte);
            }
        }
    }
    if !line.is_empty() {
        f(&String::from_utf8_lossy(&line));
    }
    Ok(())
}

/// Tracks total duration and reports percentage from `time=` updates.
#[derive(Debug, Default)]
struct ProgressParser {
    duration_secs: Option<f64>,
}

impl ProgressParser {
    fn feed(&mut self, line: &str) -> Option<f32> {
        if self.duration_secs.is_none() {
            if let Some(rest) = line.trim_start().strip_prefix("Duration:") {
                self.duration_secs = parse_timestamp(rest.trim_start()).filter(|d| *d > 0.0);
                return None;
            }
        }
        let total = self.duration_secs?;
        let at = line.find("time=")?;
        let elapsed = parse_timestamp(&line[at + 5..])?;
        Some(((elapsed / total) * 100.0).clamp(0.0, 100.0) as f32)
    }
}

/// Parse a leading `HH:MM:SS(.frac)` timestamp.
fn parse_timestamp(text: &str) -> Option<f64> {
    let stamp: String = text
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ':' || *c == '.')
        .collect();
    let mut parts = stamp.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("00:01:30.50, start: 0"), Some(90.5));
        assert_eq!(parse_timestamp("01:00:00"), Some(3600.0));
        assert_eq!(parse_timestamp("N/A"), None);
    }

    #[test]
    fn test_progress_parser() {
        let mut parser = ProgressParser::default();
        assert_eq!(parser.feed("frame=1 time=00:00:01.00"), None);
        assert_eq!(parser.feed("  Duration: 00:00:10.00, start: 0.000000, bitrate: 128 kb/s"), None);
        assert_eq!(parser.feed("size=1kB time=00:00:05.00 bitrate=1.6kbits/s"), Some(50.0));
        assert_eq!(parser.feed("size=2kB time=00:00:12.00"), Some(100.0));
    }

    #[test]
    fn test_line_splitting_on_carriage_returns() {
        let mut lines = Vec::new();
        for_each_line(&b"a\r\nb\rc\n\nd"[..], |l| lines.push(l.to_string())).unwrap();
        assert_eq!(lines, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_file_names_checked() {
        assert!(check_file_name("input name", "clip.mp4").is_ok());
        assert!(check_file_name("input name", "../clip.mp4").is_err());
        assert!(check_file_name("input name", "a\\b").is_err());
        assert!(check_file_name("output name", "").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_subprocess_roundtrip_with_cp() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress: ProgressFn = Arc::new(move |pct| sink.lock().unwrap().push(pct));

        let output = FfmpegTranscoder::new("cp")
            .run_transcode(
                vec![TranscodeInput::new("in.bin", b"payload".to_vec())],
                vec!["in.bin".to_string(), "out.bin".to_string()],
                "out.bin",
                Some(progress),
            )
            .await
            .unwrap();

        assert_eq!(output, b"payload");
        assert_eq!(seen.lock().unwrap().last(), Some(&100.0));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_binary_is_processing_error() {
        let err = FfmpegTranscoder::new("false")
            .run_transcode(vec![], vec![], "out.bin", None)
            .await
            .unwrap_err();
        assert_eq!(err.category(), "processing");
    }

    #[cfg(unix)]
    #[test]
    fn test_abandoned_child_is_reaped() {
        let mut child = Command::new("sleep")
            .arg("30")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        reap(&mut child);

        assert!(child.try_wait().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missing_binary_is_io_error() {
        let err = FfmpegTranscoder::new("/nonexistent/toolbench-ffmpeg")
            .run_transcode(vec![], vec![], "out.bin", None)
            .await
            .unwrap_err();
        assert_eq!(err.category(), "io");
    }

    #[tokio::test]
    async fn test_path_traversal_rejected_before_spawn() {
        let err = FfmpegTranscoder::default()
            .run_transcode(vec![TranscodeInput::new("../x", vec![])], vec![], "out", None)
            .await
            .unwrap_err();
        assert_eq!(err.category(), "validation");
    }
}
