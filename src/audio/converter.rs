// Audiobook Processor - folder to chaptered M4B converter
// Copyright (C) 2026 The Audiobook Processor Authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Transcoder subprocess supervision
//!
//! Every external tool call goes through one supervisor:
//! - stdin is null, stdout and stderr are piped
//! - stdout is drained by one task, stderr by another
//! - stderr lines are forwarded through a bounded channel and consumed here,
//!   where progress lines turn into statuses and the tail is kept for errors
//! - the child is killed if the future is dropped
//!
//! # Commands
//! - Convert: `ffmpeg -i in -c:a aac -b:a 128k -vn -y out`
//! - Combine: `ffmpeg -f concat -safe 0 -i manifest -c:a aac -b:a 128k -vn -f mp4 -y out`
//! - Embed: `ffmpeg -i in -i chapters -map 0 -map_metadata 1 -codec copy -y out`
//! - Probe: `ffprobe -v quiet -print_format json -show_format -show_streams in`

use crate::config::{ProcessorOptions, ToolPaths};
use crate::error::{ProcessorError, Result};
use crate::progress::{ProgressEstimator, ProgressSink, SharedSink};
use regex::Regex;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Capacity of the stderr line channel
const STDERR_CHANNEL_CAPACITY: usize = 64;

/// Number of trailing stderr lines kept for error reports
const DIAGNOSTIC_TAIL_LINES: usize = 20;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Parse the media position out of an ffmpeg status line
///
/// Matches `time=HH:MM:SS(.ff)` anywhere in the line. Negative positions,
/// which ffmpeg prints while priming, clamp to zero. Lines without a
/// position (including `time=N/A`) return `None`.
pub fn parse_progress_time(line: &str) -> Option<Duration> {
    static PROGRESS_TIME: OnceLock<Option<Regex>> = OnceLock::new();

    let regex = PROGRESS_TIME
        .get_or_init(|| Regex::new(r"time=\s*(-?)(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").ok())
        .as_ref()?;

    let caps = regex.captures(line)?;
    let hours: f64 = caps[2].parse().ok()?;
    let minutes: f64 = caps[3].parse().ok()?;
    let seconds: f64 = caps[4].parse().ok()?;

    if &caps[1] == "-" {
        return Some(Duration::ZERO);
    }

    Duration::try_from_secs_f64(hours * 3600.0 + minutes * 60.0 + seconds).ok()
}

/// Concat demuxer manifest for a combine run
///
/// Lives in the base directory because the demuxer resolves entries relative
/// to the manifest's own location.
#[derive(Debug)]
pub struct ConcatManifest {
    path: PathBuf,
}

impl ConcatManifest {
    /// Render manifest lines for `inputs`, relative to `base_dir`
    ///
    /// Inputs outside `base_dir` are written as absolute paths.
    pub fn render(inputs: &[PathBuf], base_dir: &Path) -> String {
        let mut content = String::new();

        for input in inputs {
            let entry = match input.strip_prefix(base_dir) {
                Ok(relative) => to_forward_slashes(relative),
                Err(_) => input.to_string_lossy().into_owned(),
            };
            content.push_str(&format!("file '{}'\n", entry.replace('\'', r"'\''")));
        }

        content
    }

    /// Write a uniquely named manifest into `base_dir`
    pub async fn write(inputs: &[PathBuf], base_dir: &Path) -> Result<Self> {
        let path = base_dir.join(format!(".audiobook-concat-{}.txt", Uuid::new_v4()));

        fs::write(&path, Self::render(inputs, base_dir))
            .await
            .map_err(|e| {
                ProcessorError::file_io(format!(
                    "Failed to write concat list {}: {}",
                    path.display(),
                    e
                ))
            })?;

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the manifest, logging rather than failing
    pub async fn remove(self) {
        match fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!("Failed to remove concat list {}: {}", self.path.display(), e);
            }
        }
    }
}

fn to_forward_slashes(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Invokes ffmpeg and ffprobe
#[derive(Debug, Clone)]
pub struct Transcoder {
    tools: ToolPaths,
    audio_codec: String,
    audio_bitrate: String,
}

impl Transcoder {
    pub fn new(options: &ProcessorOptions) -> Self {
        Self {
            tools: options.tools.clone(),
            audio_codec: options.audio_codec.clone(),
            audio_bitrate: options.audio_bitrate.clone(),
        }
    }

    /// Re-encode a single file
    pub async fn convert(
        &self,
        input: &Path,
        output: &Path,
        total: Duration,
        sink: &SharedSink,
    ) -> Result<()> {
        let args = self.convert_args(input, output);
        self.run_ffmpeg(args, None, total, Some(sink)).await.map(|_| ())
    }

    /// Concatenate `inputs` (in order) and re-encode into one MP4 stream
    pub async fn combine(
        &self,
        inputs: &[PathBuf],
        base_dir: &Path,
        output: &Path,
        total: Duration,
        sink: &SharedSink,
    ) -> Result<()> {
        // The tool runs inside base_dir, so relative paths would resolve there
        let output = std::path::absolute(output)?;
        let manifest = ConcatManifest::write(inputs, base_dir).await?;
        let manifest_arg = manifest
            .path()
            .file_name()
            .map(Path::new)
            .unwrap_or_else(|| manifest.path());
        let args = self.combine_args(manifest_arg, &output);

        let result = self
            .run_ffmpeg(args, Some(base_dir), total, Some(sink))
            .await;

        manifest.remove().await;
        result.map(|_| ())
    }

    /// Copy streams and apply chapters plus global metadata from an ffmetadata file
    pub async fn embed_chapters(
        &self,
        input: &Path,
        chapter_file: &Path,
        output: &Path,
    ) -> Result<()> {
        let args = embed_args(input, chapter_file, output);
        self.run_ffmpeg(args, None, Duration::ZERO, None)
            .await
            .map(|_| ())
    }

    /// Raw ffprobe JSON for a file
    pub async fn probe(&self, input: &Path) -> Result<String> {
        let args: Vec<OsString> = ["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"]
            .iter()
            .map(OsString::from)
            .chain(std::iter::once(input.as_os_str().to_owned()))
            .collect();

        run("ffprobe", &self.tools.ffprobe, &args, None, None).await
    }

    fn convert_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args = vec![OsString::from("-i"), input.as_os_str().to_owned()];
        args.extend(self.encoder_args());
        args.push("-y".into());
        args.push(output.as_os_str().to_owned());
        args
    }

    fn combine_args(&self, manifest: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-f", "concat", "-safe", "0", "-i"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push(manifest.as_os_str().to_owned());
        args.extend(self.encoder_args());
        args.extend(["-f", "mp4", "-y"].iter().map(OsString::from));
        args.push(output.as_os_str().to_owned());
        args
    }

    fn encoder_args(&self) -> Vec<OsString> {
        vec![
            "-c:a".into(),
            self.audio_codec.as_str().into(),
            "-b:a".into(),
            self.audio_bitrate.as_str().into(),
            "-vn".into(),
        ]
    }

    async fn run_ffmpeg(
        &self,
        args: Vec<OsString>,
        cwd: Option<&Path>,
        total: Duration,
        sink: Option<&SharedSink>,
    ) -> Result<String> {
        let progress = sink
            .filter(|_| !total.is_zero())
            .map(|sink| (ProgressEstimator::new(total), sink));

        run("ffmpeg", &self.tools.ffmpeg, &args, cwd, progress).await
    }
}

fn embed_args(input: &Path, chapter_file: &Path, output: &Path) -> Vec<OsString> {
    let mut args = vec![OsString::from("-i"), input.as_os_str().to_owned()];
    args.push("-i".into());
    args.push(chapter_file.as_os_str().to_owned());
    args.extend(
        ["-map", "0", "-map_metadata", "1", "-codec", "copy", "-y"]
            .iter()
            .map(OsString::from),
    );
    args.push(output.as_os_str().to_owned());
    args
}

/// Spawn a tool, supervise both output streams and wait for it to exit
///
/// Resolves with captured stdout on exit code 0.
async fn run(
    tool: &str,
    program: &Path,
    args: &[OsString],
    cwd: Option<&Path>,
    progress: Option<(ProgressEstimator, &SharedSink)>,
) -> Result<String> {
    tracing::info!("Running {} ({})", tool, program.display());
    tracing::debug!("{} args: {:?}", tool, args);

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    #[cfg(windows)]
    command.creation_flags(CREATE_NO_WINDOW);

    let mut child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ProcessorError::ToolNotFound(tool.to_string())
        } else {
            ProcessorError::file_io(format!("Failed to start {}: {}", tool, e))
        }
    })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ProcessorError::internal(format!("Failed to capture {} stdout", tool)))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| ProcessorError::internal(format!("Failed to capture {} stderr", tool)))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let mut reader = BufReader::new(stdout);
        reader.read_to_end(&mut buf).await?;
        Ok::<_, std::io::Error>(buf)
    });

    let (tx, mut rx) = mpsc::channel::<String>(STDERR_CHANNEL_CAPACITY);
    let stderr_task = tokio::spawn(forward_lines(stderr, tx));

    let mut tail: VecDeque<String> = VecDeque::with_capacity(DIAGNOSTIC_TAIL_LINES);
    while let Some(line) = rx.recv().await {
        if let Some((estimator, sink)) = &progress {
            match parse_progress_time(&line) {
                Some(elapsed) => {
                    if let Some(status) = estimator.update(elapsed) {
                        sink.report(status);
                    }
                }
                None => tracing::debug!("{}: {}", tool, line),
            }
        }

        if tail.len() == DIAGNOSTIC_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    let stdout = stdout_task
        .await
        .map_err(|e| ProcessorError::internal(format!("{} stdout reader failed: {}", tool, e)))??;
    stderr_task
        .await
        .map_err(|e| ProcessorError::internal(format!("{} stderr reader failed: {}", tool, e)))??;

    let status = child.wait().await?;

    if !status.success() {
        let diagnostics = tail.into_iter().collect::<Vec<_>>().join("\n");
        tracing::debug!("{} exited with {}", tool, status);
        return Err(ProcessorError::TranscodeError {
            tool: tool.to_string(),
            exit_code: status.code(),
            diagnostics,
        });
    }

    Ok(String::from_utf8_lossy(&stdout).into_owned())
}

/// Forward lines from `reader` into `tx`
///
/// Both `\n` and `\r` end a line, since ffmpeg rewrites its status line in
/// place with carriage returns. Empty lines are dropped.
async fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut pending: Vec<u8> = Vec::new();

    loop {
        let mut complete = Vec::new();
        let consumed = {
            let buf = reader.fill_buf().await?;
            if buf.is_empty() {
                break;
            }
            for &byte in buf {
                if byte == b'\n' || byte == b'\r' {
                    if !pending.is_empty() {
                        complete.push(String::from_utf8_lossy(&pending).into_owned());
                        pending.clear();
                    }
                } else {
                    pending.push(byte);
                }
            }
            buf.len()
        };
        reader.consume(consumed);

        for line in complete {
            if tx.send(line).await.is_err() {
                return Ok(());
            }
        }
    }

    if !pending.is_empty() {
        let _ = tx.send(String::from_utf8_lossy(&pending).into_owned()).await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{ProcessingPhase, ProcessingStatus};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_parse_progress_time() {
        assert_eq!(
            parse_progress_time("size=  512kB time=00:01:05.50 bitrate= 64.0kbits/s"),
            Some(Duration::from_millis(65_500))
        );
        assert_eq!(
            parse_progress_time("time=01:00:00"),
            Some(Duration::from_secs(3600))
        );
        assert_eq!(
            parse_progress_time("size=0kB time= 00:00:02.00 bitrate=N/A"),
            Some(Duration::from_secs(2))
        );
    }

    #[test]
    fn test_parse_progress_time_negative_clamps_to_zero() {
        assert_eq!(
            parse_progress_time("size=0kB time=-00:00:00.04 bitrate=N/A"),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_parse_progress_time_ignores_other_lines() {
        assert_eq!(parse_progress_time("size=0kB time=N/A bitrate=N/A"), None);
        assert_eq!(parse_progress_time("Stream #0:0: Audio: mp3, 44100 Hz"), None);
        assert_eq!(parse_progress_time(""), None);
    }

    #[test]
    fn test_parse_progress_time_ignores_out_of_range_positions() {
        assert_eq!(
            parse_progress_time("size=1kB time=99999999999999999999:00:00.00 bitrate=1k"),
            None
        );
    }

    #[test]
    fn test_manifest_uses_relative_forward_slash_paths() {
        let base = Path::new("/books/Dune");
        let inputs = vec![
            base.join("01.mp3"),
            base.join("Disc 2").join("02.mp3"),
            base.join("Paul's Story.mp3"),
        ];

        let content = ConcatManifest::render(&inputs, base);
        assert_eq!(
            content,
            "file '01.mp3'\nfile 'Disc 2/02.mp3'\nfile 'Paul'\\''s Story.mp3'\n"
        );
    }

    #[test]
    fn test_argument_lists() {
        let transcoder = Transcoder::new(&ProcessorOptions::with_tools(ToolPaths::new(
            "ffmpeg", "ffprobe",
        )));

        let convert = transcoder.convert_args(Path::new("in.mp3"), Path::new("out.m4b"));
        assert_eq!(
            convert,
            ["-i", "in.mp3", "-c:a", "aac", "-b:a", "128k", "-vn", "-y", "out.m4b"]
                .iter()
                .map(OsString::from)
                .collect::<Vec<_>>()
        );

        let combine = transcoder.combine_args(Path::new("list.txt"), Path::new("combined.mp4"));
        assert_eq!(
            combine,
            [
                "-f", "concat", "-safe", "0", "-i", "list.txt", "-c:a", "aac", "-b:a", "128k",
                "-vn", "-f", "mp4", "-y", "combined.mp4"
            ]
            .iter()
            .map(OsString::from)
            .collect::<Vec<_>>()
        );

        let embed = embed_args(Path::new("combined.mp4"), Path::new("ch.txt"), Path::new("b.m4b"));
        assert_eq!(
            embed,
            [
                "-i", "combined.mp4", "-i", "ch.txt", "-map", "0", "-map_metadata", "1",
                "-codec", "copy", "-y", "b.m4b"
            ]
            .iter()
            .map(OsString::from)
            .collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_forward_lines_splits_on_carriage_returns() {
        let input: &[u8] = b"first\rsecond\r\nthird\n\nlast";
        let (tx, mut rx) = mpsc::channel(STDERR_CHANNEL_CAPACITY);

        forward_lines(input, tx).await.unwrap();

        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }
        assert_eq!(lines, vec!["first", "second", "third", "last"]);
    }

    #[cfg(unix)]
    mod subprocess {
        use super::*;
        use crate::test_support::{fake_tools, options};
        use tempfile::TempDir;

        fn collecting_sink() -> (SharedSink, Arc<Mutex<Vec<ProcessingStatus>>>) {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let captured = seen.clone();
            let sink: SharedSink = Arc::new(move |status: ProcessingStatus| {
                captured.lock().unwrap().push(status);
            });
            (sink, seen)
        }

        #[tokio::test]
        async fn test_convert_reports_progress() {
            let temp = TempDir::new().unwrap();
            let input = temp.path().join("book.mp3");
            let output = temp.path().join("book.m4b");
            std::fs::write(&input, "60\n").unwrap();

            let transcoder = Transcoder::new(&options(fake_tools().ok(), temp.path()));
            let (sink, seen) = collecting_sink();

            transcoder
                .convert(&input, &output, Duration::from_secs(60), &sink)
                .await
                .unwrap();

            assert_eq!(std::fs::read_to_string(&output).unwrap(), "fake-m4b");

            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 1);
            assert_eq!(seen[0].phase, ProcessingPhase::Processing);
            assert!((seen[0].percentage - 500.0 / 60.0).abs() < 1e-6);
        }

        #[tokio::test]
        async fn test_no_progress_without_total() {
            let temp = TempDir::new().unwrap();
            let input = temp.path().join("book.mp3");
            std::fs::write(&input, "0\n").unwrap();

            let transcoder = Transcoder::new(&options(fake_tools().ok(), temp.path()));
            let (sink, seen) = collecting_sink();

            transcoder
                .convert(&input, &temp.path().join("out.m4b"), Duration::ZERO, &sink)
                .await
                .unwrap();

            assert!(seen.lock().unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_combine_writes_and_removes_manifest() {
            let temp = TempDir::new().unwrap();
            let base = temp.path().join("book");
            std::fs::create_dir_all(base.join("cd2")).unwrap();
            let inputs = vec![base.join("a.mp3"), base.join("cd2").join("b.mp3")];
            for input in &inputs {
                std::fs::write(input, "1\n").unwrap();
            }
            let output = temp.path().join("combined.mp4");

            let transcoder = Transcoder::new(&options(fake_tools().ok(), temp.path()));
            transcoder
                .combine(&inputs, &base, &output, Duration::from_secs(2), &crate::progress::noop_sink())
                .await
                .unwrap();

            // Fake ffmpeg copies the manifest into the output
            assert_eq!(
                std::fs::read_to_string(&output).unwrap(),
                "file 'a.mp3'\nfile 'cd2/b.mp3'\n"
            );
            assert!(leftover_manifests(&base).is_empty());
        }

        #[tokio::test]
        async fn test_combine_failure_removes_manifest() {
            let temp = TempDir::new().unwrap();
            let inputs = vec![temp.path().join("a.mp3"), temp.path().join("b.mp3")];

            let transcoder = Transcoder::new(&options(fake_tools().failing_ffmpeg(), temp.path()));
            let err = transcoder
                .combine(
                    &inputs,
                    temp.path(),
                    &temp.path().join("out.mp4"),
                    Duration::from_secs(2),
                    &crate::progress::noop_sink(),
                )
                .await
                .unwrap_err();

            assert!(matches!(err, ProcessorError::TranscodeError { .. }));
            assert!(leftover_manifests(temp.path()).is_empty());
        }

        #[tokio::test]
        async fn test_failure_carries_exit_code_and_diagnostics() {
            let temp = TempDir::new().unwrap();
            let transcoder = Transcoder::new(&options(fake_tools().failing_ffmpeg(), temp.path()));

            let err = transcoder
                .embed_chapters(
                    &temp.path().join("in.mp4"),
                    &temp.path().join("ch.txt"),
                    &temp.path().join("out.m4b"),
                )
                .await
                .unwrap_err();

            match err {
                ProcessorError::TranscodeError {
                    tool,
                    exit_code,
                    diagnostics,
                } => {
                    assert_eq!(tool, "ffmpeg");
                    assert_eq!(exit_code, Some(3));
                    assert!(diagnostics.contains("Invalid data found when processing input"));
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_signal_termination_has_no_exit_code() {
            let temp = TempDir::new().unwrap();
            let transcoder = Transcoder::new(&options(fake_tools().killed_ffmpeg(), temp.path()));

            let err = transcoder
                .convert(
                    &temp.path().join("in.mp3"),
                    &temp.path().join("out.m4b"),
                    Duration::from_secs(1),
                    &crate::progress::noop_sink(),
                )
                .await
                .unwrap_err();

            assert!(matches!(
                err,
                ProcessorError::TranscodeError { exit_code: None, .. }
            ));
        }

        #[tokio::test]
        async fn test_missing_tool_is_tool_not_found() {
            let temp = TempDir::new().unwrap();
            let transcoder = Transcoder::new(&options(fake_tools().missing(), temp.path()));

            let err = transcoder.probe(&temp.path().join("a.mp3")).await.unwrap_err();
            assert!(matches!(err, ProcessorError::ToolNotFound(ref tool) if tool == "ffprobe"));
        }

        #[tokio::test]
        async fn test_probe_returns_stdout() {
            let temp = TempDir::new().unwrap();
            let input = temp.path().join("a.mp3");
            std::fs::write(&input, "42\n").unwrap();

            let transcoder = Transcoder::new(&options(fake_tools().ok(), temp.path()));
            let raw = transcoder.probe(&input).await.unwrap();
            assert!(raw.contains(r#""duration":"42""#));
        }

        fn leftover_manifests(dir: &Path) -> Vec<PathBuf> {
            std::fs::read_dir(dir)
                .unwrap()
                .map(|e| e.unwrap().path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .map(|n| n.starts_with(".audiobook-concat-"))
                        .unwrap_or(false)
                })
                .collect()
        }
    }
}
