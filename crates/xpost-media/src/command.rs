//! FFmpeg invocation with progress reporting.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Arguments for a single transcode run.
#[derive(Debug, Clone)]
pub struct TranscodeCommand {
    input: PathBuf,
    output: PathBuf,
    /// -vf filter chain
    video_filter: Option<String>,
    video_codec: Option<String>,
    audio_codec: Option<String>,
    /// -b:v in kbit/s
    video_bitrate_kbps: Option<u32>,
    extra_output_args: Vec<String>,
}

impl TranscodeCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            video_filter: None,
            video_codec: None,
            audio_codec: None,
            video_bitrate_kbps: None,
            extra_output_args: Vec::new(),
        }
    }

    pub fn video_filter(mut self, filter: impl Into<String>) -> Self {
        self.video_filter = Some(filter.into());
        self
    }

    pub fn video_codec(mut self, codec: impl Into<String>) -> Self {
        self.video_codec = Some(codec.into());
        self
    }

    pub fn audio_codec(mut self, codec: impl Into<String>) -> Self {
        self.audio_codec = Some(codec.into());
        self
    }

    pub fn video_bitrate_kbps(mut self, kbps: u32) -> Self {
        self.video_bitrate_kbps = Some(kbps);
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_output_args.push(arg.into());
        self
    }

    /// Assemble the full argument vector.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-v".to_string(),
            "error".to_string(),
            // Machine-readable progress on stderr
            "-progress".to_string(),
            "pipe:2".to_string(),
            "-i".to_string(),
            self.input.to_string_lossy().to_string(),
        ];

        if let Some(ref filter) = self.video_filter {
            args.push("-vf".to_string());
            args.push(filter.clone());
        }
        if let Some(ref codec) = self.video_codec {
            args.push("-c:v".to_string());
            args.push(codec.clone());
        }
        if let Some(kbps) = self.video_bitrate_kbps {
            args.push("-b:v".to_string());
            args.push(format!("{}k", kbps));
        }
        if let Some(ref codec) = self.audio_codec {
            args.push("-c:a".to_string());
            args.push(codec.clone());
        }
        args.extend(self.extra_output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());
        args
    }
}

/// Run FFmpeg, translating its time-elapsed output into integer percentages
/// against the probed total duration.
///
/// `on_progress` is invoked with 0-100 values; duplicates are suppressed.
pub async fn run_transcode<F>(
    cmd: &TranscodeCommand,
    total_duration_ms: i64,
    timeout_secs: u64,
    on_progress: F,
) -> MediaResult<()>
where
    F: Fn(u8) + Send + 'static,
{
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

    let args = cmd.build_args();
    debug!("running ffmpeg {}", args.join(" "));

    let mut child = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| MediaError::ffmpeg_failed("stderr not captured", None, None))?;
    let mut lines = BufReader::new(stderr).lines();

    let progress_task = tokio::spawn(async move {
        let mut out_time_ms: i64 = 0;
        let mut last_reported: i16 = -1;
        let mut tail: Vec<String> = Vec::new();

        while let Ok(Some(line)) = lines.next_line().await {
            match parse_progress_line(&line) {
                Some(ProgressLine::OutTimeMs(ms)) => out_time_ms = ms,
                Some(ProgressLine::Tick) => {
                    let pct = percentage(out_time_ms, total_duration_ms);
                    if i16::from(pct) > last_reported {
                        last_reported = i16::from(pct);
                        on_progress(pct);
                    }
                }
                None => {
                    // Not a progress key/value; keep the last few lines for
                    // error context.
                    if tail.len() >= 20 {
                        tail.remove(0);
                    }
                    tail.push(line);
                }
            }
        }
        tail.join("\n")
    });

    let status = match tokio::time::timeout(
        std::time::Duration::from_secs(timeout_secs),
        child.wait(),
    )
    .await
    {
        Ok(result) => result?,
        Err(_) => {
            warn!("ffmpeg timed out after {}s, killing process", timeout_secs);
            let _ = child.kill().await;
            return Err(MediaError::Timeout(timeout_secs));
        }
    };

    let stderr_tail = progress_task.await.unwrap_or_default();

    if status.success() {
        Ok(())
    } else {
        Err(MediaError::ffmpeg_failed(
            "ffmpeg exited with non-zero status",
            if stderr_tail.is_empty() {
                None
            } else {
                Some(stderr_tail)
            },
            status.code(),
        ))
    }
}

enum ProgressLine {
    OutTimeMs(i64),
    /// End of one progress block ("progress=continue" or "progress=end")
    Tick,
}

fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_ms" | "out_time_us" => {
            // Both keys are in microseconds in modern FFmpeg builds.
            let us: i64 = value.parse().ok()?;
            Some(ProgressLine::OutTimeMs(us / 1000))
        }
        "progress" => Some(ProgressLine::Tick),
        _ if is_progress_key(key) => None,
        _ => None,
    }
}

fn is_progress_key(key: &str) -> bool {
    matches!(
        key,
        "frame" | "fps" | "stream_0_0_q" | "bitrate" | "total_size" | "out_time" | "dup_frames" | "drop_frames" | "speed"
    )
}

fn percentage(out_time_ms: i64, total_ms: i64) -> u8 {
    if total_ms <= 0 {
        return 0;
    }
    (((out_time_ms as f64 / total_ms as f64) * 100.0).min(100.0)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args_order() {
        let cmd = TranscodeCommand::new("in.mp4", "out.mp4")
            .video_filter("scale=1080:1920")
            .video_codec("libx264")
            .video_bitrate_kbps(8000)
            .audio_codec("aac")
            .output_arg("-movflags")
            .output_arg("+faststart");

        let args = cmd.build_args();
        assert_eq!(args[0], "-y");
        assert!(args.contains(&"-vf".to_string()));
        assert!(args.contains(&"8000k".to_string()));
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], "in.mp4");
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[test]
    fn test_parse_out_time() {
        match parse_progress_line("out_time_us=5000000") {
            Some(ProgressLine::OutTimeMs(ms)) => assert_eq!(ms, 5000),
            _ => panic!("expected OutTimeMs"),
        }
        assert!(matches!(
            parse_progress_line("progress=continue"),
            Some(ProgressLine::Tick)
        ));
        assert!(parse_progress_line("random stderr noise").is_none());
    }

    #[test]
    fn test_percentage_math() {
        assert_eq!(percentage(5000, 10000), 50);
        assert_eq!(percentage(20000, 10000), 100);
        assert_eq!(percentage(100, 0), 0);
    }
}
