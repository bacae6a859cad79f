//! FFprobe source inspection.

use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

/// Probed facts about a video file.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaProbe {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Duration in seconds
    pub duration_secs: f64,
    /// Video codec name
    pub video_codec: String,
    /// Audio codec name, absent for silent clips
    pub audio_codec: Option<String>,
    /// File size in bytes
    pub size_bytes: u64,
}

impl MediaProbe {
    /// Duration expressed in whole milliseconds, for progress math.
    pub fn duration_ms(&self) -> i64 {
        (self.duration_secs * 1000.0) as i64
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Probe a video file.
pub async fn probe(path: impl AsRef<Path>) -> MediaResult<MediaProbe> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("probe of {} failed", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)?;
    interpret(parsed)
}

fn interpret(parsed: ProbeOutput) -> MediaResult<MediaProbe> {
    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::InvalidVideo("no video stream".to_string()))?;

    let audio_codec = parsed
        .streams
        .iter()
        .find(|s| s.codec_type == "audio")
        .and_then(|s| s.codec_name.clone());

    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(MediaError::InvalidVideo("missing dimensions".to_string())),
    };

    let duration_secs = parsed
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let size_bytes = parsed
        .format
        .size
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    Ok(MediaProbe {
        width,
        height,
        duration_secs,
        video_codec: video.codec_name.clone().unwrap_or_default(),
        audio_codec,
        size_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> MediaResult<MediaProbe> {
        interpret(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_interpret_full_output() {
        let probe = parse(
            r#"{
                "format": {"duration": "20.5", "size": "1048576"},
                "streams": [
                    {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080},
                    {"codec_type": "audio", "codec_name": "aac"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(probe.width, 1920);
        assert_eq!(probe.height, 1080);
        assert_eq!(probe.video_codec, "h264");
        assert_eq!(probe.audio_codec.as_deref(), Some("aac"));
        assert_eq!(probe.duration_ms(), 20500);
        assert_eq!(probe.size_bytes, 1048576);
    }

    #[test]
    fn test_interpret_silent_video() {
        let probe = parse(
            r#"{
                "format": {"duration": "3.0"},
                "streams": [
                    {"codec_type": "video", "codec_name": "vp9", "width": 720, "height": 720}
                ]
            }"#,
        )
        .unwrap();
        assert!(probe.audio_codec.is_none());
    }

    #[test]
    fn test_interpret_rejects_audio_only() {
        let result = parse(
            r#"{
                "format": {"duration": "3.0"},
                "streams": [{"codec_type": "audio", "codec_name": "mp3"}]
            }"#,
        );
        assert!(matches!(result, Err(MediaError::InvalidVideo(_))));
    }
}
