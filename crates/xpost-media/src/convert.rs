//! Per-platform transcoding.
//!
//! Source videos of arbitrary aspect ratio are fitted to the platform's
//! target frame by scaling to cover and center-cropping the overflow, so
//! the output always has the exact target dimensions.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use xpost_models::PlatformSpec;

use crate::command::{run_transcode, TranscodeCommand};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe;

/// Upper bound on a single transcode run.
const TRANSCODE_TIMEOUT_SECS: u64 = 600;

/// Result of a platform transcode.
#[derive(Debug, Clone)]
pub struct ConvertOutcome {
    /// Path of the produced file
    pub output: PathBuf,
    /// Set when the source runs longer than the platform allows; the file is
    /// still produced and the platform may reject it at publish time.
    pub duration_warning: Option<String>,
}

/// Scale-to-cover dimensions: the smallest frame that is at least the target
/// size in both axes while preserving the source aspect ratio. Rounded up to
/// even values for the encoder.
pub fn cover_dimensions(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> (u32, u32) {
    let scale = f64::max(
        dst_w as f64 / src_w as f64,
        dst_h as f64 / src_h as f64,
    );
    let w = round_up_even((src_w as f64 * scale).ceil() as u32).max(dst_w);
    let h = round_up_even((src_h as f64 * scale).ceil() as u32).max(dst_h);
    (w, h)
}

fn round_up_even(v: u32) -> u32 {
    if v % 2 == 0 {
        v
    } else {
        v + 1
    }
}

/// Build the scale + center-crop filter chain for one platform frame.
pub fn build_filter(src_w: u32, src_h: u32, spec: &PlatformSpec) -> String {
    let (scaled_w, scaled_h) = cover_dimensions(src_w, src_h, spec.width, spec.height);
    let crop_x = (scaled_w - spec.width) / 2;
    let crop_y = (scaled_h - spec.height) / 2;
    format!(
        "scale={}:{},crop={}:{}:{}:{},setsar=1",
        scaled_w, scaled_h, spec.width, spec.height, crop_x, crop_y
    )
}

/// Transcode `source` into the platform's exact frame, codecs and bitrate.
///
/// The output is written under `out_dir` as `{platform}.mp4`. The produced
/// file is re-probed and the run fails if the dimensions are off target.
/// `on_progress` receives 0-100 encode percentages.
pub async fn convert_for_platform<F>(
    source: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    spec: &PlatformSpec,
    on_progress: F,
) -> MediaResult<ConvertOutcome>
where
    F: Fn(u8) + Send + 'static,
{
    let source = source.as_ref();
    let src_probe = probe(source).await?;

    let duration_warning = if src_probe.duration_secs > spec.max_duration_secs {
        let msg = format!(
            "source runs {:.1}s, {} allows {}s",
            src_probe.duration_secs,
            spec.platform.as_str(),
            spec.max_duration_secs
        );
        warn!("{}", msg);
        Some(msg)
    } else {
        None
    };

    let output = out_dir
        .as_ref()
        .join(format!("{}.mp4", spec.platform.as_str()));

    let cmd = TranscodeCommand::new(source, &output)
        .video_filter(build_filter(src_probe.width, src_probe.height, spec))
        .video_codec(spec.video_codec)
        .video_bitrate_kbps(spec.video_bitrate_kbps)
        .audio_codec(spec.audio_codec)
        .output_arg("-movflags")
        .output_arg("+faststart");

    run_transcode(&cmd, src_probe.duration_ms(), TRANSCODE_TIMEOUT_SECS, on_progress).await?;

    let out_probe = probe(&output).await?;
    if out_probe.width != spec.width || out_probe.height != spec.height {
        return Err(MediaError::DimensionMismatch {
            target_width: spec.width,
            target_height: spec.height,
            actual_width: out_probe.width,
            actual_height: out_probe.height,
        });
    }

    info!(
        platform = spec.platform.as_str(),
        output = %output.display(),
        "transcode finished"
    );

    Ok(ConvertOutcome {
        output,
        duration_warning,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use xpost_models::Platform;

    fn portrait_spec() -> PlatformSpec {
        Platform::Instagram.spec()
    }

    #[test]
    fn test_cover_landscape_into_portrait() {
        // 1920x1080 into 1080x1920: height drives the scale
        let (w, h) = cover_dimensions(1920, 1080, 1080, 1920);
        assert_eq!(h, 1920);
        assert!(w >= 1080);
        // aspect preserved within rounding
        assert!((w as f64 / h as f64 - 1920.0 / 1080.0).abs() < 0.01);
    }

    #[test]
    fn test_cover_portrait_source_exact_fit() {
        let (w, h) = cover_dimensions(1080, 1920, 1080, 1920);
        assert_eq!((w, h), (1080, 1920));
    }

    #[test]
    fn test_cover_square_into_portrait() {
        let (w, h) = cover_dimensions(720, 720, 1080, 1920);
        assert_eq!(w, 1920);
        assert_eq!(h, 1920);
    }

    #[test]
    fn test_cover_never_under_target() {
        // Odd source dimensions round up even and still cover
        let (w, h) = cover_dimensions(853, 480, 1080, 1920);
        assert!(w >= 1080 && h >= 1920);
        assert_eq!(w % 2, 0);
        assert_eq!(h % 2, 0);
    }

    #[test]
    fn test_filter_centers_crop() {
        let spec = portrait_spec();
        let filter = build_filter(1920, 1080, &spec);
        // 1920x1080 scaled to cover 1080x1920 -> 3414x1920 (even-rounded),
        // crop offset centers the excess width
        assert!(filter.starts_with("scale="));
        assert!(filter.contains(",crop=1080:1920:"));
        assert!(filter.ends_with(",setsar=1"));

        let crop = filter
            .split(',')
            .find(|p| p.starts_with("crop="))
            .unwrap()
            .trim_start_matches("crop=");
        let parts: Vec<u32> = crop.split(':').map(|p| p.parse().unwrap()).collect();
        let (scaled_w, _) = cover_dimensions(1920, 1080, 1080, 1920);
        assert_eq!(parts[2], (scaled_w - 1080) / 2);
        assert_eq!(parts[3], 0);
    }

    #[test]
    fn test_filter_exact_fit_has_zero_offsets() {
        let spec = portrait_spec();
        let filter = build_filter(1080, 1920, &spec);
        assert!(filter.contains("crop=1080:1920:0:0"));
    }
}
