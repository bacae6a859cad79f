//! Target platforms and their encoding specs.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::tags::TagLimits;

/// An external publishing destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Instagram,
    Youtube,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Youtube => "youtube",
        }
    }

    /// All platforms a job publishes to.
    pub fn all() -> [Platform; 2] {
        [Platform::Instagram, Platform::Youtube]
    }

    /// Encoding target for this platform.
    ///
    /// Both platforms take a 9:16 vertical frame today, at different
    /// absolute resolutions.
    pub fn spec(&self) -> PlatformSpec {
        match self {
            Platform::Instagram => PlatformSpec {
                platform: *self,
                width: 1080,
                height: 1920,
                video_codec: "libx264",
                audio_codec: "aac",
                video_bitrate_kbps: 8000,
                max_duration_secs: 90.0,
            },
            Platform::Youtube => PlatformSpec {
                platform: *self,
                width: 1080,
                height: 1920,
                video_codec: "libx264",
                audio_codec: "aac",
                video_bitrate_kbps: 12000,
                max_duration_secs: 180.0,
            },
        }
    }

    /// Tag constraints enforced before handing tags to this platform.
    pub fn tag_limits(&self) -> TagLimits {
        match self {
            // Caption hashtag cap; Instagram rejects captions with more.
            Platform::Instagram => TagLimits {
                max_tag_len: 30,
                max_tags: 30,
                max_total_len: 700,
            },
            // YouTube rejects malformed tag sets outright; stay under the
            // 500-char wire cap with room for quoting overhead.
            Platform::Youtube => TagLimits {
                max_tag_len: 30,
                max_tags: 15,
                max_total_len: 400,
            },
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "instagram" => Ok(Platform::Instagram),
            "youtube" => Ok(Platform::Youtube),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}

/// Exact encoding target for one platform.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct PlatformSpec {
    pub platform: Platform,
    /// Target width in pixels
    pub width: u32,
    /// Target height in pixels
    pub height: u32,
    /// FFmpeg video codec name
    pub video_codec: &'static str,
    /// FFmpeg audio codec name
    pub audio_codec: &'static str,
    /// Target video bitrate in kbit/s
    pub video_bitrate_kbps: u32,
    /// Platform-enforced duration ceiling; exceeding it is a warning here,
    /// the platform API rejects or reclassifies at publish time.
    pub max_duration_secs: f64,
}

impl PlatformSpec {
    /// Target aspect ratio (width / height).
    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_parse() {
        assert_eq!("instagram".parse::<Platform>().unwrap(), Platform::Instagram);
        assert_eq!("YouTube".parse::<Platform>().unwrap(), Platform::Youtube);
        assert!("tiktok".parse::<Platform>().is_err());
    }

    #[test]
    fn test_specs_are_vertical() {
        for platform in Platform::all() {
            let spec = platform.spec();
            assert!(spec.height > spec.width);
            assert!((spec.aspect() - 9.0 / 16.0).abs() < 0.001);
        }
    }

    #[test]
    fn test_serde_round_trip() {
        let json = serde_json::to_string(&Platform::Youtube).unwrap();
        assert_eq!(json, "\"youtube\"");
        let back: Platform = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Platform::Youtube);
    }
}
