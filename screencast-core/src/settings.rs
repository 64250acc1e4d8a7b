//! Streaming settings: the immutable configuration snapshot a session is
//! prepared with, plus the partial-update type used for reconfiguration.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::orientation::Orientation;

/// How the output frame is derived from the device screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AspectMode {
    /// Fixed 16:9 output at one of the enumerated resolutions (center crop).
    FixedAspect,
    /// Full device screen, rounded down to even dimensions for the encoder.
    NativeFull,
}

/// Fixed-aspect output resolutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Fhd,
    Qhd,
    Uhd4k,
}

impl Resolution {
    /// Landscape dimensions (width, height).
    #[must_use]
    pub const fn dimensions(self) -> (u32, u32) {
        match self {
            Self::Fhd => (1920, 1080),
            Self::Qhd => (2560, 1440),
            Self::Uhd4k => (3840, 2160),
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Fhd => "FHD (1920x1080)",
            Self::Qhd => "QHD (2560x1440)",
            Self::Uhd4k => "4K (3840x2160)",
        }
    }
}

/// Target frame rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum FrameRate {
    Fps15,
    Fps24,
    Fps30,
    Fps60,
}

impl FrameRate {
    #[must_use]
    pub const fn fps(self) -> u32 {
        match self {
            Self::Fps15 => 15,
            Self::Fps24 => 24,
            Self::Fps30 => 30,
            Self::Fps60 => 60,
        }
    }
}

impl TryFrom<u32> for FrameRate {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            15 => Ok(Self::Fps15),
            24 => Ok(Self::Fps24),
            30 => Ok(Self::Fps30),
            60 => Ok(Self::Fps60),
            other => Err(format!("unsupported frame rate: {other}")),
        }
    }
}

impl From<FrameRate> for u32 {
    fn from(value: FrameRate) -> Self {
        value.fps()
    }
}

/// Target video bitrates, in megabits per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Bitrate {
    Mbps5,
    Mbps8,
    Mbps10,
    Mbps15,
    Mbps20,
    Mbps25,
    Mbps30,
}

impl Bitrate {
    #[must_use]
    pub const fn megabits(self) -> u32 {
        match self {
            Self::Mbps5 => 5,
            Self::Mbps8 => 8,
            Self::Mbps10 => 10,
            Self::Mbps15 => 15,
            Self::Mbps20 => 20,
            Self::Mbps25 => 25,
            Self::Mbps30 => 30,
        }
    }

    #[must_use]
    pub const fn bits_per_sec(self) -> u64 {
        self.megabits() as u64 * 1000 * 1024
    }
}

impl TryFrom<u32> for Bitrate {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            5 => Ok(Self::Mbps5),
            8 => Ok(Self::Mbps8),
            10 => Ok(Self::Mbps10),
            15 => Ok(Self::Mbps15),
            20 => Ok(Self::Mbps20),
            25 => Ok(Self::Mbps25),
            30 => Ok(Self::Mbps30),
            other => Err(format!("unsupported bitrate: {other} Mbps")),
        }
    }
}

impl From<Bitrate> for u32 {
    fn from(value: Bitrate) -> Self {
        value.megabits()
    }
}

/// Physical screen dimensions of the capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenMetrics {
    pub width: u32,
    pub height: u32,
}

impl ScreenMetrics {
    /// Orientation implied by the raw screen dimensions.
    #[must_use]
    pub const fn orientation(self) -> Orientation {
        if self.height >= self.width {
            Orientation::Portrait
        } else {
            Orientation::Landscape
        }
    }
}

/// Immutable streaming configuration snapshot.
///
/// Serialized field names match the persisted settings-store keys
/// (`resolution`, `fps`, `bitrate`, `audio_enabled`, `use_native_res`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    #[serde(
        rename = "use_native_res",
        serialize_with = "aspect_to_bool",
        deserialize_with = "aspect_from_bool"
    )]
    pub aspect_mode: AspectMode,
    pub resolution: Resolution,
    #[serde(rename = "fps")]
    pub frame_rate: FrameRate,
    pub bitrate: Bitrate,
    pub audio_enabled: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            aspect_mode: AspectMode::FixedAspect,
            resolution: Resolution::Fhd,
            frame_rate: FrameRate::Fps30,
            bitrate: Bitrate::Mbps10,
            audio_enabled: true,
        }
    }
}

impl StreamSettings {
    /// Apply a partial update on top of this snapshot.
    #[must_use]
    pub fn merged(&self, update: &SettingsUpdate) -> Self {
        Self {
            aspect_mode: update.aspect_mode.unwrap_or(self.aspect_mode),
            resolution: update.resolution.unwrap_or(self.resolution),
            frame_rate: update.frame_rate.unwrap_or(self.frame_rate),
            bitrate: update.bitrate.unwrap_or(self.bitrate),
            audio_enabled: update.audio_enabled.unwrap_or(self.audio_enabled),
        }
    }

    /// Output dimensions for the encoder, adjusted for device orientation.
    ///
    /// Fixed-aspect resolutions are defined landscape-first; in portrait the
    /// width/height are swapped so the configured aspect is preserved.
    /// Native mode follows the physical screen and is only aligned down to
    /// even values.
    #[must_use]
    pub fn video_dimensions(&self, screen: ScreenMetrics, orientation: Orientation) -> (u32, u32) {
        match self.aspect_mode {
            AspectMode::NativeFull => (screen.width & !1, screen.height & !1),
            AspectMode::FixedAspect => {
                let (w, h) = self.resolution.dimensions();
                match orientation {
                    Orientation::Landscape => (w, h),
                    Orientation::Portrait => (h, w),
                }
            }
        }
    }
}

/// Partial settings change; `None` fields mean "unchanged".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub aspect_mode: Option<AspectMode>,
    pub resolution: Option<Resolution>,
    pub frame_rate: Option<FrameRate>,
    pub bitrate: Option<Bitrate>,
    pub audio_enabled: Option<bool>,
}

impl SettingsUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.aspect_mode.is_none()
            && self.resolution.is_none()
            && self.frame_rate.is_none()
            && self.bitrate.is_none()
            && self.audio_enabled.is_none()
    }
}

fn aspect_to_bool<S: Serializer>(mode: &AspectMode, ser: S) -> Result<S::Ok, S::Error> {
    ser.serialize_bool(matches!(mode, AspectMode::NativeFull))
}

fn aspect_from_bool<'de, D: Deserializer<'de>>(de: D) -> Result<AspectMode, D::Error> {
    let native = bool::deserialize(de)?;
    Ok(if native {
        AspectMode::NativeFull
    } else {
        AspectMode::FixedAspect
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_match_service_defaults() {
        let settings = StreamSettings::default();
        assert_eq!(settings.resolution, Resolution::Fhd);
        assert_eq!(settings.frame_rate.fps(), 30);
        assert_eq!(settings.bitrate.megabits(), 10);
        assert!(settings.audio_enabled);
        assert_eq!(settings.aspect_mode, AspectMode::FixedAspect);
    }

    #[test]
    fn merged_applies_only_set_fields() {
        let active = StreamSettings::default();
        let update = SettingsUpdate {
            frame_rate: Some(FrameRate::Fps60),
            ..Default::default()
        };
        let merged = active.merged(&update);
        assert_eq!(merged.frame_rate, FrameRate::Fps60);
        assert_eq!(merged.resolution, active.resolution);
        assert_eq!(merged.bitrate, active.bitrate);
    }

    #[test]
    fn fixed_aspect_swaps_for_portrait() {
        let settings = StreamSettings::default();
        let screen = ScreenMetrics {
            width: 1080,
            height: 2400,
        };
        assert_eq!(
            settings.video_dimensions(screen, Orientation::Landscape),
            (1920, 1080)
        );
        assert_eq!(
            settings.video_dimensions(screen, Orientation::Portrait),
            (1080, 1920)
        );
    }

    #[test]
    fn native_mode_aligns_to_even() {
        let settings = StreamSettings {
            aspect_mode: AspectMode::NativeFull,
            ..Default::default()
        };
        let screen = ScreenMetrics {
            width: 1081,
            height: 2401,
        };
        assert_eq!(
            settings.video_dimensions(screen, Orientation::Portrait),
            (1080, 2400)
        );
    }

    #[test]
    fn settings_serialize_with_store_keys() {
        let json = serde_json::to_value(StreamSettings::default()).unwrap();
        assert_eq!(json["use_native_res"], serde_json::json!(false));
        assert_eq!(json["fps"], serde_json::json!(30));
        assert_eq!(json["bitrate"], serde_json::json!(10));
        assert_eq!(json["resolution"], serde_json::json!("fhd"));
        assert_eq!(json["audio_enabled"], serde_json::json!(true));

        let back: StreamSettings = serde_json::from_value(json).unwrap();
        assert_eq!(back, StreamSettings::default());
    }

    #[test]
    fn unsupported_fps_is_rejected() {
        let result: Result<StreamSettings, _> =
            serde_json::from_str(r#"{"fps": 45}"#);
        assert!(result.is_err());
    }
}
