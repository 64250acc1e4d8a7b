//! Classification of settings changes against the active snapshot.

use crate::settings::{Bitrate, SettingsUpdate, StreamSettings};

/// What the controller must do to honor a settings change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeClass {
    /// Nothing differs from the active snapshot.
    Unchanged,
    /// Only the bitrate differs; the encoder can apply it live.
    LiveBitrate(Bitrate),
    /// Resolution, frame rate, aspect mode or audio differ; the pipeline
    /// must be re-prepared, which means a full restart.
    RestartRequired,
}

/// Merge `update` over `active` and classify the result.
#[must_use]
pub fn classify(active: &StreamSettings, update: &SettingsUpdate) -> (StreamSettings, ChangeClass) {
    let merged = active.merged(update);
    let class = if merged == *active {
        ChangeClass::Unchanged
    } else if merged.aspect_mode == active.aspect_mode
        && merged.resolution == active.resolution
        && merged.frame_rate == active.frame_rate
        && merged.audio_enabled == active.audio_enabled
    {
        ChangeClass::LiveBitrate(merged.bitrate)
    } else {
        ChangeClass::RestartRequired
    };
    (merged, class)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{AspectMode, FrameRate, Resolution};

    #[test]
    fn empty_update_is_unchanged() {
        let active = StreamSettings::default();
        let (merged, class) = classify(&active, &SettingsUpdate::default());
        assert_eq!(class, ChangeClass::Unchanged);
        assert_eq!(merged, active);
    }

    #[test]
    fn same_values_are_unchanged() {
        let active = StreamSettings::default();
        let update = SettingsUpdate {
            bitrate: Some(active.bitrate),
            frame_rate: Some(active.frame_rate),
            ..Default::default()
        };
        assert_eq!(classify(&active, &update).1, ChangeClass::Unchanged);
    }

    #[test]
    fn bitrate_only_is_live() {
        let active = StreamSettings::default();
        let update = SettingsUpdate {
            bitrate: Some(Bitrate::Mbps20),
            ..Default::default()
        };
        let (merged, class) = classify(&active, &update);
        assert_eq!(class, ChangeClass::LiveBitrate(Bitrate::Mbps20));
        assert_eq!(merged.bitrate, Bitrate::Mbps20);
    }

    #[test]
    fn frame_rate_change_requires_restart() {
        let active = StreamSettings::default();
        let update = SettingsUpdate {
            frame_rate: Some(FrameRate::Fps60),
            ..Default::default()
        };
        assert_eq!(classify(&active, &update).1, ChangeClass::RestartRequired);
    }

    #[test]
    fn resolution_change_requires_restart() {
        let active = StreamSettings::default();
        let update = SettingsUpdate {
            resolution: Some(Resolution::Qhd),
            ..Default::default()
        };
        assert_eq!(classify(&active, &update).1, ChangeClass::RestartRequired);
    }

    #[test]
    fn aspect_change_requires_restart() {
        let active = StreamSettings::default();
        let update = SettingsUpdate {
            aspect_mode: Some(AspectMode::NativeFull),
            ..Default::default()
        };
        assert_eq!(classify(&active, &update).1, ChangeClass::RestartRequired);
    }

    #[test]
    fn audio_toggle_requires_restart() {
        let active = StreamSettings::default();
        let update = SettingsUpdate {
            audio_enabled: Some(false),
            ..Default::default()
        };
        assert_eq!(classify(&active, &update).1, ChangeClass::RestartRequired);
    }

    #[test]
    fn bitrate_plus_fps_requires_restart() {
        let active = StreamSettings::default();
        let update = SettingsUpdate {
            bitrate: Some(Bitrate::Mbps30),
            frame_rate: Some(FrameRate::Fps15),
            ..Default::default()
        };
        let (merged, class) = classify(&active, &update);
        assert_eq!(class, ChangeClass::RestartRequired);
        assert_eq!(merged.bitrate, Bitrate::Mbps30);
        assert_eq!(merged.frame_rate, FrameRate::Fps15);
    }
}
