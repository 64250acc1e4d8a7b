//! Rotation sample debouncing.
//!
//! Raw sensor degrees are snapped to the four rotation buckets with a
//! hysteresis band, so a device resting near a 45 degree boundary does not
//! flap. Only portrait/landscape crossings matter to the encoder; a 180
//! degree flip keeps the frame dimensions and is ignored.

use serde::Serialize;

const BUCKET_HALF_WIDTH: u16 = 45;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationBucket {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl RotationBucket {
    #[must_use]
    pub const fn center(self) -> u16 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    #[must_use]
    pub const fn orientation(self) -> Orientation {
        match self {
            Self::Deg0 | Self::Deg180 => Orientation::Portrait,
            Self::Deg90 | Self::Deg270 => Orientation::Landscape,
        }
    }

    /// Bucket whose center is nearest to `degrees`.
    #[must_use]
    pub fn nearest(degrees: u16) -> Self {
        match degrees % 360 {
            0..=44 | 315..=359 => Self::Deg0,
            45..=134 => Self::Deg90,
            135..=224 => Self::Deg180,
            _ => Self::Deg270,
        }
    }
}

/// Circular distance between two angles, in degrees (0..=180).
fn angular_distance(a: u16, b: u16) -> u16 {
    let diff = (a % 360).abs_diff(b % 360);
    diff.min(360 - diff)
}

/// Debounces rotation samples into orientation crossings.
///
/// The watcher leaves its current bucket only once a sample has moved past
/// the bucket boundary by more than the hysteresis margin. After reporting
/// a crossing it suspends itself; the controller resumes it once the
/// restarted session is streaming again.
pub(crate) struct OrientationWatcher {
    current: RotationBucket,
    hysteresis: u16,
    suspended: bool,
}

impl OrientationWatcher {
    pub fn new(initial: Orientation) -> Self {
        let current = match initial {
            Orientation::Portrait => RotationBucket::Deg0,
            Orientation::Landscape => RotationBucket::Deg90,
        };
        Self {
            current,
            hysteresis: 15,
            suspended: false,
        }
    }

    pub fn orientation(&self) -> Orientation {
        self.current.orientation()
    }

    /// Feed one raw sample. Returns the new orientation when the sample
    /// settles a portrait/landscape crossing; the watcher is suspended
    /// until `resume` after that.
    pub fn on_sample(&mut self, degrees: u16) -> Option<Orientation> {
        if self.suspended {
            return None;
        }
        let from_center = angular_distance(degrees, self.current.center());
        if from_center <= BUCKET_HALF_WIDTH + self.hysteresis {
            return None;
        }
        let next = RotationBucket::nearest(degrees);
        let before = self.current.orientation();
        self.current = next;
        if next.orientation() == before {
            return None;
        }
        self.suspended = true;
        Some(next.orientation())
    }

    pub fn resume(&mut self) {
        self.suspended = false;
    }

    pub fn suspend(&mut self) {
        self.suspended = true;
    }
}
