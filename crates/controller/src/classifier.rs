//! Dry-zone classification: turns the latest soil reading and humidity into a
//! bitmask of zones that need water.

use serde::Serialize;
use std::fmt;

/// Number of irrigation zones driven by the controller.
pub const ZONE_COUNT: u8 = 3;

// ---------------------------------------------------------------------------
// Dry-zone mask
// ---------------------------------------------------------------------------

/// One bit per zone; bit `n` set means zone `n` is below its moisture
/// threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DryZoneMask(u8);

impl DryZoneMask {
    pub const EMPTY: Self = Self(0);

    pub fn from_bits(bits: u8) -> Self {
        Self(bits & Self::all_bits())
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, zone: u8) -> bool {
        zone < ZONE_COUNT && self.0 & (1 << zone) != 0
    }

    fn all_bits() -> u8 {
        (1u8 << ZONE_COUNT) - 1
    }
}

impl fmt::Display for DryZoneMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Moisture cutoffs, strictest first. A reading below `thresholds[n]` marks
/// zone `n` dry. Config validation guarantees the cutoffs are strictly
/// ascending, which makes the mask monotonic in the reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Classifier {
    pub thresholds: [u16; ZONE_COUNT as usize],
    pub humidity_ceiling: f32,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            thresholds: [1000, 1500, 2000],
            humidity_ceiling: 80.0,
        }
    }
}

impl Classifier {
    /// Classify one soil reading. Humidity above the ceiling suppresses all
    /// irrigation demand regardless of dryness.
    pub fn classify(&self, moisture: u16, humidity: f32) -> DryZoneMask {
        if humidity > self.humidity_ceiling {
            return DryZoneMask::EMPTY;
        }

        let bits = self
            .thresholds
            .iter()
            .enumerate()
            .filter(|(_, &cutoff)| moisture < cutoff)
            .fold(0u8, |acc, (zone, _)| acc | (1 << zone));

        DryZoneMask::from_bits(bits)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
