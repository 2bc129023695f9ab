//! Sensor simulator used in place of the soil probe, the DHT climate sensor
//! and the PIR input when no hardware is attached.
//!
//! Soil is a mean-reverting random walk that dries each sample, picks up
//! ADC noise per read, and recovers while the pump runs. Climate wanders
//! inside the DHT's nominal range. Intrusion is a per-poll coin flip.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::gateway::{ClimateReading, SensorGateway};

/// Full scale of the 12-bit soil ADC.
pub const ADC_MAX: f64 = 4095.0;

/// Zero-mean noise with standard deviation `sigma`. Irwin-Hall: twelve
/// uniform draws summed, minus six, is close enough to N(0, 1) here.
fn noise(sigma: f64) -> f64 {
    let unit: f64 = (0..12).map(|_| fastrand::f64()).sum::<f64>() - 6.0;
    unit * sigma
}

// ---------------------------------------------------------------------------
// Scenario presets
// ---------------------------------------------------------------------------

/// Simulation profile selected by `[sim].scenario`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    /// Starts just above the loosest threshold and dries steadily, so
    /// zones trip one after another.
    #[default]
    Drying,
    /// Hovers mid-range with little noise. Rarely waters.
    Stable,
    /// Dry soil under saturated air: humidity sits above the ceiling, so
    /// irrigation stays suppressed.
    Humid,
    /// Near the wet end; nothing should water.
    Wet,
}

impl Scenario {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Drying => "drying",
            Self::Stable => "stable",
            Self::Humid => "humid",
            Self::Wet => "wet",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Soil and climate dynamics
// ---------------------------------------------------------------------------

/// Per-sample soil behaviour, in ADC units.
#[derive(Debug, Clone, Copy)]
struct SoilProfile {
    start: f64,
    /// Level the walk is pulled back toward.
    equilibrium: f64,
    /// Fraction of the distance to `equilibrium` recovered per sample.
    pull: f64,
    /// Signed drift per sample (negative dries).
    evaporation: f64,
    step_sigma: f64,
    adc_sigma: f64,
}

/// Rise per sample while the pump runs.
const PUMP_GAIN: f64 = 120.0;

impl Scenario {
    fn soil(self) -> SoilProfile {
        let (start, equilibrium, pull, evaporation, step_sigma, adc_sigma) = match self {
            Self::Drying => (2300.0, 1200.0, 0.01, -25.0, 20.0, 15.0),
            Self::Stable => (2400.0, 2400.0, 0.05, -2.0, 10.0, 8.0),
            Self::Humid => (900.0, 900.0, 0.02, -5.0, 15.0, 10.0),
            Self::Wet => (3600.0, 3400.0, 0.02, -3.0, 15.0, 10.0),
        };
        SoilProfile {
            start,
            equilibrium,
            pull,
            evaporation,
            step_sigma,
            adc_sigma,
        }
    }

    /// Humidity the climate walk settles around (%).
    fn humidity_center(self) -> f64 {
        match self {
            Self::Humid => 88.0,
            Self::Wet => 60.0,
            Self::Drying | Self::Stable => 55.0,
        }
    }
}

struct Soil {
    level: f64,
    profile: SoilProfile,
}

struct Climate {
    temperature: f64,
    humidity: f64,
    humidity_center: f64,
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// Simulated [`SensorGateway`]. Reads are cheap and never fail.
pub struct SimulatedSensors {
    soil: Mutex<Soil>,
    climate: Mutex<Climate>,
    intrusion_probability: f32,
    /// Set by the actuator board while the pump runs.
    watering: Arc<AtomicBool>,
}

impl SimulatedSensors {
    pub fn new(scenario: Scenario, intrusion_probability: f32) -> Self {
        let profile = scenario.soil();
        let humidity_center = scenario.humidity_center();
        Self {
            soil: Mutex::new(Soil {
                level: profile.start,
                profile,
            }),
            climate: Mutex::new(Climate {
                temperature: 25.0,
                humidity: humidity_center,
                humidity_center,
            }),
            intrusion_probability,
            watering: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag the actuator board raises while the pump runs.
    pub fn watering_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.watering)
    }
}

impl SensorGateway for SimulatedSensors {
    fn read_moisture(&self) -> u16 {
        let pumping = self.watering.load(Ordering::Acquire);
        // The walk state is plain numbers and is valid even if a holder
        // panicked, so keep sampling from it. A fabricated 0 would read as
        // bone dry in every zone.
        let mut soil = self.soil.lock().unwrap_or_else(PoisonError::into_inner);
        let p = soil.profile;

        let restoring = p.pull * (p.equilibrium - soil.level);
        let irrigation = if pumping { PUMP_GAIN } else { 0.0 };
        soil.level = (soil.level + p.evaporation + restoring + irrigation + noise(p.step_sigma))
            .clamp(0.0, ADC_MAX);

        (soil.level + noise(p.adc_sigma)).round().clamp(0.0, ADC_MAX) as u16
    }

    fn read_climate(&self) -> ClimateReading {
        let mut c = self.climate.lock().unwrap_or_else(PoisonError::into_inner);

        // DHT nominal range is 18-35 °C.
        c.temperature = (c.temperature + 0.05 * (25.0 - c.temperature) + noise(0.4))
            .clamp(18.0, 35.0);
        let toward_center = 0.1 * (c.humidity_center - c.humidity);
        c.humidity = (c.humidity + toward_center + noise(1.0)).clamp(0.0, 100.0);

        ClimateReading {
            temperature: c.temperature as f32,
            humidity: c.humidity as f32,
        }
    }

    fn intrusion_detected(&self) -> bool {
        self.intrusion_probability > 0.0 && fastrand::f32() < self.intrusion_probability
    }
}

// ===========================================================================
// Tests
// ===========================================================================
