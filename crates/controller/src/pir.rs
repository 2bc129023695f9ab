//! PIR motion input. On hardware builds the intrusion signal comes from a
//! GPIO pin while soil and climate still come from the wrapped source.

use crate::gateway::{ClimateReading, SensorGateway};

#[cfg(feature = "gpio")]
use anyhow::Result;
#[cfg(feature = "gpio")]
use rppal::gpio::{Gpio, InputPin};
#[cfg(feature = "gpio")]
use std::sync::{Mutex, PoisonError};
#[cfg(feature = "gpio")]
use tracing::info;

/// A digital motion detector output.
pub(crate) trait MotionInput: Send + Sync + 'static {
    fn motion(&self) -> bool;
}

/// Sensor gateway with intrusion taken from a dedicated motion input.
pub(crate) struct WithMotionInput<S, M> {
    inner: S,
    motion: M,
}

impl<S: SensorGateway, M: MotionInput> WithMotionInput<S, M> {
    pub(crate) fn new(inner: S, motion: M) -> Self {
        Self { inner, motion }
    }
}

impl<S: SensorGateway, M: MotionInput> SensorGateway for WithMotionInput<S, M> {
    fn read_moisture(&self) -> u16 {
        self.inner.read_moisture()
    }

    fn read_climate(&self) -> ClimateReading {
        self.inner.read_climate()
    }

    fn intrusion_detected(&self) -> bool {
        self.motion.motion()
    }
}

// ---------------------------------------------------------------------------
// Real GPIO input (rppal, Raspberry Pi only)
// ---------------------------------------------------------------------------

/// PIR sensor output on a BCM pin; HIGH means motion.
#[cfg(feature = "gpio")]
pub(crate) struct PirPin {
    pin: Mutex<InputPin>,
}

#[cfg(feature = "gpio")]
impl PirPin {
    pub(crate) fn new(bcm: u8) -> Result<Self> {
        // Pull-down keeps a disconnected sensor from reading as motion.
        let pin = Gpio::new()?.get(bcm)?.into_input_pulldown();
        info!(pin = bcm, "pir input initialised");
        Ok(Self {
            pin: Mutex::new(pin),
        })
    }
}

#[cfg(feature = "gpio")]
impl MotionInput for PirPin {
    fn motion(&self) -> bool {
        self.pin
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_high()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedSensors;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Level(Arc<AtomicBool>);

    impl MotionInput for Level {
        fn motion(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn intrusion_follows_the_motion_input_only() {
        let inner = ScriptedSensors::new(1234, 61.0);
        inner.set_intrusion(true);
        let level = Level::default();
        let sensors = WithMotionInput::new(inner, level.clone());

        assert!(!sensors.intrusion_detected());
        level.0.store(true, Ordering::SeqCst);
        assert!(sensors.intrusion_detected());
        level.0.store(false, Ordering::SeqCst);
        assert!(!sensors.intrusion_detected());
    }

    #[test]
    fn soil_and_climate_come_from_the_wrapped_source() {
        let sensors = WithMotionInput::new(ScriptedSensors::new(1234, 61.0), Level::default());
        assert_eq!(sensors.read_moisture(), 1234);
        assert_eq!(sensors.read_climate().humidity, 61.0);
    }
}
