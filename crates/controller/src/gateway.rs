//! Narrow contracts for the hardware-facing collaborators. The sequencer and
//! the sampling activities only ever talk to these traits; concrete boards,
//! simulators, and test doubles live elsewhere.

use serde::Serialize;
use std::future::Future;
use std::time::Duration;

/// Latest temperature/humidity sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ClimateReading {
    pub temperature: f32,
    pub humidity: f32,
}

/// Sensor inputs. Every read is treated as valid; failures are the
/// implementation's problem.
pub trait SensorGateway: Send + Sync + 'static {
    /// Raw soil reading in device-native units (lower is drier).
    fn read_moisture(&self) -> u16;
    fn read_climate(&self) -> ClimateReading;
    fn intrusion_detected(&self) -> bool;
}

/// Outputs: pump relay, indicator servo, alert LED and a 16x2 text display.
pub trait ActuatorGateway: Send + 'static {
    fn set_pump(&mut self, on: bool);
    /// `degrees` is clamped to 0..=180 by implementations.
    fn set_servo_angle(&mut self, degrees: u8);
    fn set_alert(&mut self, on: bool);
    fn display_clear(&mut self);
    fn display_write(&mut self, row: u8, col: u8, text: &str);

    /// Fail-safe: pump and alert off.
    fn all_off(&mut self) {
        self.set_pump(false);
        self.set_alert(false);
    }
}

/// Line-oriented operator console.
pub trait ConsoleChannel: Send + 'static {
    /// Next complete line, or `None` if nothing arrived within `timeout`.
    fn read_line(&mut self, timeout: Duration) -> impl Future<Output = Option<String>> + Send;
    fn write_line(&mut self, line: &str);
}
