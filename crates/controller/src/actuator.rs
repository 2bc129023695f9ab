//! Actuator board: pump relay, indicator servo, alert LED and the status
//! display. The `gpio` feature gates the real rppal driver; without it, a
//! mock board tracks state and logs every change.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[cfg(feature = "gpio")]
use rppal::gpio::{Gpio, OutputPin};
#[cfg(feature = "gpio")]
use tracing::warn;

use crate::config::PinConfig;
use crate::gateway::ActuatorGateway;

/// Servo PWM frame length.
#[cfg(feature = "gpio")]
pub(crate) const SERVO_PERIOD: Duration = Duration::from_millis(20);

/// Pulse width for a hobby servo: 500 µs at 0°, 2500 µs at 180°.
pub(crate) fn servo_pulse_width(degrees: u8) -> Duration {
    let degrees = u64::from(degrees.min(180));
    Duration::from_micros(500 + degrees * 2000 / 180)
}

// ---------------------------------------------------------------------------
// 16x2 character display buffer
// ---------------------------------------------------------------------------

pub(crate) const DISPLAY_ROWS: usize = 2;
pub(crate) const DISPLAY_COLS: usize = 16;

/// Text content of the status display. The character protocol is the
/// panel driver's concern; the board only keeps what is shown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct TextDisplay {
    rows: [String; DISPLAY_ROWS],
}

impl TextDisplay {
    pub(crate) fn clear(&mut self) {
        for row in &mut self.rows {
            row.clear();
        }
    }

    /// Overwrite `row` starting at `col`, clipping at the panel width.
    /// Returns the resulting row text, or `None` for an out-of-range row.
    pub(crate) fn write(&mut self, row: u8, col: u8, text: &str) -> Option<&str> {
        let line = self.rows.get_mut(row as usize)?;
        let col = (col as usize).min(DISPLAY_COLS);

        let mut cells: Vec<char> = line.chars().collect();
        if cells.len() < col {
            cells.resize(col, ' ');
        }
        for (i, ch) in text.chars().take(DISPLAY_COLS - col).enumerate() {
            if col + i < cells.len() {
                cells[col + i] = ch;
            } else {
                cells.push(ch);
            }
        }

        *line = cells.into_iter().collect();
        Some(line.as_str())
    }

    #[cfg(test)]
    pub(crate) fn row(&self, row: usize) -> &str {
        self.rows.get(row).map(String::as_str).unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// Real GPIO board (rppal, Raspberry Pi only)
// ---------------------------------------------------------------------------
#[cfg(feature = "gpio")]
pub(crate) struct ActuatorBoard {
    relay: OutputPin,
    alert: OutputPin,
    servo: OutputPin,
    relay_active_low: bool, // many relay boards are active-low
    display: TextDisplay,
    pump_feedback: Option<Arc<AtomicBool>>,
}

#[cfg(feature = "gpio")]
impl ActuatorBoard {
    pub(crate) fn new(pins: &PinConfig) -> Result<Self> {
        let gpio = Gpio::new()?;
        let mut relay = gpio.get(pins.relay)?.into_output();
        let mut alert = gpio.get(pins.alert)?.into_output();
        let servo = gpio.get(pins.servo)?.into_output();

        // Fail-safe: ensure pump and alert are OFF at startup
        if pins.relay_active_low {
            relay.set_high();
        } else {
            relay.set_low();
        }
        alert.set_low();

        info!(
            relay = pins.relay,
            servo = pins.servo,
            alert = pins.alert,
            active_low = pins.relay_active_low,
            "actuator board initialised"
        );

        Ok(Self {
            relay,
            alert,
            servo,
            relay_active_low: pins.relay_active_low,
            display: TextDisplay::default(),
            pump_feedback: None,
        })
    }

    /// Mirror the pump state into `flag` (used by the simulated soil sensor).
    pub(crate) fn with_pump_feedback(mut self, flag: Arc<AtomicBool>) -> Self {
        self.pump_feedback = Some(flag);
        self
    }
}

#[cfg(feature = "gpio")]
impl ActuatorGateway for ActuatorBoard {
    fn set_pump(&mut self, on: bool) {
        // active-low relay: LOW = ON, HIGH = OFF
        if on != self.relay_active_low {
            self.relay.set_high();
        } else {
            self.relay.set_low();
        }
        if let Some(flag) = &self.pump_feedback {
            flag.store(on, Ordering::Release);
        }
        info!("pump {}", if on { "ON" } else { "OFF" });
    }

    fn set_servo_angle(&mut self, degrees: u8) {
        let degrees = degrees.min(180);
        let pulse = servo_pulse_width(degrees);
        if let Err(e) = self.servo.set_pwm(SERVO_PERIOD, pulse) {
            warn!(degrees, "servo pwm failed: {e}");
            return;
        }
        info!(degrees, pulse_us = pulse.as_micros() as u64, "servo moved");
    }

    fn set_alert(&mut self, on: bool) {
        if on {
            self.alert.set_high();
        } else {
            self.alert.set_low();
        }
        info!("alert {}", if on { "ON" } else { "OFF" });
    }

    fn display_clear(&mut self) {
        self.display.clear();
        debug!("display cleared");
    }

    fn display_write(&mut self, row: u8, col: u8, text: &str) {
        if let Some(line) = self.display.write(row, col, text) {
            info!(row, "[display] {line}");
        }
    }
}

// ---------------------------------------------------------------------------
// Mock board (no hardware, logs state changes)
// ---------------------------------------------------------------------------
#[cfg(not(feature = "gpio"))]
pub(crate) struct ActuatorBoard {
    pub(super) pump: bool,
    pub(super) alert: bool,
    pub(super) servo_angle: Option<u8>,
    pub(super) display: TextDisplay,
    pump_feedback: Option<Arc<AtomicBool>>,
}

#[cfg(not(feature = "gpio"))]
impl ActuatorBoard {
    pub(crate) fn new(pins: &PinConfig) -> Result<Self> {
        info!(
            relay = pins.relay,
            servo = pins.servo,
            alert = pins.alert,
            "[mock-gpio] actuator board initialised (no hardware)"
        );
        Ok(Self {
            pump: false,
            alert: false,
            servo_angle: None,
            display: TextDisplay::default(),
            pump_feedback: None,
        })
    }

    /// Mirror the pump state into `flag` (used by the simulated soil sensor).
    pub(crate) fn with_pump_feedback(mut self, flag: Arc<AtomicBool>) -> Self {
        self.pump_feedback = Some(flag);
        self
    }
}

#[cfg(not(feature = "gpio"))]
impl ActuatorGateway for ActuatorBoard {
    fn set_pump(&mut self, on: bool) {
        self.pump = on;
        if let Some(flag) = &self.pump_feedback {
            flag.store(on, Ordering::Release);
        }
        info!("[mock-gpio] pump {}", if on { "ON" } else { "OFF" });
    }

    fn set_servo_angle(&mut self, degrees: u8) {
        let degrees = degrees.min(180);
        self.servo_angle = Some(degrees);
        info!(
            degrees,
            pulse_us = servo_pulse_width(degrees).as_micros() as u64,
            "[mock-gpio] servo moved"
        );
    }

    fn set_alert(&mut self, on: bool) {
        self.alert = on;
        info!("[mock-gpio] alert {}", if on { "ON" } else { "OFF" });
    }

    fn display_clear(&mut self) {
        self.display.clear();
        debug!("[mock-gpio] display cleared");
    }

    fn display_write(&mut self, row: u8, col: u8, text: &str) {
        if let Some(line) = self.display.write(row, col, text) {
            info!(row, "[display] {line}");
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(all(test, not(feature = "gpio")))]
mod tests {
    use super::*;

    fn board() -> ActuatorBoard {
        ActuatorBoard::new(&PinConfig::default()).unwrap()
    }

    // -- ActuatorBoard (mock) -----------------------------------------------

    #[test]
    fn board_starts_safe() {
        let b = board();
        assert!(!b.pump);
        assert!(!b.alert);
        assert_eq!(b.servo_angle, None);
    }

    #[test]
    fn pump_on_off() {
        let mut b = board();
        b.set_pump(true);
        assert!(b.pump);
        b.set_pump(false);
        assert!(!b.pump);
    }

    #[test]
    fn pump_feedback_mirrors_relay() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut b = board().with_pump_feedback(Arc::clone(&flag));
        b.set_pump(true);
        assert!(flag.load(Ordering::Acquire));
        b.set_pump(false);
        assert!(!flag.load(Ordering::Acquire));
    }

    #[test]
    fn servo_angle_is_clamped() {
        let mut b = board();
        b.set_servo_angle(200);
        assert_eq!(b.servo_angle, Some(180));
    }

    #[test]
    fn all_off_resets_pump_and_alert() {
        let mut b = board();
        b.set_pump(true);
        b.set_alert(true);
        b.all_off();
        assert!(!b.pump);
        assert!(!b.alert);
    }

    // -- Servo pulse --------------------------------------------------------

    #[test]
    fn servo_pulse_spans_500_to_2500_us() {
        assert_eq!(servo_pulse_width(0), Duration::from_micros(500));
        assert_eq!(servo_pulse_width(90), Duration::from_micros(1500));
        assert_eq!(servo_pulse_width(180), Duration::from_micros(2500));
        assert_eq!(servo_pulse_width(255), Duration::from_micros(2500));
    }

    // -- TextDisplay --------------------------------------------------------

    #[test]
    fn display_write_and_clear() {
        let mut b = board();
        b.display_write(0, 0, "Watering Z1");
        b.display_write(1, 0, "Time:30s");
        assert_eq!(b.display.row(0), "Watering Z1");
        assert_eq!(b.display.row(1), "Time:30s");
        b.display_clear();
        assert_eq!(b.display.row(0), "");
        assert_eq!(b.display.row(1), "");
    }

    #[test]
    fn display_write_clips_at_sixteen_columns() {
        let mut d = TextDisplay::default();
        let line = d.write(0, 10, "abcdefghij").unwrap().to_string();
        assert_eq!(line, "          abcdef");
        assert_eq!(line.chars().count(), DISPLAY_COLS);
    }

    #[test]
    fn display_write_overwrites_in_place() {
        let mut d = TextDisplay::default();
        d.write(1, 0, "Time:30s");
        assert_eq!(d.write(1, 5, "09").unwrap(), "Time:09s");
    }

    #[test]
    fn display_write_unknown_row_is_ignored() {
        let mut d = TextDisplay::default();
        assert!(d.write(5, 0, "nope").is_none());
        assert_eq!(d.row(5), "");
    }
}
