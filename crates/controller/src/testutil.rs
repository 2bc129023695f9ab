//! Scripted gateway doubles shared by the activity tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::config::Config;
use crate::gateway::{ActuatorGateway, ClimateReading, ConsoleChannel, SensorGateway};

/// Config with timings small enough to reason about tick by tick.
pub(crate) fn fast_config() -> Config {
    let mut cfg = Config::default();
    cfg.timing.water_seconds = 3;
    cfg.timing.tick_ms = 1000;
    cfg.timing.idle_poll_ms = 500;
    cfg.timing.zone_pause_ms = 2000;
    cfg.timing.intrusion_alert_ms = 2000;
    cfg.timing.soil_period_ms = 2000;
    cfg.timing.climate_period_ms = 5000;
    cfg.timing.console_timeout_ms = 1000;
    cfg
}

// ---------------------------------------------------------------------------
// Sensors
// ---------------------------------------------------------------------------

pub(crate) struct ScriptedSensors {
    moisture: AtomicU16,
    climate: Mutex<ClimateReading>,
    intrusion: AtomicBool,
    /// Fire intrusion on this many-th intrusion poll (1-based); 0 = never.
    intrusion_on_poll: AtomicU32,
    polls: AtomicU32,
}

impl ScriptedSensors {
    pub(crate) fn new(moisture: u16, humidity: f32) -> Self {
        Self {
            moisture: AtomicU16::new(moisture),
            climate: Mutex::new(ClimateReading {
                temperature: 25.0,
                humidity,
            }),
            intrusion: AtomicBool::new(false),
            intrusion_on_poll: AtomicU32::new(0),
            polls: AtomicU32::new(0),
        }
    }

    pub(crate) fn set_moisture(&self, raw: u16) {
        self.moisture.store(raw, Ordering::SeqCst);
    }

    pub(crate) fn set_humidity(&self, humidity: f32) {
        self.climate.lock().unwrap().humidity = humidity;
    }

    pub(crate) fn set_intrusion(&self, on: bool) {
        self.intrusion.store(on, Ordering::SeqCst);
    }

    pub(crate) fn intrusion_on_poll(&self, n: u32) {
        self.intrusion_on_poll.store(n, Ordering::SeqCst);
    }
}

impl SensorGateway for ScriptedSensors {
    fn read_moisture(&self) -> u16 {
        self.moisture.load(Ordering::SeqCst)
    }

    fn read_climate(&self) -> ClimateReading {
        *self.climate.lock().unwrap()
    }

    fn intrusion_detected(&self) -> bool {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        let trigger = self.intrusion_on_poll.load(Ordering::SeqCst);
        if trigger != 0 && poll == trigger {
            return true;
        }
        self.intrusion.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Actuators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Action {
    Pump(bool),
    Servo(u8),
    Alert(bool),
    Clear,
    Write(u8, u8, String),
}

/// Records every actuator call with its (virtual) time.
#[derive(Default)]
pub(crate) struct RecordingActuators {
    pub(crate) log: Vec<(Instant, Action)>,
    pub(crate) pump: bool,
    pub(crate) alert: bool,
}

impl RecordingActuators {
    pub(crate) fn actions(&self) -> impl Iterator<Item = &Action> {
        self.log.iter().map(|(_, a)| a)
    }

    pub(crate) fn writes(&self) -> Vec<String> {
        self.actions()
            .filter_map(|a| match a {
                Action::Write(_, _, text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn pump_changes(&self) -> Vec<(Instant, bool)> {
        self.log
            .iter()
            .filter_map(|(t, a)| match a {
                Action::Pump(on) => Some((*t, *on)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn alert_changes(&self) -> Vec<(Instant, bool)> {
        self.log
            .iter()
            .filter_map(|(t, a)| match a {
                Action::Alert(on) => Some((*t, *on)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn servo_angles(&self) -> Vec<u8> {
        self.actions()
            .filter_map(|a| match a {
                Action::Servo(deg) => Some(*deg),
                _ => None,
            })
            .collect()
    }

    fn push(&mut self, action: Action) {
        self.log.push((Instant::now(), action));
    }
}

impl ActuatorGateway for RecordingActuators {
    fn set_pump(&mut self, on: bool) {
        self.pump = on;
        self.push(Action::Pump(on));
    }

    fn set_servo_angle(&mut self, degrees: u8) {
        self.push(Action::Servo(degrees));
    }

    fn set_alert(&mut self, on: bool) {
        self.alert = on;
        self.push(Action::Alert(on));
    }

    fn display_clear(&mut self) {
        self.push(Action::Clear);
    }

    fn display_write(&mut self, row: u8, col: u8, text: &str) {
        self.push(Action::Write(row, col, text.to_string()));
    }
}

// ---------------------------------------------------------------------------
// Console
// ---------------------------------------------------------------------------

/// Hands out queued input lines one per read, then times out forever.
#[derive(Default)]
pub(crate) struct ScriptedConsole {
    pub(crate) input: VecDeque<String>,
    pub(crate) output: std::sync::Arc<Mutex<Vec<String>>>,
}

impl ScriptedConsole {
    pub(crate) fn with_input(lines: &[&str]) -> Self {
        Self {
            input: lines.iter().map(|l| l.to_string()).collect(),
            output: Default::default(),
        }
    }
}

impl ConsoleChannel for ScriptedConsole {
    async fn read_line(&mut self, timeout: Duration) -> Option<String> {
        match self.input.pop_front() {
            Some(line) => Some(line),
            None => {
                sleep(timeout).await;
                None
            }
        }
    }

    fn write_line(&mut self, line: &str) {
        self.output.lock().unwrap().push(line.to_string());
    }
}
