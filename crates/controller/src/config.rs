//! TOML config file loading and validation. Every field has a default, so an
//! absent file yields a working setup.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::classifier::{Classifier, ZONE_COUNT};
use crate::sim::Scenario;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub classifier: ClassifierConfig,
    pub timing: TimingConfig,
    pub maintenance: MaintenanceConfig,
    pub pins: PinConfig,
    pub web: WebConfig,
    pub sim: SimConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Raw soil cutoffs, strictest first.
    pub thresholds: Vec<u16>,
    /// Percent relative humidity above which irrigation is suppressed.
    pub humidity_ceiling: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub water_seconds: u32,
    pub tick_ms: u64,
    pub idle_poll_ms: u64,
    pub zone_pause_ms: u64,
    pub intrusion_alert_ms: u64,
    pub soil_period_ms: u64,
    pub climate_period_ms: u64,
    pub console_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Completed zone cycles between maintenance notices.
    pub threshold: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PinConfig {
    pub relay: u8,
    pub servo: u8,
    pub alert: u8,
    /// PIR motion input. Only read with the `gpio` feature; otherwise the
    /// simulator reports intrusions.
    pub intrusion: u8,
    pub relay_active_low: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub scenario: Scenario,
    pub intrusion_probability: f32,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for ClassifierConfig {
    fn default() -> Self {
        let c = Classifier::default();
        Self {
            thresholds: c.thresholds.to_vec(),
            humidity_ceiling: c.humidity_ceiling,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            water_seconds: 30,
            tick_ms: 1000,
            idle_poll_ms: 500,
            zone_pause_ms: 2000,
            intrusion_alert_ms: 2000,
            soil_period_ms: 2000,
            climate_period_ms: 5000,
            console_timeout_ms: 1000,
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self { threshold: 30 }
    }
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            relay: 17,
            servo: 18,
            alert: 27,
            intrusion: 22,
            relay_active_low: true,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            scenario: Scenario::default(),
            intrusion_probability: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Derived runtime views
// ---------------------------------------------------------------------------

impl ClassifierConfig {
    /// Build the classifier. Only call on a validated config.
    pub fn classifier(&self) -> Classifier {
        let mut thresholds = Classifier::default().thresholds;
        for (slot, value) in thresholds.iter_mut().zip(&self.thresholds) {
            *slot = *value;
        }
        Classifier {
            thresholds,
            humidity_ceiling: self.humidity_ceiling,
        }
    }
}

impl TimingConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn zone_pause(&self) -> Duration {
        Duration::from_millis(self.zone_pause_ms)
    }

    pub fn intrusion_alert(&self) -> Duration {
        Duration::from_millis(self.intrusion_alert_ms)
    }

    pub fn soil_period(&self) -> Duration {
        Duration::from_millis(self.soil_period_ms)
    }

    pub fn climate_period(&self) -> Duration {
        Duration::from_millis(self.climate_period_ms)
    }

    pub fn console_timeout(&self) -> Duration {
        Duration::from_millis(self.console_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// GPIO whitelist
// ---------------------------------------------------------------------------

/// BCM GPIO pins available on the Raspberry Pi 40-pin header for general
/// use. GPIO 0-1 are reserved for the ID EEPROM and must never be used.
/// GPIO 28+ are not exposed on the standard header.
const VALID_GPIO_PINS: std::ops::RangeInclusive<u8> = 2..=27;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all config entries. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_classifier(&mut errors);
        self.validate_timing(&mut errors);
        self.validate_pins(&mut errors);

        if self.maintenance.threshold == 0 {
            errors.push("maintenance.threshold must be positive".to_string());
        }
        if self.web.enabled && self.web.port == 0 {
            errors.push("web.port must be non-zero when web is enabled".to_string());
        }
        if !(0.0..=1.0).contains(&self.sim.intrusion_probability) {
            errors.push(format!(
                "sim.intrusion_probability {} out of range [0.0, 1.0]",
                self.sim.intrusion_probability
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_classifier(&self, errors: &mut Vec<String>) {
        let c = &self.classifier;

        if c.thresholds.len() != ZONE_COUNT as usize {
            errors.push(format!(
                "classifier.thresholds must have exactly {ZONE_COUNT} entries, got {}",
                c.thresholds.len()
            ));
        }
        if c.thresholds.first() == Some(&0) {
            errors.push("classifier.thresholds[0] must be positive".to_string());
        }
        if c.thresholds.windows(2).any(|w| w[0] >= w[1]) {
            errors.push(format!(
                "classifier.thresholds {:?} must be strictly ascending (strictest first)",
                c.thresholds
            ));
        }
        if !(0.0..=100.0).contains(&c.humidity_ceiling) {
            errors.push(format!(
                "classifier.humidity_ceiling {} out of range [0.0, 100.0]",
                c.humidity_ceiling
            ));
        }
    }

    fn validate_timing(&self, errors: &mut Vec<String>) {
        let t = &self.timing;

        if t.water_seconds == 0 {
            errors.push("timing.water_seconds must be positive".to_string());
        }

        // ── Periods (all must be positive) ──────────────────
        let periods = [
            ("tick_ms", t.tick_ms),
            ("idle_poll_ms", t.idle_poll_ms),
            ("zone_pause_ms", t.zone_pause_ms),
            ("intrusion_alert_ms", t.intrusion_alert_ms),
            ("soil_period_ms", t.soil_period_ms),
            ("climate_period_ms", t.climate_period_ms),
            ("console_timeout_ms", t.console_timeout_ms),
        ];
        for (name, value) in periods {
            if value == 0 {
                errors.push(format!("timing.{name} must be positive"));
            }
        }
    }

    fn validate_pins(&self, errors: &mut Vec<String>) {
        let p = &self.pins;
        let mut seen: HashSet<u8> = HashSet::new();

        let pins = [
            ("relay", p.relay),
            ("servo", p.servo),
            ("alert", p.alert),
            ("intrusion", p.intrusion),
        ];
        for (name, pin) in pins {
            if !VALID_GPIO_PINS.contains(&pin) {
                errors.push(format!(
                    "pins.{name} {pin} is not a valid BCM GPIO pin (allowed: 2-27)"
                ));
            } else if !seen.insert(pin) {
                errors.push(format!("pins.{name} {pin} is already used by another pin"));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    parse(&contents).with_context(|| format!("invalid config: {path}"))
}

/// Like [`load`], but a missing file means "use the defaults".
pub fn load_or_default(path: &str) -> Result<Config> {
    if !Path::new(path).exists() {
        info!(path, "config file not found, using defaults");
        return Ok(Config::default());
    }
    let config = load(path)?;
    info!(path, "config loaded");
    Ok(config)
}

fn parse(contents: &str) -> Result<Config> {
    let config: Config = toml::from_str(contents).context("failed to parse TOML")?;
    config.validate()?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Assert validation fails and the error message contains `needle`.
    fn assert_validation_err(cfg: &Config, needle: &str) {
        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(
            msg.contains(needle),
            "expected error containing {needle:?}, got: {msg}"
        );
    }

    // -- Parsing ----------------------------------------------------------

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[classifier]
thresholds = [900, 1400, 1900]
humidity_ceiling = 75.0

[timing]
water_seconds = 20
tick_ms = 500
idle_poll_ms = 250
zone_pause_ms = 1000
intrusion_alert_ms = 3000
soil_period_ms = 1000
climate_period_ms = 4000
console_timeout_ms = 800

[maintenance]
threshold = 10

[pins]
relay = 5
servo = 6
alert = 13
intrusion = 4
relay_active_low = false

[web]
enabled = false
port = 9000

[sim]
scenario = "humid"
intrusion_probability = 0.01
"#;
        let cfg = parse(toml_str).unwrap();
        assert_eq!(cfg.classifier.thresholds, vec![900, 1400, 1900]);
        assert_eq!(cfg.timing.water_seconds, 20);
        assert_eq!(cfg.timing.tick(), Duration::from_millis(500));
        assert_eq!(cfg.maintenance.threshold, 10);
        assert_eq!(cfg.pins.relay, 5);
        assert_eq!(cfg.pins.intrusion, 4);
        assert!(!cfg.pins.relay_active_low);
        assert!(!cfg.web.enabled);
        assert_eq!(cfg.sim.scenario, Scenario::Humid);

        let classifier = cfg.classifier.classifier();
        assert_eq!(classifier.thresholds, [900, 1400, 1900]);
        assert_eq!(classifier.humidity_ceiling, 75.0);
    }

    #[test]
    fn parse_empty_config_uses_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg.classifier.thresholds, vec![1000, 1500, 2000]);
        assert_eq!(cfg.classifier.humidity_ceiling, 80.0);
        assert_eq!(cfg.timing.water_seconds, 30);
        assert_eq!(cfg.timing.tick_ms, 1000);
        assert_eq!(cfg.timing.idle_poll_ms, 500);
        assert_eq!(cfg.timing.soil_period_ms, 2000);
        assert_eq!(cfg.timing.climate_period_ms, 5000);
        assert_eq!(cfg.maintenance.threshold, 30);
        assert!(cfg.web.enabled);
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let cfg = parse(include_str!("../../../config.toml")).unwrap();
        let defaults = Config::default();
        assert_eq!(cfg.classifier.thresholds, defaults.classifier.thresholds);
        assert_eq!(cfg.timing.water_seconds, defaults.timing.water_seconds);
        assert_eq!(cfg.pins.relay, defaults.pins.relay);
        assert_eq!(cfg.pins.intrusion, defaults.pins.intrusion);
        assert_eq!(cfg.sim.scenario, defaults.sim.scenario);
    }

    #[test]
    fn parse_partial_section_keeps_other_defaults() {
        let cfg = parse("[timing]\nwater_seconds = 5\n").unwrap();
        assert_eq!(cfg.timing.water_seconds, 5);
        assert_eq!(cfg.timing.tick_ms, 1000);
    }

    #[test]
    fn parse_rejects_unknown_scenario() {
        let err = parse("[sim]\nscenario = \"flooded\"\n").unwrap_err();
        assert!(format!("{err:#}").contains("flooded"), "{err:#}");
    }

    #[test]
    fn parse_rejects_bad_toml() {
        assert!(parse("[timing\nwater_seconds = ").is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = load_or_default("/nonexistent/irrigation-config.toml").unwrap();
        assert_eq!(cfg.maintenance.threshold, 30);
    }

    // -- Validation -------------------------------------------------------

    #[test]
    fn default_config_passes() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn thresholds_wrong_length_rejected() {
        let mut cfg = Config::default();
        cfg.classifier.thresholds = vec![1000, 1500];
        assert_validation_err(&cfg, "exactly 3 entries");
    }

    #[test]
    fn thresholds_not_ascending_rejected() {
        let mut cfg = Config::default();
        cfg.classifier.thresholds = vec![1000, 1000, 2000];
        assert_validation_err(&cfg, "strictly ascending");
    }

    #[test]
    fn thresholds_zero_rejected() {
        let mut cfg = Config::default();
        cfg.classifier.thresholds = vec![0, 1500, 2000];
        assert_validation_err(&cfg, "thresholds[0] must be positive");
    }

    #[test]
    fn humidity_ceiling_out_of_range() {
        let mut cfg = Config::default();
        cfg.classifier.humidity_ceiling = 120.0;
        assert_validation_err(&cfg, "humidity_ceiling");
    }

    #[test]
    fn zero_periods_rejected() {
        let mut cfg = Config::default();
        cfg.timing.tick_ms = 0;
        cfg.timing.console_timeout_ms = 0;
        assert_validation_err(&cfg, "timing.tick_ms must be positive");
        assert_validation_err(&cfg, "timing.console_timeout_ms must be positive");
    }

    #[test]
    fn zero_water_seconds_rejected() {
        let mut cfg = Config::default();
        cfg.timing.water_seconds = 0;
        assert_validation_err(&cfg, "water_seconds must be positive");
    }

    #[test]
    fn zero_maintenance_threshold_rejected() {
        let mut cfg = Config::default();
        cfg.maintenance.threshold = 0;
        assert_validation_err(&cfg, "maintenance.threshold must be positive");
    }

    #[test]
    fn reserved_gpio_pin_rejected() {
        let mut cfg = Config::default();
        cfg.pins.relay = 1;
        assert_validation_err(&cfg, "not a valid BCM GPIO pin");
    }

    #[test]
    fn gpio_pin_28_rejected() {
        let mut cfg = Config::default();
        cfg.pins.alert = 28;
        assert_validation_err(&cfg, "not a valid BCM GPIO pin");
    }

    #[test]
    fn duplicate_gpio_pin_rejected() {
        let mut cfg = Config::default();
        cfg.pins.servo = cfg.pins.relay;
        assert_validation_err(&cfg, "already used by another pin");
    }

    #[test]
    fn intrusion_pin_must_not_share_an_output() {
        let mut cfg = Config::default();
        cfg.pins.intrusion = cfg.pins.alert;
        assert_validation_err(&cfg, "pins.intrusion 27 is already used");

        cfg.pins.intrusion = 28;
        assert_validation_err(&cfg, "pins.intrusion 28 is not a valid BCM GPIO pin");
    }

    #[test]
    fn web_port_zero_rejected_only_when_enabled() {
        let mut cfg = Config::default();
        cfg.web.port = 0;
        assert_validation_err(&cfg, "web.port");
        cfg.web.enabled = false;
        cfg.validate().unwrap();
    }

    #[test]
    fn intrusion_probability_out_of_range() {
        let mut cfg = Config::default();
        cfg.sim.intrusion_probability = 1.5;
        assert_validation_err(&cfg, "intrusion_probability");
    }

    #[test]
    fn multiple_errors_collected() {
        let mut cfg = Config::default();
        cfg.classifier.thresholds = vec![2000, 1000];
        cfg.timing.tick_ms = 0;
        cfg.pins.relay = 0;
        let msg = format!("{:#}", cfg.validate().unwrap_err());
        // Should report many errors, not bail after the first
        assert!(msg.contains("exactly 3 entries"), "missing length error in: {msg}");
        assert!(msg.contains("strictly ascending"), "missing order error in: {msg}");
        assert!(msg.contains("tick_ms"), "missing timing error in: {msg}");
        assert!(msg.contains("not a valid BCM GPIO pin"), "missing gpio error in: {msg}");
    }
}
