//! Irrigation sequencer: waters dry zones one at a time, in ascending zone
//! order, and keeps the cycle/maintenance counters.
//!
//! ```text
//!            ┌──[mask empty, no manual start]──┐
//!            ▼                                 │
//!          Idle ──[dry zone or manual start]──▶ Watering(zone) ──tick──┐
//!            ▲                                   │   ▲                 │
//!            │                                   │   └─────────────────┘
//!            │             [time up | stop | intrusion]
//!            │                                   ▼
//!            ├──────────[pause]────────── ZoneComplete
//!            │                                   │ [counter hit threshold]
//!            │                                   ▼
//!            └──────────[pause]────────── MaintenancePause
//! ```
//!
//! Within a tick, the stop flag and the intrusion input are checked before
//! any watering time is spent, so either signal ends the zone within one
//! tick. A zone that ends early still counts as a completed cycle.

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::classifier::{DryZoneMask, ZONE_COUNT};
use crate::config::{Config, TimingConfig};
use crate::gateway::{ActuatorGateway, SensorGateway};
use crate::scheduler::sleep_or_cancel;
use crate::state::{EventKind, Phase, SharedState};

// ---------------------------------------------------------------------------
// Servo indicator
// ---------------------------------------------------------------------------

/// Indicator angle keyed on the exact dry-zone mask at zone entry. This is
/// a lookup on the whole mask, not a count of dry zones: 0x05 maps to the
/// fallback even though two zones are dry.
const SERVO_ANGLES: [(u8, u8); 2] = [(0x01, 45), (0x03, 90)];
const SERVO_FALLBACK: u8 = 135;

pub fn servo_angle_for(mask: DryZoneMask) -> u8 {
    SERVO_ANGLES
        .iter()
        .find(|(bits, _)| *bits == mask.bits())
        .map(|(_, angle)| *angle)
        .unwrap_or(SERVO_FALLBACK)
}

// ---------------------------------------------------------------------------
// Zone session
// ---------------------------------------------------------------------------

/// How a zone's watering loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneOutcome {
    Completed,
    Aborted,
    Intrusion,
    /// Controller shutting down; the cycle is not counted.
    Cancelled,
}

impl fmt::Display for ZoneOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
            Self::Intrusion => write!(f, "stopped by intrusion"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Live only while one zone is being watered.
struct ZoneSession {
    zone: u8,
    remaining_s: u32,
    servo_angle: u8,
}

// ---------------------------------------------------------------------------
// Sequencer
// ---------------------------------------------------------------------------

pub struct Irrigation<A> {
    shared: SharedState,
    sensors: Arc<dyn SensorGateway>,
    actuators: Arc<Mutex<A>>,
    timing: TimingConfig,
    maintenance_threshold: u32,
    cancel: CancellationToken,
}

impl<A: ActuatorGateway> Irrigation<A> {
    pub fn new(
        cfg: &Config,
        shared: SharedState,
        sensors: Arc<dyn SensorGateway>,
        actuators: Arc<Mutex<A>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            shared,
            sensors,
            actuators,
            timing: cfg.timing.clone(),
            maintenance_threshold: cfg.maintenance.threshold,
            cancel,
        }
    }

    /// Run until cancelled. Intended to be spawned by the scheduler.
    pub async fn run(self) {
        info!(
            water_s = self.timing.water_seconds,
            tick_ms = self.timing.tick_ms,
            maintenance_threshold = self.maintenance_threshold,
            "irrigation sequencer started"
        );

        while !self.cancel.is_cancelled() {
            let mask = self.shared.dry_zones().await;
            if mask.is_empty() && !self.shared.flags.start_pending() {
                if !sleep_or_cancel(&self.cancel, self.timing.idle_poll()).await {
                    break;
                }
                continue;
            }
            if !self.run_pass().await {
                break;
            }
        }

        self.actuators.lock().await.all_off();
        self.shared.write().await.phase = Phase::Idle;
        info!("irrigation sequencer stopped");
    }

    /// One ascending sweep over the zones. The mask is re-read before each
    /// zone so zones that became wet meanwhile are skipped. Returns `false`
    /// if cancelled part-way.
    pub async fn run_pass(&self) -> bool {
        for zone in 0..ZONE_COUNT {
            let mask = self.shared.dry_zones().await;
            let manual = self.shared.flags.take_start();
            if !mask.contains(zone) && !manual {
                continue;
            }
            self.shared.flags.clear_abort();

            let outcome = self.water_zone(zone, mask, manual).await;
            if outcome == ZoneOutcome::Cancelled {
                return false;
            }
            if !self.finish_zone(zone, outcome).await {
                return false;
            }
        }
        true
    }

    // -----------------------------------------------------------------------
    // Watering(zone)
    // -----------------------------------------------------------------------

    async fn water_zone(&self, zone: u8, mask: DryZoneMask, manual: bool) -> ZoneOutcome {
        let mut session = ZoneSession {
            zone,
            remaining_s: self.timing.water_seconds,
            servo_angle: servo_angle_for(mask),
        };

        info!(
            zone = zone + 1,
            dry_zones = %mask,
            manual,
            servo = session.servo_angle,
            "=== starting watering zone ==="
        );
        {
            let mut st = self.shared.write().await;
            st.phase = Phase::Watering(zone);
            st.record_event(
                EventKind::Watering,
                format!(
                    "zone {} watering started (dry zones {mask}{})",
                    zone + 1,
                    if manual { ", manual start" } else { "" }
                ),
            );
        }
        {
            let mut act = self.actuators.lock().await;
            act.display_clear();
            act.display_write(0, 0, &format!("Watering Z{}", zone + 1));
            act.set_pump(true);
            act.set_servo_angle(session.servo_angle);
        }

        let outcome = loop {
            if session.remaining_s == 0 {
                break ZoneOutcome::Completed;
            }

            // ── Cancellation signals (before spending the tick) ──────
            if self.shared.flags.take_abort() {
                warn!(zone = zone + 1, "manual abort requested");
                self.shared.write().await.record_event(
                    EventKind::Abort,
                    format!("zone {} stopped by operator", zone + 1),
                );
                break ZoneOutcome::Aborted;
            }
            if self.sensors.intrusion_detected() {
                let finished = self.handle_intrusion(&session).await;
                break if finished {
                    ZoneOutcome::Intrusion
                } else {
                    ZoneOutcome::Cancelled
                };
            }

            // ── Status + countdown ───────────────────────────────────
            let climate = self.shared.read().await.climate;
            info!(
                zone = zone + 1,
                remaining_s = session.remaining_s,
                temperature = climate.temperature,
                humidity = climate.humidity,
                "watering"
            );
            self.actuators
                .lock()
                .await
                .display_write(1, 0, &format!("Time:{:02}s", session.remaining_s));

            if !sleep_or_cancel(&self.cancel, self.timing.tick()).await {
                break ZoneOutcome::Cancelled;
            }
            session.remaining_s -= 1;
        };

        self.actuators.lock().await.set_pump(false);
        outcome
    }

    /// Pump off at once, alert for the configured time, then clear it.
    /// Returns `false` if cancelled while the alert was showing.
    async fn handle_intrusion(&self, session: &ZoneSession) -> bool {
        warn!(
            zone = session.zone + 1,
            remaining_s = session.remaining_s,
            "INTRUSION detected, stopping watering"
        );
        {
            let mut act = self.actuators.lock().await;
            act.set_pump(false);
            act.set_alert(true);
            act.display_clear();
            act.display_write(0, 0, "INTRUSION ALERT!");
        }
        self.shared.write().await.record_event(
            EventKind::Intrusion,
            format!("intrusion while watering zone {}", session.zone + 1),
        );

        let finished = sleep_or_cancel(&self.cancel, self.timing.intrusion_alert()).await;
        self.actuators.lock().await.set_alert(false);
        finished
    }

    // -----------------------------------------------------------------------
    // ZoneComplete / MaintenancePause
    // -----------------------------------------------------------------------

    async fn finish_zone(&self, zone: u8, outcome: ZoneOutcome) -> bool {
        let (maintenance, cycles) = {
            let mut st = self.shared.write().await;
            st.phase = Phase::ZoneComplete(zone);
            let wrapped = st.counters.record_cycle(self.maintenance_threshold);
            st.record_event(
                EventKind::Watering,
                format!("zone {} finished ({outcome})", zone + 1),
            );
            if wrapped {
                st.phase = Phase::MaintenancePause;
                st.record_event(
                    EventKind::Maintenance,
                    format!(
                        "maintenance required after {} cycles",
                        self.maintenance_threshold
                    ),
                );
            }
            (wrapped, st.counters.cycles_completed)
        };

        info!(zone = zone + 1, %outcome, cycles, "=== finished watering zone ===");
        {
            let mut act = self.actuators.lock().await;
            act.display_clear();
            act.display_write(0, 0, "Zone Done");
            if maintenance {
                warn!("!!! MAINTENANCE REQUIRED !!!");
                act.display_clear();
                act.display_write(0, 0, "Maintenance!");
            }
        }

        let resumed = sleep_or_cancel(&self.cancel, self.timing.zone_pause()).await;
        self.shared.write().await.phase = Phase::Idle;
        resumed
    }
}

// ===========================================================================
// Tests
// ===========================================================================
