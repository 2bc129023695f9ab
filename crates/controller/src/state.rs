use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::classifier::DryZoneMask;
use crate::gateway::ClimateReading;

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

pub type SharedState = Arc<Shared>;

/// Everything the concurrent activities share. Operator flags are lock-free
/// so consuming one is a single atomic swap; everything else sits behind one
/// `RwLock` that is never held across a sleep.
pub struct Shared {
    pub flags: ControlFlags,
    state: RwLock<SystemState>,
}

impl Shared {
    pub fn new() -> SharedState {
        Arc::new(Self {
            flags: ControlFlags::default(),
            state: RwLock::new(SystemState::new()),
        })
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, SystemState> {
        self.state.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, SystemState> {
        self.state.write().await
    }

    /// Current dry-zone mask.
    pub async fn dry_zones(&self) -> DryZoneMask {
        self.state.read().await.dry_zones
    }
}

// ---------------------------------------------------------------------------
// Operator flags
// ---------------------------------------------------------------------------

/// One-shot operator triggers. `take_*` clears the flag and reports whether
/// it was set, so each request is observed at most once.
#[derive(Debug, Default)]
pub struct ControlFlags {
    manual_start: AtomicBool,
    manual_abort: AtomicBool,
}

impl ControlFlags {
    pub fn request_start(&self) {
        self.manual_start.store(true, Ordering::Release);
    }

    pub fn request_abort(&self) {
        self.manual_abort.store(true, Ordering::Release);
    }

    pub fn start_pending(&self) -> bool {
        self.manual_start.load(Ordering::Acquire)
    }

    pub fn take_start(&self) -> bool {
        self.manual_start.swap(false, Ordering::AcqRel)
    }

    pub fn take_abort(&self) -> bool {
        self.manual_abort.swap(false, Ordering::AcqRel)
    }

    /// Drop an abort left over from before the current zone started.
    pub fn clear_abort(&self) {
        self.manual_abort.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

pub struct SystemState {
    pub started_at: Instant,
    pub moisture: Option<u16>,
    pub climate: ClimateReading,
    pub dry_zones: DryZoneMask,
    pub counters: IrrigationCounters,
    pub phase: Phase,
    pub events: VecDeque<SystemEvent>,
}

/// Where the irrigation sequencer currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "zone", rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Watering(u8),
    ZoneComplete(u8),
    MaintenancePause,
}

impl Phase {
    pub fn label(&self) -> String {
        match self {
            Self::Idle => "idle".to_string(),
            Self::Watering(zone) => format!("watering zone {}", zone + 1),
            Self::ZoneComplete(zone) => format!("zone {} complete", zone + 1),
            Self::MaintenancePause => "maintenance pause".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IrrigationCounters {
    /// Completed zone cycles since the last maintenance wrap.
    pub cycles_completed: u32,
    /// Set when the counter wraps; cleared by the next completed cycle.
    pub maintenance_due: bool,
    pub total_cycles: u64,
}

impl IrrigationCounters {
    /// Count one finished zone cycle. Returns `true` when this cycle hit the
    /// maintenance threshold and the counter wrapped to zero.
    pub fn record_cycle(&mut self, threshold: u32) -> bool {
        self.total_cycles += 1;
        self.cycles_completed += 1;
        if self.cycles_completed >= threshold {
            self.cycles_completed = 0;
            self.maintenance_due = true;
            true
        } else {
            self.maintenance_due = false;
            false
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Watering,
    Abort,
    Intrusion,
    Maintenance,
    Command,
    System,
}

// ---------------------------------------------------------------------------
// JSON response (what the API returns)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub moisture: Option<u16>,
    pub climate: ClimateReading,
    pub dry_zones: DryZoneMask,
    pub counters: IrrigationCounters,
    pub phase: Phase,
    pub manual_start_pending: bool,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

impl SystemState {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            moisture: None,
            climate: ClimateReading::default(),
            dry_zones: DryZoneMask::EMPTY,
            counters: IrrigationCounters::default(),
            phase: Phase::Idle,
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    /// Record a soil sample and the mask derived from it.
    pub fn record_soil(&mut self, moisture: u16, mask: DryZoneMask) {
        self.moisture = Some(moisture);
        self.dry_zones = mask;
    }

    pub fn record_climate(&mut self, climate: ClimateReading) {
        self.climate = climate;
    }

    pub fn record_event(&mut self, kind: EventKind, detail: impl Into<String>) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(SystemEvent {
            ts: OffsetDateTime::now_utc(),
            kind,
            detail: detail.into(),
        });
    }

    #[cfg(test)]
    pub fn events_of(&self, kind: EventKind) -> impl Iterator<Item = &SystemEvent> {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    /// Build the JSON-serialisable status snapshot.
    pub fn to_status(&self, flags: &ControlFlags) -> StatusResponse {
        StatusResponse {
            uptime_secs: self.started_at.elapsed().as_secs(),
            moisture: self.moisture,
            climate: self.climate,
            dry_zones: self.dry_zones,
            counters: self.counters,
            phase: self.phase,
            manual_start_pending: flags.start_pending(),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
