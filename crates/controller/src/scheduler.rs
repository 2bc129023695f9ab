//! Fixed composition of the controller's four activities over shared state.
//!
//! ```text
//!  soil sampler ──(moisture, dry-zone mask)──▶ ┌──────────────┐
//!  climate sampler ─────(temp, humidity)─────▶ │ SharedState  │ ◀── web
//!  console ─────────(start / stop flags)─────▶ └──────┬───────┘
//!                                                     ▼
//!                                         irrigation sequencer ──▶ actuators
//! ```
//!
//! The set of activities is fixed at startup. Each one races every
//! suspension point against the cancellation token; none holds a lock across
//! a sleep.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::classifier::{Classifier, DryZoneMask};
use crate::config::Config;
use crate::gateway::{ActuatorGateway, ConsoleChannel, SensorGateway};
use crate::irrigation::Irrigation;
use crate::operator::console_loop;
use crate::state::{EventKind, Phase, SharedState};

/// Sleep for `period` unless cancelled first. Returns `false` on cancel.
pub(crate) async fn sleep_or_cancel(cancel: &CancellationToken, period: Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(period) => true,
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run all four activities until `cancel` fires. A panicking activity
/// cancels the rest.
pub async fn run<A, C>(
    cfg: &Config,
    shared: SharedState,
    sensors: Arc<dyn SensorGateway>,
    actuators: Arc<Mutex<A>>,
    console: C,
    cancel: CancellationToken,
) where
    A: ActuatorGateway,
    C: ConsoleChannel,
{
    // Seed humidity so the first classification is not made against 0 %.
    shared
        .write()
        .await
        .record_climate(sensors.read_climate());

    let mut tasks = JoinSet::new();

    tasks.spawn(soil_loop(
        Arc::clone(&shared),
        Arc::clone(&sensors),
        Arc::clone(&actuators),
        cfg.classifier.classifier(),
        cfg.timing.soil_period(),
        cancel.clone(),
    ));
    tasks.spawn(
        Irrigation::new(
            cfg,
            Arc::clone(&shared),
            Arc::clone(&sensors),
            Arc::clone(&actuators),
            cancel.clone(),
        )
        .run(),
    );
    tasks.spawn(climate_loop(
        Arc::clone(&shared),
        Arc::clone(&sensors),
        cfg.timing.climate_period(),
        cancel.clone(),
    ));
    tasks.spawn(console_loop(
        console,
        Arc::clone(&shared),
        cfg.timing.console_timeout(),
        cancel.clone(),
    ));

    info!(
        soil_period_ms = cfg.timing.soil_period_ms,
        climate_period_ms = cfg.timing.climate_period_ms,
        console_timeout_ms = cfg.timing.console_timeout_ms,
        "scheduler started"
    );
    shared
        .write()
        .await
        .record_event(EventKind::System, "scheduler started");

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!("activity failed: {e}");
            cancel.cancel();
        }
    }
    info!("scheduler stopped");
}

// ---------------------------------------------------------------------------
// Sampling activities
// ---------------------------------------------------------------------------

/// Soil sampler: read, classify against the latest humidity, publish the
/// mask. Refreshes the display only while the sequencer is idle.
async fn soil_loop<A: ActuatorGateway>(
    shared: SharedState,
    sensors: Arc<dyn SensorGateway>,
    actuators: Arc<Mutex<A>>,
    classifier: Classifier,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_mask: Option<DryZoneMask> = None;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let moisture = sensors.read_moisture();
        let (mask, humidity) = {
            let mut st = shared.write().await;
            let humidity = st.climate.humidity;
            let mask = classifier.classify(moisture, humidity);
            st.record_soil(moisture, mask);
            (mask, humidity)
        };

        if last_mask != Some(mask) {
            info!(moisture, humidity, dry_zones = %mask, "dry zones changed");
            last_mask = Some(mask);
        } else {
            debug!(moisture, humidity, dry_zones = %mask, "soil sample");
        }

        // Take the display before checking the phase so the sequencer cannot
        // enter a zone between the check and the write.
        let mut act = actuators.lock().await;
        if shared.read().await.phase == Phase::Idle {
            act.display_clear();
            act.display_write(0, 0, "Soil Dryness:");
            act.display_write(1, 0, &format!("Val:{moisture} Hum:{humidity:.0}%"));
        }
    }
    debug!("soil sampler stopped");
}

async fn climate_loop(
    shared: SharedState,
    sensors: Arc<dyn SensorGateway>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let climate = sensors.read_climate();
        debug!(
            temperature = climate.temperature,
            humidity = climate.humidity,
            "climate sample"
        );
        shared.write().await.record_climate(climate);
    }
    debug!("climate sampler stopped");
}

// ===========================================================================
// Tests
// ===========================================================================
