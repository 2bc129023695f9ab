mod actuator;
mod classifier;
mod config;
mod console;
mod gateway;
mod irrigation;
mod operator;
#[cfg(any(test, feature = "gpio"))]
mod pir;
mod scheduler;
mod sim;
mod state;
mod web;

#[cfg(test)]
mod testutil;

use anyhow::Result;
use std::{env, sync::Arc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use actuator::ActuatorBoard;
use console::LineConsole;
use gateway::{ActuatorGateway, SensorGateway};
use sim::SimulatedSensors;
use state::{EventKind, Shared};

#[tokio::main]
async fn main() -> Result<()> {
    // ── Logging (stderr; stdout is the operator console) ────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // ── Config file ─────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::load_or_default(&config_path)?;
    cfg.validate()?;

    // ── Sensors ─────────────────────────────────────────────────────
    let scenario = cfg.sim.scenario;
    let sim = SimulatedSensors::new(scenario, cfg.sim.intrusion_probability);
    let pump_feedback = sim.watering_handle();
    info!(%scenario, intrusion_probability = cfg.sim.intrusion_probability, "sensors ready");
    #[cfg(feature = "gpio")]
    let sensors: Arc<dyn SensorGateway> = Arc::new(pir::WithMotionInput::new(
        sim,
        pir::PirPin::new(cfg.pins.intrusion)?,
    ));
    #[cfg(not(feature = "gpio"))]
    let sensors: Arc<dyn SensorGateway> = Arc::new(sim);

    // ── Actuator board ──────────────────────────────────────────────
    let mut board = ActuatorBoard::new(&cfg.pins)?.with_pump_feedback(pump_feedback);
    board.all_off();
    let actuators = Arc::new(Mutex::new(board));

    // ── Shared state ────────────────────────────────────────────────
    let shared = Shared::new();
    shared
        .write()
        .await
        .record_event(EventKind::System, "controller started");

    let cancel = CancellationToken::new();

    // ── Web API ─────────────────────────────────────────────────────
    if cfg.web.enabled {
        let web_state = Arc::clone(&shared);
        let web_cancel = cancel.clone();
        let port = cfg.web.port;
        tokio::spawn(async move {
            if let Err(e) = web::serve(web_state, port, web_cancel).await {
                error!("web api stopped: {e:#}");
            }
        });
    } else {
        info!("web api disabled");
    }

    // ── Ctrl-C ──────────────────────────────────────────────────────
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("ctrl-c received, shutting down");
                    cancel.cancel();
                }
                Err(e) => warn!("failed to listen for ctrl-c: {e}"),
            }
        });
    }

    // ── Activities ──────────────────────────────────────────────────
    scheduler::run(
        &cfg,
        Arc::clone(&shared),
        sensors,
        Arc::clone(&actuators),
        LineConsole::stdin(),
        cancel,
    )
    .await;

    actuators.lock().await.all_off();
    info!("controller stopped");
    Ok(())
}
