//! Operator commands: parsing, execution against the shared flags, and the
//! console activity that drives them.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::gateway::ConsoleChannel;
use crate::scheduler::sleep_or_cancel;
use crate::state::{EventKind, SharedState};

pub const PROMPT: &str = "Enter command (start/stop/status): ";

/// Short pause after a handled line before prompting again.
const COMMAND_COOLDOWN: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Status,
    Unrecognized,
}

/// Exact, case-sensitive match. Anything else, including an empty line, is
/// [`Command::Unrecognized`].
pub fn parse_command(line: &str) -> Command {
    match line {
        "start" => Command::Start,
        "stop" => Command::Stop,
        "status" => Command::Status,
        _ => Command::Unrecognized,
    }
}

/// Apply a command and return the lines to echo back. `Status` only reads;
/// `Unrecognized` neither mutates nor prints.
pub async fn execute(cmd: Command, shared: &SharedState) -> Vec<String> {
    match cmd {
        Command::Start => {
            shared.flags.request_start();
            info!(source = "console", "manual start requested");
            shared
                .write()
                .await
                .record_event(EventKind::Command, "manual start (console)");
            vec!["Manual start requested!".to_string()]
        }
        Command::Stop => {
            shared.flags.request_abort();
            info!(source = "console", "manual stop requested");
            shared
                .write()
                .await
                .record_event(EventKind::Command, "manual stop (console)");
            vec!["Manual stop requested!".to_string()]
        }
        Command::Status => status_report(shared).await,
        Command::Unrecognized => Vec::new(),
    }
}

async fn status_report(shared: &SharedState) -> Vec<String> {
    let st = shared.read().await;
    vec![
        String::new(),
        "--- System Status ---".to_string(),
        format!("Dry zones: {}", st.dry_zones),
        format!("Temperature: {:.1}C", st.climate.temperature),
        format!("Humidity: {:.1}%", st.climate.humidity),
        format!("Irrigation count: {}", st.counters.cycles_completed),
        format!("State: {}", st.phase.label()),
        format!(
            "Maintenance due: {}",
            if st.counters.maintenance_due { "yes" } else { "no" }
        ),
        "--------------------".to_string(),
    ]
}

/// Console activity: prompt, wait for a line (with timeout), execute it.
pub async fn console_loop<C: ConsoleChannel>(
    mut console: C,
    shared: SharedState,
    read_timeout: Duration,
    cancel: CancellationToken,
) {
    info!("console ready");
    console.write_line(PROMPT);

    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            line = console.read_line(read_timeout) => line,
        };
        let Some(line) = line else {
            continue;
        };

        let cmd = parse_command(&line);
        if cmd == Command::Unrecognized {
            debug!(line = %line, "ignoring unrecognized console input");
        }
        for out in execute(cmd, &shared).await {
            console.write_line(&out);
        }

        if !sleep_or_cancel(&cancel, COMMAND_COOLDOWN).await {
            break;
        }
        console.write_line(PROMPT);
    }
    debug!("console stopped");
}

// ===========================================================================
// Tests
// ===========================================================================
