//! Formatted output helpers for CLI commands.
//!
//! Colored status markers and the live event printer used by `run`.

use std::time::Instant;

use apphost_common::types::RunState;
use apphost_runtime::event::ResourceEvent;
use tokio::sync::broadcast::{self, error::RecvError};

pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const GREEN: &str = "\x1b[32m";
pub const CYAN: &str = "\x1b[36m";
pub const YELLOW: &str = "\x1b[33m";
pub const RED: &str = "\x1b[31m";
pub const RESET: &str = "\x1b[0m";

/// Returns the colored marker shown next to a resource in `state`.
#[must_use]
pub fn state_marker(state: RunState) -> String {
    let color = match state {
        RunState::Pending | RunState::Stopped => DIM,
        RunState::Starting => YELLOW,
        RunState::Running => GREEN,
        RunState::Failed => RED,
    };
    format!("{color}\u{25cf}{RESET}")
}

/// Formats one event as a status line.
#[must_use]
pub fn format_event(event: &ResourceEvent, elapsed_secs: f64) -> String {
    match event {
        ResourceEvent::StateChanged {
            resource,
            to,
            endpoint,
            ..
        } => {
            let target = endpoint
                .as_ref()
                .map_or_else(String::new, |ep| format!(" {CYAN}->{RESET} {ep}"));
            format!(
                "  {} {BOLD}{resource}{RESET} {to}{target} {DIM}[{elapsed_secs:.1}s]{RESET}",
                state_marker(*to)
            )
        }
    }
}

/// Prints events until the orchestrator drops its sender.
pub async fn report_events(mut events: broadcast::Receiver<ResourceEvent>, since: Instant) {
    loop {
        match events.recv().await {
            Ok(event) => {
                eprintln!("{}", format_event(&event, since.elapsed().as_secs_f64()));
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "event printer lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use apphost_common::types::Endpoint;

    use super::*;

    #[test]
    fn marker_color_follows_state() {
        assert!(state_marker(RunState::Running).starts_with(GREEN));
        assert!(state_marker(RunState::Failed).starts_with(RED));
        assert!(state_marker(RunState::Starting).starts_with(YELLOW));
    }

    #[test]
    fn running_event_shows_endpoint() {
        let event = ResourceEvent::StateChanged {
            resource: "api".into(),
            from: RunState::Starting,
            to: RunState::Running,
            endpoint: Some(Endpoint::new("http", "localhost", 5000)),
        };
        let line = format_event(&event, 1.25);
        assert!(line.contains("api"));
        assert!(line.contains("running"));
        assert!(line.contains("http://localhost:5000"));
        assert!(line.contains("[1.2s]") || line.contains("[1.3s]"));
    }

    #[test]
    fn stopped_event_has_no_endpoint() {
        let event = ResourceEvent::StateChanged {
            resource: "cache".into(),
            from: RunState::Running,
            to: RunState::Stopped,
            endpoint: None,
        };
        assert!(!format_event(&event, 0.0).contains("->"));
    }
}
