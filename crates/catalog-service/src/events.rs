// crates/catalog-service/src/events.rs
// ============================================================================
// Module: SSE Event Bus
// Description: The process-wide broadcast channel backing every job's SSE
// stream (spec §4.11, §5, §6).
// Purpose: Give job runners one place to publish `log`/`metrics` events; the
// bus drops events for slow consumers rather than blocking producers (spec
// §5 "full channels drop events silently to preserve liveness").
// Dependencies: serde_json, tokio
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::Event;
use axum::response::sse::KeepAlive;
use axum::response::sse::Sse;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::IntervalStream;

/// Capacity of the broadcast channel; a consumer lagging behind this many
/// events simply misses the oldest ones (spec §5 drop-on-full).
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Interval between SSE heartbeat comments (spec §4.11 "heartbeat every
/// 30s").
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// One event published onto the bus (spec §6 SSE contract).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServiceEvent {
    /// A human-readable progress/status line.
    Log {
        /// Job family the log line belongs to.
        job: &'static str,
        /// The message text.
        message: String,
    },
    /// A metrics snapshot sample (spec §4.11 metrics snapshot collector).
    Metrics {
        /// The sampled snapshot, serialized as-is.
        snapshot: serde_json::Value,
    },
}

impl ServiceEvent {
    /// Returns the SSE `event:` field name for this event.
    #[must_use]
    const fn sse_name(&self) -> &'static str {
        match self {
            Self::Log { .. } => "log",
            Self::Metrics { .. } => "metrics",
        }
    }
}

/// The process-wide event bus every job and the metrics collector publish
/// onto, and every SSE client subscribes to.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ServiceEvent>,
}

impl EventBus {
    /// Creates a new bus with its fixed channel capacity.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publishes an event; silently dropped if no one is listening or a
    /// lagging subscriber's buffer is full (spec §5).
    pub fn publish(&self, event: ServiceEvent) {
        let _ = self.sender.send(event);
    }

    /// Builds the SSE response stream for one client: an initial
    /// `connected` event, then every subsequent bus event, interleaved with
    /// a heartbeat comment every 30s (spec §6).
    #[must_use]
    pub fn stream(&self) -> Sse<impl tokio_stream::Stream<Item = Result<Event, std::convert::Infallible>>> {
        let connected = tokio_stream::iter(vec![Ok(Event::default().event("connected").data("{}"))]);

        let events = BroadcastStream::new(self.sender.subscribe()).filter_map(|message| {
            message.ok().map(|event| {
                let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
                Ok(Event::default().event(event.sse_name()).data(data))
            })
        });

        let heartbeat = IntervalStream::new(tokio::time::interval(HEARTBEAT_INTERVAL))
            .map(|_| Ok(Event::default().comment("heartbeat")));

        Sse::new(connected.chain(events.merge(heartbeat))).keep_alive(KeepAlive::default())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// `GET /events`: the SSE stream handler (spec §6 "SSE").
pub async fn stream(State(state): State<Arc<crate::state::AppState>>) -> Sse<impl tokio_stream::Stream<Item = Result<Event, std::convert::Infallible>>> {
    state.events.stream()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_events_report_the_log_sse_name() {
        let event = ServiceEvent::Log { job: "normalization", message: "started".to_string() };
        assert_eq!(event.sse_name(), "log");
    }

    #[test]
    fn metrics_events_report_the_metrics_sse_name() {
        let event = ServiceEvent::Metrics { snapshot: serde_json::json!({"uptime_seconds": 1}) };
        assert_eq!(event.sse_name(), "metrics");
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(ServiceEvent::Log { job: "normalization", message: "x".to_string() });
    }
}
