//! Progress and state-change events.
//!
//! Topics follow `<kind>:<what>` (`service:progress`, `tool:enabled`,
//! `build:progress`, `project:deleted`). Emission is fire-and-forget: a sink
//! with no listeners drops events silently.

use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;

use stackvo_core::{UnitKind, UnitName};

/// One event as delivered to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub topic: String,
    pub payload: Value,
}

impl Event {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }

    /// `<kind>:<suffix>` with `unit` merged into `payload`.
    pub fn for_unit(kind: UnitKind, suffix: &str, name: &UnitName, mut payload: Value) -> Self {
        if let Value::Object(map) = &mut payload {
            map.insert("unit".into(), Value::String(name.to_string()));
        } else {
            payload = json!({ "unit": name.as_str() });
        }
        Self::new(format!("{kind}:{suffix}"), payload)
    }

    /// `<kind>:progress` for one lifecycle step.
    pub fn progress(
        kind: UnitKind,
        name: &UnitName,
        step: Step,
        status: StepStatus,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            format!("{kind}:progress"),
            json!({
                "unit": name.as_str(),
                "step": step,
                "status": status,
                "message": message.into(),
            }),
        )
    }
}

/// Receiver of orchestrator events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// Ordered steps of an enable/disable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Dependency,
    Env,
    Generate,
    Container,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::Dependency => "dependency",
            Step::Env => "env",
            Step::Generate => "generate",
            Step::Container => "container",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Done,
    Failed,
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Fan-out sink backed by a tokio broadcast channel.
///
/// Slow subscribers lag and lose the oldest events; emitters never block.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<Event>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: Event) {
        tracing::debug!(topic = %event.topic, "event");
        let _ = self.tx.send(event);
    }
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn topics(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.topic).collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_payload_shape() {
        let ev = Event::progress(
            UnitKind::Service,
            &UnitName::from("redis"),
            Step::Env,
            StepStatus::Done,
            "Configuration updated",
        );
        assert_eq!(ev.topic, "service:progress");
        assert_eq!(
            ev.payload,
            json!({"unit": "redis", "step": "env", "status": "done", "message": "Configuration updated"})
        );
    }

    #[test]
    fn for_unit_merges_name() {
        let ev = Event::for_unit(
            UnitKind::Tool,
            "enabled",
            &UnitName::from("adminer"),
            json!({"configured": true}),
        );
        assert_eq!(ev.topic, "tool:enabled");
        assert_eq!(ev.payload, json!({"unit": "adminer", "configured": true}));
    }

    #[tokio::test]
    async fn broadcast_delivers_to_subscribers() {
        let sink = BroadcastSink::new(8);
        let mut rx = sink.subscribe();
        sink.emit(Event::new("build:start", json!({"project": "blog"})));
        let ev = rx.recv().await.expect("event");
        assert_eq!(ev.topic, "build:start");
    }

    #[test]
    fn broadcast_without_subscribers_is_silent() {
        let sink = BroadcastSink::new(1);
        sink.emit(Event::new("x", Value::Null));
    }
}
