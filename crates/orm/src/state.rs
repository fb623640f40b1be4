//! Per-run execution state: metrics and the cascading work queue

use crate::payload::Payload;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

/// One timed lifecycle stage invocation.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StageTiming {
    pub name: String,
    pub ms: f64,
}

/// Run metrics: wall-clock start/end and the per-invocation stage log,
/// in execution order.
#[derive(Debug, Clone, Serialize)]
pub struct Metrics {
    /// Epoch milliseconds at dispatch start.
    pub start: i64,
    /// Epoch milliseconds at dispatch end, set once the run finishes.
    pub end: Option<i64>,
    pub lifecycle: Vec<StageTiming>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start: chrono::Utc::now().timestamp_millis(),
            end: None,
            lifecycle: Vec::new(),
        }
    }

    pub fn record(&mut self, name: &str, elapsed: Duration) {
        self.lifecycle.push(StageTiming {
            name: name.to_string(),
            ms: elapsed.as_secs_f64() * 1000.0,
        });
    }

    pub fn finish(&mut self) {
        self.end = Some(chrono::Utc::now().timestamp_millis());
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-run execution context, created at dispatch start and discarded
/// after metrics are finalized.
#[derive(Debug, Default)]
pub struct State {
    pub metrics: Metrics,
    /// Side queue of payloads enqueued during the run (cascades and other
    /// follow-up work). Drained FIFO after the owning payload completes.
    pub todo: VecDeque<Payload>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a follow-up payload. Enqueue order equals dispatch order.
    pub fn enqueue(&mut self, payload: Payload) {
        self.todo.push_back(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Method;

    #[test]
    fn metrics_log_preserves_order() {
        let mut metrics = Metrics::new();
        metrics.record("preRule", Duration::from_micros(120));
        metrics.record("modify", Duration::from_micros(80));
        metrics.record("rule", Duration::from_micros(45));
        metrics.finish();

        let names: Vec<&str> = metrics.lifecycle.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["preRule", "modify", "rule"]);
        assert!(metrics.lifecycle.iter().all(|t| t.ms >= 0.0));
        assert!(metrics.end.unwrap() >= metrics.start);
    }

    #[test]
    fn todo_queue_is_fifo() {
        let mut state = State::new();
        state.enqueue(Payload::new("a", Method::Create));
        state.enqueue(Payload::new("b", Method::Create));

        assert_eq!(state.todo.pop_front().unwrap().model, "a");
        assert_eq!(state.todo.pop_front().unwrap().model, "b");
        assert!(state.todo.is_empty());
    }
}
