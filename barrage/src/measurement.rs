use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// How a request step reports its measurements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeasurementMode {
    /// One measurement dispatched per completed request.
    #[default]
    Standard,
    /// Nothing is recorded.
    None,
    /// Every invocation of the step is folded into a single bucket, dispatched once at run end.
    Cumulative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Start,
    End,
}

/// An immutable, timestamped fact about one virtual user's request step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEvent {
    /// Id of the virtual user that produced the event.
    pub id: usize,
    pub scenario: String,
    pub event_type: EventType,
    pub start: SystemTime,
    pub end: SystemTime,
    pub elapsed: Duration,
}

impl UserEvent {
    pub fn start(id: usize, scenario: impl Into<String>, at: SystemTime) -> Self {
        Self {
            id,
            scenario: scenario.into(),
            event_type: EventType::Start,
            start: at,
            end: at,
            elapsed: Duration::ZERO,
        }
    }

    pub fn end(id: usize, scenario: impl Into<String>, start: SystemTime, elapsed: Duration) -> Self {
        Self {
            id,
            scenario: scenario.into(),
            event_type: EventType::End,
            start,
            end: start + elapsed,
            elapsed,
        }
    }
}

/// Metric derived from a completed request step, keyed by step name and status label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepMetric {
    pub step: String,
    pub status: String,
    pub elapsed: Duration,
}

/// Events and derived metrics of one scenario as seen by one user.
///
/// A request step records into its own `Measurement` and hands it to the
/// [`EventDispatcher`](crate::EventDispatcher) once the response is complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub scenario: String,
    pub user_id: usize,
    pub events: Vec<UserEvent>,
    pub metrics: Vec<StepMetric>,
}

impl Measurement {
    pub fn new(scenario: impl Into<String>, user_id: usize) -> Self {
        Self {
            scenario: scenario.into(),
            user_id,
            events: Vec::new(),
            metrics: Vec::new(),
        }
    }

    pub fn record(&mut self, event: UserEvent) {
        self.events.push(event);
    }

    pub fn measure(&mut self, step: impl Into<String>, status: impl Into<String>, elapsed: Duration) {
        self.metrics.push(StepMetric {
            step: step.into(),
            status: status.into(),
            elapsed,
        });
    }

    /// Folds another measurement into this one. Used for cumulative buckets.
    pub fn merge(&mut self, other: Measurement) {
        self.events.extend(other.events);
        self.metrics.extend(other.metrics);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.metrics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_event_spans_elapsed() {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let e = UserEvent::end(1, "login", start, Duration::from_millis(250));

        assert_eq!(e.event_type, EventType::End);
        assert_eq!(e.end.duration_since(e.start).unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn merge_keeps_every_sample() {
        let at = SystemTime::UNIX_EPOCH;
        let mut a = Measurement::new("login", 0);
        a.record(UserEvent::start(0, "login", at));
        a.measure("login", "200", Duration::from_millis(5));

        let mut b = Measurement::new("login", 1);
        b.measure("login", "500", Duration::from_millis(9));
        a.merge(b);

        assert_eq!(a.events.len(), 1);
        assert_eq!(
            a.metrics.iter().map(|m| m.status.as_str()).collect::<Vec<_>>(),
            vec!["200", "500"]
        );
    }
}
