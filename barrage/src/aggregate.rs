use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;

use crate::{dispatcher::EventStream, measurement::Measurement};

/// The `Aggregate` trait defines how dispatched [`Measurement`]s are folded into a compact,
/// mergeable representation that preserves what a [`Report`](crate::Report) needs.
///
/// Aggregates store raw material (counts, sums, histograms); they do **not** compute final
/// statistics such as averages. That is the job of the report converted from the aggregate.
///
/// # Example
/// ```rust
/// use barrage::{Aggregate, measurement::Measurement};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// struct RequestCount(usize);
///
/// impl Aggregate for RequestCount {
///     fn new() -> Self {
///         Self(0)
///     }
///
///     fn consume(&mut self, measurement: &Measurement) {
///         self.0 += measurement.metrics.len();
///     }
///
///     fn merge(&mut self, other: Self) {
///         self.0 += other.0;
///     }
/// }
/// ```
///
/// # Implementor notes
/// - `merge` must be associative and commutative: per-user aggregates are merged in
///   completion order, which is arbitrary.
/// - A cumulative step arrives as one measurement carrying many metrics, so consume every
///   metric of the measurement rather than assuming one per call.
pub trait Aggregate
where
    Self: Serialize + DeserializeOwned + Send + Sync + Debug + Clone + 'static,
{
    /// Create a new, empty instance of the aggregate.
    fn new() -> Self;

    /// Calls [`consume`](Self::consume) for each measurement.
    fn aggregate(&mut self, measurements: &[Measurement]) {
        measurements.iter().for_each(|m| self.consume(m));
    }

    /// Incorporate a single measurement into the aggregate.
    fn consume(&mut self, measurement: &Measurement);

    /// Combine two different aggregates into one.
    fn merge(&mut self, other: Self);
}

/// Drains `stream` into a fresh aggregate until the dispatcher is closed.
///
/// Measurements that are already buffered are folded in batches of up to `batch_size`.
pub async fn collect<A: Aggregate>(mut stream: EventStream, batch_size: usize) -> A {
    let mut agg = A::new();
    let mut batch = Vec::with_capacity(batch_size);

    // Ends once the dispatcher is closed and every sent measurement was received.
    while let Some(measurement) = stream.recv().await {
        batch.push(measurement);
        while batch.len() < batch_size {
            match stream.try_recv() {
                Some(measurement) => batch.push(measurement),
                None => break,
            }
        }
        agg.aggregate(&batch);
        batch.clear();
    }
    agg
}

#[cfg(feature = "builtins")]
pub use builtins::*;

#[cfg(feature = "builtins")]
mod builtins {
    use std::{collections::BTreeMap, time::Duration};

    use serde::Deserialize;

    use super::*;

    /// Raw totals of one step across every user.
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct StepAggregate {
        pub count: usize,
        pub total_latency: Duration,
        pub min_latency: Option<Duration>,
        pub max_latency: Duration,
        /// Number of responses per status label.
        pub statuses: BTreeMap<String, usize>,
    }

    impl StepAggregate {
        fn record(&mut self, status: &str, elapsed: Duration) {
            self.count += 1;
            self.total_latency += elapsed;
            self.min_latency = Some(self.min_latency.map_or(elapsed, |min| min.min(elapsed)));
            self.max_latency = self.max_latency.max(elapsed);
            *self.statuses.entry(status.to_string()).or_default() += 1;
        }

        fn merge(&mut self, other: Self) {
            self.count += other.count;
            self.total_latency += other.total_latency;
            self.min_latency = match (self.min_latency, other.min_latency) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            self.max_latency = self.max_latency.max(other.max_latency);
            for (status, n) in other.statuses {
                *self.statuses.entry(status).or_default() += n;
            }
        }
    }

    /// The default built-in implementation of [`Aggregate`].
    ///
    /// Keeps, per step name, the request count, total/min/max latency and a histogram of
    /// status labels, plus the number of user events seen. A [`Report`](crate::Report) later
    /// derives averages and success ratios from this data.
    ///
    /// Enabled via the `builtins` feature.
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct BasicAggregate {
        pub steps: BTreeMap<String, StepAggregate>,
        pub events: usize,
        pub measurements: usize,
    }

    impl Aggregate for BasicAggregate {
        fn new() -> Self {
            BasicAggregate::default()
        }

        fn consume(&mut self, measurement: &Measurement) {
            self.measurements += 1;
            self.events += measurement.events.len();
            for metric in &measurement.metrics {
                self.steps
                    .entry(metric.step.clone())
                    .or_default()
                    .record(&metric.status, metric.elapsed);
            }
        }

        fn merge(&mut self, other: Self) {
            self.measurements += other.measurements;
            self.events += other.events;
            for (step, agg) in other.steps {
                self.steps.entry(step).or_default().merge(agg);
            }
        }
    }
}
