use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;

use crate::Aggregate;

/// Final statistics derived from an [`Aggregate`].
pub trait Report<A>
where
    Self: Send + Sync + Debug + From<A> + Serialize + DeserializeOwned,
    A: Aggregate,
{
}

/// Sends a [`Report`] somewhere: stdout, a file, a database.
#[async_trait]
pub trait Reporter<A: Aggregate, R: Report<A>> {
    async fn report(&self, report: R) -> Result<(), Box<dyn std::error::Error>>;
}

#[cfg(feature = "builtins")]
pub use builtins::*;

#[cfg(feature = "builtins")]
mod builtins {
    use std::{collections::BTreeMap, time::Duration};

    use serde::Deserialize;

    use super::*;
    use crate::aggregate::{BasicAggregate, StepAggregate};

    #[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
    pub struct StepReport {
        pub step: String,
        pub count: usize,
        pub average_latency: Duration,
        pub min_latency: Duration,
        pub max_latency: Duration,
        /// Percentage of 2xx responses.
        pub success_ratio: f64,
        pub statuses: BTreeMap<String, usize>,
    }

    impl StepReport {
        fn new(step: String, agg: StepAggregate) -> Self {
            let successes: usize = agg
                .statuses
                .iter()
                .filter(|(status, _)| status.starts_with('2'))
                .map(|(_, n)| n)
                .sum();
            let (average_latency, success_ratio) = match agg.count {
                0 => (Duration::ZERO, 0.0),
                n => (
                    agg.total_latency.div_f64(n as f64),
                    (successes as f64 / n as f64) * 100.0,
                ),
            };
            Self {
                step,
                count: agg.count,
                average_latency,
                min_latency: agg.min_latency.unwrap_or_default(),
                max_latency: agg.max_latency,
                success_ratio,
                statuses: agg.statuses,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
    pub struct BasicReport {
        pub total_requests: usize,
        pub steps: Vec<StepReport>,
    }

    impl From<BasicAggregate> for BasicReport {
        fn from(value: BasicAggregate) -> Self {
            let steps: Vec<StepReport> = value
                .steps
                .into_iter()
                .map(|(step, agg)| StepReport::new(step, agg))
                .collect();
            Self {
                total_requests: steps.iter().map(|s| s.count).sum(),
                steps,
            }
        }
    }
    impl Report<BasicAggregate> for BasicReport {}

    pub struct StdoutReporter;
    #[async_trait]
    impl Reporter<BasicAggregate, BasicReport> for StdoutReporter {
        async fn report(&self, report: BasicReport) -> Result<(), Box<dyn std::error::Error>> {
            println!("{report:#?}");
            Ok(())
        }
    }

    /// Prints the report as a single JSON document.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct JsonReporter {
        pub pretty: bool,
    }

    #[async_trait]
    impl Reporter<BasicAggregate, BasicReport> for JsonReporter {
        async fn report(&self, report: BasicReport) -> Result<(), Box<dyn std::error::Error>> {
            let value = if self.pretty {
                serde_json::to_string_pretty(&report)?
            } else {
                serde_json::to_string(&report)?
            };
            println!("{value}");
            Ok(())
        }
    }

}
