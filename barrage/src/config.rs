use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::RunError;

/// What a virtual user does after one of its scenario chains fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop this user; other users keep running.
    AbortUser,
    /// Start the next iteration with a fresh session.
    #[default]
    ContinueIteration,
}

/// Settings of one run.
///
/// Built in code:
/// ```rust
/// use std::time::Duration;
/// use barrage::config::RunnerConfig;
///
/// let config = RunnerConfig::builder()
///     .users(50)
///     .iterations(None)
///     .duration(Duration::from_secs(30))
///     .build();
/// assert!(config.validate().is_ok());
/// ```
///
/// or loaded from JSON, where durations are given in milliseconds and every field is optional:
/// ```rust
/// use barrage::config::{FailurePolicy, RunnerConfig};
///
/// let config = RunnerConfig::from_json(r#"{"users": 10, "failure_policy": "abort_user"}"#).unwrap();
/// assert_eq!(config.users, 10);
/// assert_eq!(config.failure_policy, FailurePolicy::AbortUser);
/// ```
#[derive(Debug, Clone, PartialEq, TypedBuilder, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Upper bound on the number of virtual users taken from the user provider.
    #[builder(default = 1)]
    pub users: usize,
    /// Scenario iterations per user. `None` repeats until `duration` elapses.
    #[builder(default = Some(1))]
    pub iterations: Option<usize>,
    /// Wall-clock bound per user, checked between iterations.
    #[builder(default, setter(into))]
    #[serde(with = "millis::option")]
    pub duration: Option<Duration>,
    /// Users start evenly spread over this window.
    #[builder(default = Duration::ZERO)]
    #[serde(with = "millis")]
    pub ramp_up: Duration,
    /// Applied to the builtin transport; the only bound on a hanging request.
    #[builder(default = Duration::from_secs(30))]
    #[serde(with = "millis")]
    pub request_timeout: Duration,
    #[builder(default)]
    pub failure_policy: FailurePolicy,
    /// Maximum number of buffered measurements folded into the aggregate at once.
    #[builder(default = num_cpus::get() * 16)]
    pub batch_size: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RunnerConfig {
    pub fn from_json(json: &str) -> Result<Self, RunError> {
        let config: Self = serde_json::from_str(json).map_err(|e| RunError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RunError> {
        if self.iterations.is_none() && self.duration.is_none() {
            return Err(RunError::Config(
                "either `iterations` or `duration` must bound the run".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(RunError::Config("`batch_size` must be at least 1".into()));
        }
        Ok(())
    }

    /// Start delay of the user at `index` among `total`.
    pub fn start_offset(&self, index: usize, total: usize) -> Duration {
        match total {
            0 | 1 => Duration::ZERO,
            n => self.ramp_up.mul_f64(index as f64 / n as f64),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
        }
    }
}
