use thiserror::Error;

/// Failure of a single transport call.
///
/// Surfaced to the owning request step; never crashes the process.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("request timed out")]
    Timeout,
    #[error("response handling aborted by the lifecycle handler")]
    Aborted,
}

/// Errors produced while materializing a spec against a session.
///
/// Configuration errors (`UnresolvedIterationSource`, `UnresolvedMappingSource`) are fatal
/// and never retried. Transport errors terminate the current chain of the virtual user.
#[derive(Debug, Clone, Error)]
pub enum MaterializeError {
    #[error("for_each() failed: no iterable found in the session for key `{key}`")]
    UnresolvedIterationSource { key: String },

    #[error("map() failed: no value of the expected type found in the session for key `{key}`")]
    UnresolvedMappingSource { key: String },

    #[error("template `{template}` references missing session key `{key}`")]
    UnresolvedTemplate { template: String, key: String },

    #[error("step `{step}` failed: {source}")]
    Transport {
        step: String,
        #[source]
        source: TransportError,
    },

    #[error("step `{step}` received an out-of-order lifecycle callback: {reason}")]
    Lifecycle { step: String, reason: String },

    #[error("step `{step}` failed: {reason}")]
    Step { step: String, reason: String },
}

impl MaterializeError {
    /// Configuration errors are detected eagerly and never worth retrying.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnresolvedIterationSource { .. }
                | Self::UnresolvedMappingSource { .. }
                | Self::UnresolvedTemplate { .. }
        )
    }
}

/// Errors raised while binding providers into simulation fields.
#[derive(Debug, Clone, Error)]
pub enum InjectionError {
    #[error(
        "session injection into `{field}` is not supported: every spec already receives the user session in its closures"
    )]
    DisallowedSession { field: &'static str },

    #[error(
        "user injection into `{field}` is not supported: every spec already receives the user session in its closures"
    )]
    DisallowedUser { field: &'static str },

    /// Non-fatal: the field is left unset and execution continues.
    #[error("could not bind provider into `{field}`: {reason}")]
    Binding { field: &'static str, reason: String },
}

impl InjectionError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Binding { .. })
    }
}

/// Errors that abort a whole run at setup or teardown.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Injection(#[from] InjectionError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no users available for the run")]
    NoUsers,

    #[error("virtual user task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
