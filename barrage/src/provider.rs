/// A pluggable source of per-iteration values, such as fresh correlation ids.
///
/// Providers are shared by every virtual user of a run, so `take` works through `&self`.
pub trait Provider<T>: Send + Sync {
    /// Pulls one value.
    fn take(&self) -> T;

    /// Diagnostic label.
    fn name(&self) -> String;
}

#[cfg(feature = "builtins")]
pub use builtins::*;

#[cfg(feature = "builtins")]
mod builtins {
    use std::sync::atomic::{AtomicU64, Ordering};

    use uuid::Uuid;

    use super::*;

    /// Random v4 UUIDs, rendered as strings.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct UuidProvider;

    impl Provider<String> for UuidProvider {
        fn take(&self) -> String {
            Uuid::new_v4().to_string()
        }

        fn name(&self) -> String {
            "uuid".to_string()
        }
    }

    /// Monotonic counter starting at `start`.
    #[derive(Debug, Default)]
    pub struct SequenceProvider {
        next: AtomicU64,
    }

    impl SequenceProvider {
        pub fn starting_at(start: u64) -> Self {
            Self {
                next: AtomicU64::new(start),
            }
        }
    }

    impl Provider<u64> for SequenceProvider {
        fn take(&self) -> u64 {
            self.next.fetch_add(1, Ordering::Relaxed)
        }

        fn name(&self) -> String {
            "sequence".to_string()
        }
    }

}
