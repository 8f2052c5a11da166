use std::{any::Any, fmt, sync::Arc};

use super::Spec;
use crate::session::UserSession;

type Expand = Arc<dyn Fn(&UserSession) -> Option<Vec<Spec>> + Send + Sync>;

/// Describes a loop step: pull a collection out of the session and run one spec per element.
///
/// The element type is erased once the builder is constructed; the materializer only sees the
/// specs produced by the loop function.
#[derive(Clone)]
pub struct ForEachBuilder {
    key: String,
    context_key: String,
    expand: Expand,
}

impl ForEachBuilder {
    /// `key` labels the loop in logs and errors. Results are stored under `{key}.results`
    /// unless [`save_to`](Self::save_to) says otherwise, so the iterable is never overwritten.
    ///
    /// The extractor returns `None` when the session holds no iterable for this loop,
    /// which fails the step.
    pub fn new<E, I, X, L>(key: impl Into<String>, extractor: X, loop_function: L) -> Self
    where
        E: 'static,
        I: IntoIterator<Item = E> + 'static,
        X: Fn(&UserSession) -> Option<I> + Send + Sync + 'static,
        L: Fn(E) -> Spec + Send + Sync + 'static,
    {
        let key = key.into();
        let expand: Expand = Arc::new(move |session: &UserSession| {
            extractor(session).map(|items| items.into_iter().map(&loop_function).collect())
        });
        Self {
            context_key: format!("{key}.results"),
            key,
            expand,
        }
    }

    /// Iterates over the `Vec<E>` stored in the session under `session_key`.
    pub fn over<E, L>(session_key: impl Into<String>, loop_function: L) -> Self
    where
        E: Any + Clone + Send + Sync,
        L: Fn(E) -> Spec + Send + Sync + 'static,
    {
        let session_key = session_key.into();
        let lookup = session_key.clone();
        Self::new(
            session_key,
            move |session: &UserSession| session.get::<Vec<E>>(&lookup).map(|items| (*items).clone()),
            loop_function,
        )
    }

    pub fn save_to(mut self, context_key: impl Into<String>) -> Self {
        self.context_key = context_key.into();
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn context_key(&self) -> &str {
        &self.context_key
    }

    /// Runs the extractor and the loop function, once per element.
    pub fn expand(&self, session: &UserSession) -> Option<Vec<Spec>> {
        (self.expand)(session)
    }
}

impl fmt::Debug for ForEachBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForEachBuilder")
            .field("key", &self.key)
            .field("context_key", &self.context_key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::User;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn loop_function_runs_once_per_element() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let builder = ForEachBuilder::over::<String, _>("ids", move |id| {
            counter.fetch_add(1, Ordering::SeqCst);
            Spec::custom(id.clone(), move |_| id.clone())
        });

        let mut session = UserSession::new(User::new(0, "u"));
        session.insert("ids", vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        let specs = builder.expand(&session).unwrap();

        assert_eq!(builder.context_key(), "ids.results");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(specs.iter().map(Spec::name).collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn missing_source_expands_to_none() {
        let builder = ForEachBuilder::over::<u32, _>("numbers", |_| Spec::custom("n", |_| String::new()));
        let mut session = UserSession::new(User::new(0, "u"));
        assert!(builder.expand(&session).is_none());

        session.insert("numbers", vec!["wrong type".to_string()]);
        assert!(builder.expand(&session).is_none());
    }

    #[test]
    fn custom_extractor_and_context_key() {
        let builder = ForEachBuilder::new(
            "range",
            |session: &UserSession| Some(0..session.user().id),
            |i: usize| Spec::custom(format!("step-{i}"), |_| String::new()),
        )
        .save_to("range-results");

        let session = UserSession::new(User::new(2, "u"));
        assert_eq!(builder.expand(&session).map(|s| s.len()), Some(2));
        assert_eq!(builder.key(), "range");
        assert_eq!(builder.context_key(), "range-results");
    }
}
