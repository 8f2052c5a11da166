use std::sync::Arc;

use futures::FutureExt;

use super::{Materializer, MaterializeFuture, MaterializerFactory, mismatched};
use crate::{
    session::UserSession,
    spec::{Spec, SpecKind, SpecTag},
};

/// Suspends the user for the spec's duration without blocking a worker thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct WaitMaterializer;

impl Materializer for WaitMaterializer {
    fn materialize(
        &self,
        _factory: &Arc<MaterializerFactory>,
        spec: Spec,
        session: UserSession,
    ) -> MaterializeFuture {
        let SpecKind::Wait(duration) = *spec.kind() else {
            return mismatched(&spec, SpecTag::Wait);
        };
        async move {
            tokio::time::sleep(duration).await;
            Ok(session)
        }
        .boxed()
    }
}

/// Stores the mapped value under the spec's context key.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapMaterializer;

impl Materializer for MapMaterializer {
    fn materialize(
        &self,
        _factory: &Arc<MaterializerFactory>,
        spec: Spec,
        mut session: UserSession,
    ) -> MaterializeFuture {
        let SpecKind::Map(mapper) = spec.kind() else {
            return mismatched(&spec, SpecTag::Map);
        };
        let mapper = mapper.clone();
        async move {
            let value = mapper.apply(&session)?;
            session.insert_value(spec.context_key(), value);
            Ok(session)
        }
        .boxed()
    }
}

/// Runs author code against the session and stores its output under the context key.
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomMaterializer;

impl Materializer for CustomMaterializer {
    fn materialize(
        &self,
        _factory: &Arc<MaterializerFactory>,
        spec: Spec,
        mut session: UserSession,
    ) -> MaterializeFuture {
        let SpecKind::Custom(code) = spec.kind() else {
            return mismatched(&spec, SpecTag::Custom);
        };
        let code = Arc::clone(code);
        async move {
            let output = code(&session);
            session.insert(spec.context_key(), output);
            Ok(session)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        spec::MapperBuilder,
        testing::{MockTransport, factory, session},
    };
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    #[tokio::test(start_paused = true)]
    async fn wait_suspends_for_the_duration() {
        let (factory, _stream) = factory(MockTransport::new());
        let start = tokio::time::Instant::now();

        factory
            .materialize(Spec::wait(Duration::from_secs(5)), session())
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn map_writes_target_key() {
        let (factory, _stream) = factory(MockTransport::new());
        let mut s = session();
        s.insert("items", vec![1u32, 2, 3]);

        let spec = Spec::map(MapperBuilder::from("items").to("count", |v: &Vec<u32>| v.len()));
        let out = factory.materialize(spec, s).await.unwrap();
        assert_eq!(out.get::<usize>("count").as_deref(), Some(&3));
    }

    #[tokio::test]
    async fn map_of_missing_source_fails() {
        let (factory, _stream) = factory(MockTransport::new());
        let spec = Spec::map(MapperBuilder::from("items").to("count", |v: &Vec<u32>| v.len()));

        let err = factory.materialize(spec, session()).await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn custom_output_lands_under_context_key() {
        let (factory, _stream) = factory(MockTransport::new());
        let spec = Spec::custom("greeting", |s| format!("hello {}", s.user().username))
            .with_context_key("message");

        let out = factory.materialize(spec, session()).await.unwrap();
        assert_eq!(out.get_string("message").as_deref(), Some("hello tester"));
        assert!(out.get_string("greeting").is_none());
    }

    #[tokio::test]
    async fn author_code_runs_only_when_polled() {
        let (factory, _stream) = factory(MockTransport::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let mut s = session();
        s.insert("sku", String::from("A-1"));

        let counter = Arc::clone(&calls);
        let custom = factory.materialize(
            Spec::custom("count", move |_| counter.fetch_add(1, Ordering::SeqCst).to_string()),
            s.clone(),
        );
        let counter = Arc::clone(&calls);
        let map = factory.materialize(
            Spec::map(MapperBuilder::from("sku").to("sku-copy", move |v: &String| {
                counter.fetch_add(1, Ordering::SeqCst);
                v.clone()
            })),
            s,
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        custom.await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let out = map.await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(out.get_string("sku-copy").as_deref(), Some("A-1"));
    }
}
