use std::sync::Arc;

use futures::FutureExt;

use super::{Materializer, MaterializeFuture, MaterializerFactory, mismatched};
use crate::{
    session::UserSession,
    spec::{Spec, SpecKind, SpecTag},
};

/// Runs the children of a [`LoadDsl`](crate::LoadDsl) one after another.
#[derive(Debug, Clone, Copy, Default)]
pub struct DslMaterializer;

impl Materializer for DslMaterializer {
    fn materialize(
        &self,
        factory: &Arc<MaterializerFactory>,
        spec: Spec,
        session: UserSession,
    ) -> MaterializeFuture {
        let SpecKind::Dsl(dsl) = spec.kind() else {
            return mismatched(&spec, SpecTag::Dsl);
        };
        let dsl = dsl.clone();
        let factory = Arc::clone(factory);

        async move {
            let mut session = session;
            for child in dsl.children() {
                tracing::debug!(
                    "User {} materializing {} ({:?})",
                    session.user().id,
                    child.path(),
                    child.tag()
                );
                session = match factory.materialize(child.clone(), session).await {
                    Ok(next) => next,
                    Err(e) => {
                        tracing::error!("Scenario {} aborted at step {}: {e}", dsl.name(), child.path());
                        return Err(e);
                    }
                };
            }
            Ok(session)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        LoadDsl,
        error::MaterializeError,
        spec::{MapperBuilder, http},
        testing::{MockTransport, factory, session},
        transport::Response,
    };
    use std::sync::Mutex;

    #[tokio::test]
    async fn each_step_sees_the_previous_result() {
        let (factory, _stream) = factory(MockTransport::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut dsl = LoadDsl::new("chain");
        for k in 0..8usize {
            let seen = Arc::clone(&seen);
            dsl = dsl.custom(format!("step-{k}"), move |s| {
                // Step k must find every earlier step's committed result.
                let visible = (0..k).all(|j| s.contains_key(&format!("step-{j}")));
                seen.lock().unwrap().push((k, visible));
                k.to_string()
            });
        }

        let out = factory.materialize_dsl(&dsl, session()).await.unwrap();
        assert_eq!(out.get_string("step-7").as_deref(), Some("7"));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 8);
        assert!(seen.iter().enumerate().all(|(i, (k, visible))| i == *k && *visible));
    }

    #[tokio::test]
    async fn failure_stops_the_chain() {
        let transport = MockTransport::new();
        let (factory, _stream) = factory(transport.clone());
        let dsl = LoadDsl::new("broken")
            .map(MapperBuilder::from("nothing-here").to("x", |r: &Response| r.status()))
            .run(http("never").get("http://mock/never"));

        let err = factory.materialize_dsl(&dsl, session()).await.unwrap_err();
        assert!(matches!(err, MaterializeError::UnresolvedMappingSource { .. }));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn nested_chains_share_the_session() {
        let (factory, _stream) = factory(MockTransport::new());
        let inner = LoadDsl::new("inner").custom("token", |_| "abc".into());
        let dsl = LoadDsl::new("outer")
            .run(inner)
            .custom("echo", |s| s.get_string("token").unwrap_or_default());

        let out = factory.materialize_dsl(&dsl, session()).await.unwrap();
        assert_eq!(out.get_string("echo").as_deref(), Some("abc"));
    }
}
