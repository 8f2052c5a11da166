//! Materializers: turning specs into running computations
//!
//! Every [`SpecTag`] has exactly one [`Materializer`]. Given a spec and the session of one
//! virtual user, a materializer returns *immediately* with a pending future that resolves to
//! the updated session. Nothing blocks the calling task; all I/O is driven by the transport.
//!
//! The [`MaterializerFactory`] owns the dispatch table, built once at construction with the
//! shared dependencies (transport and event dispatcher) injected into the materializers that
//! need them. Materializers that run other specs (chains and loops) dispatch back through the
//! factory they are handed.
//!
//! # Sequencing
//! A chain awaits step N before materializing step N+1, so every step observes the session
//! the previous step committed, including the measurements it dispatched. The first failing
//! step ends the chain; the error is logged with the offending step and returned. Whether the
//! virtual user stops or starts its next iteration is decided by the runner, not here.
//!
//! # Fan-out
//! A loop step materializes one spec per element concurrently, each branch writing into a
//! child session of its own, and merges the branches back in element order once all of them
//! succeed. See [`for_each`].
pub mod for_each;
pub mod request;
pub mod sequence;
pub mod step;

pub use for_each::LoopMaterializer;
pub use request::RequestMaterializer;
pub use sequence::DslMaterializer;
pub use step::{CustomMaterializer, MapMaterializer, WaitMaterializer};

use std::sync::Arc;

use futures::future::{self, BoxFuture};

use crate::{
    dispatcher::EventDispatcher,
    dsl::LoadDsl,
    error::MaterializeError,
    session::UserSession,
    spec::{Spec, SpecTag},
    transport::Transport,
};

/// Pending result of materializing one spec.
pub type MaterializeFuture = BoxFuture<'static, Result<UserSession, MaterializeError>>;

/// Turns one kind of spec, bound to a session, into an asynchronous computation.
pub trait Materializer: Send + Sync {
    fn materialize(
        &self,
        factory: &Arc<MaterializerFactory>,
        spec: Spec,
        session: UserSession,
    ) -> MaterializeFuture;
}

/// Dispatch table from spec tag to materializer.
pub struct MaterializerFactory {
    table: [Arc<dyn Materializer>; SpecTag::COUNT],
}

impl MaterializerFactory {
    pub fn new(transport: Arc<dyn Transport>, dispatcher: Arc<EventDispatcher>) -> Arc<Self> {
        let table = SpecTag::ALL.map(|tag| -> Arc<dyn Materializer> {
            match tag {
                SpecTag::Wait => Arc::new(WaitMaterializer),
                SpecTag::Request => Arc::new(RequestMaterializer::new(
                    Arc::clone(&transport),
                    Arc::clone(&dispatcher),
                )),
                SpecTag::Map => Arc::new(MapMaterializer),
                SpecTag::ForEach => Arc::new(LoopMaterializer),
                SpecTag::Custom => Arc::new(CustomMaterializer),
                SpecTag::Dsl => Arc::new(DslMaterializer),
            }
        });
        Arc::new(Self { table })
    }

    pub fn materializer_for(&self, tag: SpecTag) -> &Arc<dyn Materializer> {
        &self.table[tag.index()]
    }

    /// Materializes `spec` with the materializer registered for its tag.
    pub fn materialize(self: &Arc<Self>, spec: Spec, session: UserSession) -> MaterializeFuture {
        let materializer = Arc::clone(self.materializer_for(spec.tag()));
        materializer.materialize(self, spec, session)
    }

    /// Runs a whole scenario chain for one session.
    pub fn materialize_dsl(self: &Arc<Self>, dsl: &LoadDsl, session: UserSession) -> MaterializeFuture {
        self.materialize(Spec::from(dsl.clone()), session)
    }
}

/// A materializer handed a spec of another tag. The factory never does this.
pub(crate) fn mismatched(spec: &Spec, expected: SpecTag) -> MaterializeFuture {
    let err = MaterializeError::Step {
        step: spec.path(),
        reason: format!("expected a {expected:?} spec, got {:?}", spec.tag()),
    };
    Box::pin(future::ready(Err(err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockTransport, factory, session};
    use std::time::Duration;

    #[test]
    fn every_tag_has_its_own_materializer() {
        let (factory, _stream) = factory(MockTransport::new());
        for a in SpecTag::ALL {
            for b in SpecTag::ALL {
                let same = Arc::ptr_eq(factory.materializer_for(a), factory.materializer_for(b));
                assert_eq!(same, a == b, "{a:?} vs {b:?}");
            }
        }
    }

    #[tokio::test]
    async fn wrong_materializer_reports_mismatch() {
        let (factory, _stream) = factory(MockTransport::new());
        let spec = Spec::wait(Duration::ZERO);
        let result = factory
            .materializer_for(SpecTag::Custom)
            .materialize(&factory, spec, session())
            .await;

        assert!(matches!(result, Err(MaterializeError::Step { .. })));
    }
}
