//! Fan-out and fan-in of loop steps.
//!
//! The loop function runs once per element of the iterable, producing one spec per element.
//! Every branch is materialized concurrently against a child session of the loop's session,
//! so branches never write into each other. Once all branches complete, their writes are
//! merged back into the loop's session in element order: when two branches write the same
//! key, the branch with the higher element index wins, regardless of completion order.
//!
//! The value each branch stored under its own context key is additionally collected, in
//! element order, into a `Vec<SessionValue>` stored under the loop's context key.
//!
//! The first failing branch fails the loop. Branches still in flight are dropped with it.

use std::sync::Arc;

use futures::{FutureExt, TryFutureExt, future};

use super::{Materializer, MaterializeFuture, MaterializerFactory, mismatched};
use crate::{
    error::MaterializeError,
    session::{SessionValue, UserSession},
    spec::{Spec, SpecKind, SpecTag},
};

#[derive(Debug, Clone, Copy, Default)]
pub struct LoopMaterializer;

impl Materializer for LoopMaterializer {
    fn materialize(
        &self,
        factory: &Arc<MaterializerFactory>,
        spec: Spec,
        session: UserSession,
    ) -> MaterializeFuture {
        let SpecKind::ForEach(builder) = spec.kind() else {
            return mismatched(&spec, SpecTag::ForEach);
        };
        let Some(branches) = builder.expand(&session) else {
            tracing::error!(
                "Loop {} has no iterable under {:?} for user {}",
                spec.path(),
                builder.key(),
                session.user().id
            );
            let err = MaterializeError::UnresolvedIterationSource {
                key: builder.key().to_string(),
            };
            return future::ready(Err(err)).boxed();
        };
        tracing::debug!("Loop {} fanning out into {} branch(es)", spec.path(), branches.len());

        let scope = spec.parent().unwrap_or(spec.name()).to_string();
        let root = Arc::new(session);
        let pending: Vec<_> = branches
            .into_iter()
            .map(|branch| {
                let branch = branch.with_parent(scope.clone());
                let result_key = branch.context_key().to_string();
                let child = UserSession::child_of(&root);
                factory
                    .materialize(branch, child)
                    .map_ok(move |out| (result_key, out))
            })
            .collect();

        async move {
            let outcomes = match future::try_join_all(pending).await {
                Ok(outcomes) => outcomes,
                Err(e) => {
                    tracing::error!("Loop {} failed: {e}", spec.path());
                    return Err(e);
                }
            };

            let mut session = Arc::try_unwrap(root).unwrap_or_else(|shared| (*shared).clone());
            let mut results: Vec<SessionValue> = Vec::with_capacity(outcomes.len());
            for (result_key, branch) in outcomes {
                let values = branch.into_local_values();
                if let Some(value) = values.get(&result_key) {
                    results.push(Arc::clone(value));
                }
                session.extend(values);
            }
            session.insert(spec.context_key(), results);
            Ok(session)
        }
        .boxed()
    }
}
