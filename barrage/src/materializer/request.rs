use std::sync::Arc;

use futures::FutureExt;

use super::{Materializer, MaterializeFuture, MaterializerFactory, mismatched};
use crate::{
    dispatcher::EventDispatcher,
    error::MaterializeError,
    lifecycle::{RequestLifecycle, StepContext},
    session::UserSession,
    spec::{Spec, SpecKind, SpecTag},
    transport::{HttpRequest, Response, Transport},
};

/// Executes request specs through the transport, instrumented by a [`RequestLifecycle`].
///
/// The response is stored in the session under the spec's context key so later steps
/// (maps, custom code, templates) can read it.
#[derive(Clone)]
pub struct RequestMaterializer {
    transport: Arc<dyn Transport>,
    dispatcher: Arc<EventDispatcher>,
}

impl RequestMaterializer {
    pub fn new(transport: Arc<dyn Transport>, dispatcher: Arc<EventDispatcher>) -> Self {
        Self {
            transport,
            dispatcher,
        }
    }
}

async fn execute(
    transport: &dyn Transport,
    dispatcher: &Arc<EventDispatcher>,
    ctx: StepContext,
    request: HttpRequest,
) -> Result<Response, MaterializeError> {
    let mut lifecycle = RequestLifecycle::new(ctx, Arc::clone(dispatcher));
    let outcome = transport.execute(request, &mut lifecycle).await;
    lifecycle.finish(outcome)
}

impl Materializer for RequestMaterializer {
    fn materialize(
        &self,
        _factory: &Arc<MaterializerFactory>,
        spec: Spec,
        mut session: UserSession,
    ) -> MaterializeFuture {
        let SpecKind::Request(request_spec) = spec.kind() else {
            return mismatched(&spec, SpecTag::Request);
        };
        let request_spec = request_spec.clone();
        let transport = Arc::clone(&self.transport);
        let dispatcher = Arc::clone(&self.dispatcher);

        async move {
            let request = request_spec.resolve(spec.name(), &session)?;
            let ctx = StepContext {
                scenario: spec.parent().unwrap_or(spec.name()).to_string(),
                step: spec.name().to_string(),
                user_id: session.user().id,
                mode: spec.capabilities().measurement,
            };

            let mut response =
                execute(transport.as_ref(), &dispatcher, ctx.clone(), request.clone()).await?;
            if let Some(policy) = &spec.capabilities().retry {
                let mut retries = 0;
                while retries < policy.max_retries && policy.should_retry(&response) {
                    retries += 1;
                    tracing::debug!(
                        "Retrying {} ({retries}/{}) after status {}",
                        spec.path(),
                        policy.max_retries,
                        response.status()
                    );
                    response =
                        execute(transport.as_ref(), &dispatcher, ctx.clone(), request.clone()).await?;
                }
            }

            session.insert(spec.context_key(), response);
            Ok(session)
        }
        .boxed()
    }
}
