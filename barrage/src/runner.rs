//! Runner: drives every virtual user of a run to completion
//!
//! One Tokio task is spawned per virtual user. Each task waits on the shared start signal,
//! sleeps its ramp-up offset, builds and injects its own simulation instance, and then
//! materializes the simulation's scenarios `iterations` times (or until `duration` elapses).
//!
//! All users share a single [`MaterializerFactory`], and through it one transport and one
//! [`EventDispatcher`]. A spawned aggregator task drains the dispatcher into an [`Aggregate`].
//! Once every user task has finished, the dispatcher is closed (flushing cumulative
//! measurements) and the aggregate is returned.
//!
//! A failing chain never affects other users. What the failing user does next is decided by
//! [`FailurePolicy`].
use std::{marker::PhantomData, sync::Arc};

use futures::future::join_all;
use tokio::{
    sync::watch::{self, Receiver},
    time::Instant,
};
use typed_builder::TypedBuilder;

use crate::{
    aggregate::{self, Aggregate},
    config::{FailurePolicy, RunnerConfig},
    dispatcher::EventDispatcher,
    dsl::LoadDsl,
    error::RunError,
    inject::{Injectable, Injector},
    materializer::MaterializerFactory,
    session::UserSession,
    transport::Transport,
    user::{SequentialUserProvider, User, UserProvider},
};

/// A load test: the scenarios every virtual user runs.
///
/// A fresh instance is created with `Default` and injected for every virtual user, so
/// scenarios can close over the simulation's feeders.
pub trait Simulation: Injectable + Default + Send + Sync + 'static {
    fn scenarios(&self) -> Vec<LoadDsl>;
}

#[derive(TypedBuilder)]
pub struct Runner<A: Aggregate> {
    #[builder(default)]
    pub config: RunnerConfig,
    pub transport: Arc<dyn Transport>,
    /// Defaults to a [`SequentialUserProvider`] of `config.users` users.
    #[builder(default, setter(strip_option))]
    pub users: Option<Arc<dyn UserProvider>>,
    #[builder(default, setter(skip))]
    aggregate: PhantomData<A>,
}

/// Outcome counters of one virtual user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserSummary {
    pub completed: usize,
    pub failed: usize,
    /// Feeders left at their default because their value could not be bound.
    pub injection_failures: usize,
}

#[derive(Clone)]
struct UserContext {
    factory: Arc<MaterializerFactory>,
    config: Arc<RunnerConfig>,
    start: Receiver<bool>,
}

impl<A: Aggregate> Runner<A> {
    pub async fn run<S: Simulation>(&self) -> Result<A, RunError> {
        self.config.validate()?;
        let injector = Arc::new(Injector::<S>::new()?);

        let users: Vec<User> = match &self.users {
            Some(provider) => provider.users(),
            None => SequentialUserProvider::new(self.config.users).users(),
        };
        let users: Vec<User> = users.into_iter().take(self.config.users).collect();
        if users.is_empty() {
            return Err(RunError::NoUsers);
        }

        let (dispatcher, stream) = EventDispatcher::new();
        tracing::info!("Spawning aggregator task...");
        let aggregator = tokio::spawn(aggregate::collect::<A>(stream, self.config.batch_size));

        let (start_tx, start_rx) = watch::channel(false);
        let ctx = UserContext {
            factory: MaterializerFactory::new(Arc::clone(&self.transport), Arc::clone(&dispatcher)),
            config: Arc::new(self.config.clone()),
            start: start_rx,
        };

        tracing::info!("Spawning {} virtual user(s)...", users.len());
        let total = users.len();
        let handles: Vec<_> = users
            .into_iter()
            .enumerate()
            .map(|(index, user)| {
                let ctx = ctx.clone();
                let injector = Arc::clone(&injector);
                let offset = self.config.start_offset(index, total);
                tokio::spawn(async move {
                    let mut start = ctx.start.clone();
                    // The sender outlives every user task.
                    let _ = start.wait_for(|started| *started).await;
                    tokio::time::sleep(offset).await;
                    let (simulation, injection_failures) = prepare(&injector, &user);
                    let summary = run_user(&ctx, user, &simulation).await;
                    UserSummary {
                        injection_failures,
                        ..summary
                    }
                })
            })
            .collect();
        drop(ctx);

        tracing::info!("Running now!");
        start_tx.send_replace(true);

        let mut totals = UserSummary::default();
        for outcome in join_all(handles).await {
            match outcome {
                Ok(summary) => {
                    totals.completed += summary.completed;
                    totals.failed += summary.failed;
                    totals.injection_failures += summary.injection_failures;
                }
                Err(e) => tracing::error!("Virtual user task panicked: {e}"),
            }
        }

        tracing::info!("Closing dispatcher...");
        dispatcher.close();
        let agg = aggregator.await?;
        tracing::info!(
            "Done: {} iteration(s) completed, {} failed",
            totals.completed,
            totals.failed
        );
        if totals.injection_failures > 0 {
            tracing::warn!("{} feeder(s) could not be injected", totals.injection_failures);
        }
        Ok(agg)
    }
}

/// Creates and injects the simulation instance of one user, returning the number of
/// injection points that failed to bind.
fn prepare<S: Simulation>(injector: &Injector<S>, user: &User) -> (S, usize) {
    let mut simulation = S::default();
    let errors = injector.inject(&mut simulation);
    if !errors.is_empty() {
        tracing::warn!(
            "User {} starts with {} unbound feeder(s)",
            user.id,
            errors.len()
        );
    }
    (simulation, errors.len())
}

/// Runs the scenarios of one user until its iterations or its time are used up.
///
/// The session is created once and carried across iterations. A failed chain consumes it;
/// under [`FailurePolicy::ContinueIteration`] the next iteration starts from a fresh one.
async fn run_user<S: Simulation>(ctx: &UserContext, user: User, simulation: &S) -> UserSummary {
    let mut summary = UserSummary::default();
    let scenarios = simulation.scenarios();
    if scenarios.is_empty() {
        tracing::warn!("User {} has no scenarios to run", user.id);
        return summary;
    }

    let began = Instant::now();
    let mut session = Some(UserSession::new(user.clone()));
    let mut iteration = 0;
    'iterations: loop {
        if ctx.config.iterations.is_some_and(|n| iteration >= n)
            || ctx.config.duration.is_some_and(|d| began.elapsed() >= d)
        {
            break;
        }
        iteration += 1;

        for dsl in &scenarios {
            let current = session.take().unwrap_or_else(|| UserSession::new(user.clone()));
            match ctx.factory.materialize_dsl(dsl, current).await {
                Ok(next) => session = Some(next),
                Err(e) => {
                    summary.failed += 1;
                    match ctx.config.failure_policy {
                        FailurePolicy::AbortUser => {
                            tracing::info!("User {} stopping after failure: {e}", user.id);
                            break 'iterations;
                        }
                        FailurePolicy::ContinueIteration => continue 'iterations,
                    }
                }
            }
        }
        summary.completed += 1;
    }

    tracing::debug!("User {} finished: {summary:?}", user.id);
    summary
}
