//! Instrumented lifecycle of a single request step.
//!
//! [`RequestLifecycle`] is a finite-state machine with one transition per transport
//! callback:
//!
//! ```text
//! Pending --sent--> Sent --status--> StatusReceived --headers--> HeadersReceived
//!     --body*--> BodyAccumulating --completed--> Completed
//! ```
//!
//! `Failed` is reachable from every non-terminal state. A START event is recorded when the
//! request is sent; the END event and the step metric are recorded only on completion, so a
//! transport failure leaves no END event behind.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};

use crate::{
    dispatcher::EventDispatcher,
    error::{MaterializeError, TransportError},
    measurement::{Measurement, MeasurementMode, UserEvent},
    transport::{LifecycleHandler, Response, Signal},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Pending,
    Sent,
    StatusReceived,
    HeadersReceived,
    BodyAccumulating,
    Completed,
    Failed,
}

impl LifecycleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Identifies the step a lifecycle measures.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub scenario: String,
    pub step: String,
    pub user_id: usize,
    pub mode: MeasurementMode,
}

#[derive(Debug)]
pub struct RequestLifecycle {
    ctx: StepContext,
    dispatcher: Arc<EventDispatcher>,
    state: LifecycleState,
    measurement: Measurement,
    start: Option<SystemTime>,
    elapsed: Option<Duration>,
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
    error: Option<MaterializeError>,
}

impl RequestLifecycle {
    pub fn new(ctx: StepContext, dispatcher: Arc<EventDispatcher>) -> Self {
        let measurement = Measurement::new(ctx.scenario.clone(), ctx.user_id);
        Self {
            ctx,
            dispatcher,
            state: LifecycleState::Pending,
            measurement,
            start: None,
            elapsed: None,
            status: None,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
            error: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Time between request dispatch and completion, once completed.
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    pub fn measurement(&self) -> &Measurement {
        &self.measurement
    }

    /// Resolves the outcome of the transport call into the step's result.
    pub fn finish(self, outcome: Result<(), TransportError>) -> Result<Response, MaterializeError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        outcome.map_err(|source| MaterializeError::Transport {
            step: self.ctx.step.clone(),
            source,
        })?;
        match (self.state, self.status) {
            (LifecycleState::Completed, Some(status)) => Ok(Response {
                status,
                headers: self.headers,
                body: self.body.freeze(),
            }),
            (state, _) => Err(MaterializeError::Lifecycle {
                step: self.ctx.step,
                reason: format!("transport returned while the request was {state:?}"),
            }),
        }
    }

    fn advance(&mut self, allowed: &[LifecycleState], next: LifecycleState, event: &str) -> Signal {
        if allowed.contains(&self.state) {
            self.state = next;
            Signal::Continue
        } else {
            self.violation(format!("{event} while {:?}", self.state));
            Signal::Abort
        }
    }

    fn violation(&mut self, reason: String) {
        tracing::error!("Step {} lifecycle violation: {reason}", self.ctx.step);
        self.state = LifecycleState::Failed;
        self.error.get_or_insert(MaterializeError::Lifecycle {
            step: self.ctx.step.clone(),
            reason,
        });
    }

    fn record(&mut self, event: UserEvent) {
        if self.ctx.mode != MeasurementMode::None {
            self.measurement.record(event);
        }
    }

    fn emit(&mut self) {
        let measurement = std::mem::replace(
            &mut self.measurement,
            Measurement::new(self.ctx.scenario.clone(), self.ctx.user_id),
        );
        match self.ctx.mode {
            MeasurementMode::Standard => self.dispatcher.dispatch(measurement),
            MeasurementMode::Cumulative => self.dispatcher.accumulate(&self.ctx.step, measurement),
            MeasurementMode::None => {}
        }
    }
}

impl LifecycleHandler for RequestLifecycle {
    fn on_request_sent(&mut self, at: SystemTime) {
        if self.advance(&[LifecycleState::Pending], LifecycleState::Sent, "request sent") == Signal::Abort {
            return;
        }
        self.start = Some(at);
        let event = UserEvent::start(self.ctx.user_id, self.ctx.scenario.clone(), at);
        self.record(event);
    }

    fn on_status_received(&mut self, status: StatusCode) -> Signal {
        let signal = self.advance(
            &[LifecycleState::Sent],
            LifecycleState::StatusReceived,
            "status received",
        );
        if signal == Signal::Continue {
            self.status = Some(status);
        }
        signal
    }

    fn on_headers_received(&mut self, headers: HeaderMap) -> Signal {
        let signal = self.advance(
            &[LifecycleState::StatusReceived],
            LifecycleState::HeadersReceived,
            "headers received",
        );
        if signal == Signal::Continue {
            self.headers.extend(headers);
        }
        signal
    }

    fn on_body_part_received(&mut self, chunk: Bytes) -> Signal {
        let signal = self.advance(
            &[LifecycleState::HeadersReceived, LifecycleState::BodyAccumulating],
            LifecycleState::BodyAccumulating,
            "body part received",
        );
        if signal == Signal::Continue {
            self.body.extend_from_slice(&chunk);
        }
        signal
    }

    fn on_completed(&mut self, at: SystemTime) {
        let signal = self.advance(
            &[LifecycleState::HeadersReceived, LifecycleState::BodyAccumulating],
            LifecycleState::Completed,
            "completed",
        );
        let (Signal::Continue, Some(start)) = (signal, self.start) else {
            return;
        };
        // A wall clock stepping backwards yields zero rather than a bogus duration.
        let elapsed = at.duration_since(start).unwrap_or_default();
        self.elapsed = Some(elapsed);

        if self.ctx.mode != MeasurementMode::None {
            let status = self.status.map(|s| s.as_u16().to_string()).unwrap_or_default();
            self.measurement.measure(self.ctx.step.clone(), status, elapsed);
            let event = UserEvent::end(self.ctx.user_id, self.ctx.scenario.clone(), start, elapsed);
            self.record(event);
            self.emit();
        }
    }

    fn on_failed(&mut self, error: &TransportError) {
        if self.state.is_terminal() {
            return;
        }
        tracing::debug!("Step {} failed in state {:?}: {error}", self.ctx.step, self.state);
        self.state = LifecycleState::Failed;
    }
}
