//! Test doubles shared by the unit tests of this crate.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode, header::CONTENT_LENGTH};

use crate::{
    dispatcher::{EventDispatcher, EventStream},
    error::TransportError,
    materializer::MaterializerFactory,
    session::UserSession,
    transport::{HttpRequest, LifecycleHandler, Signal, Transport},
    user::User,
};

#[derive(Debug, Clone)]
enum Scripted {
    Respond(StatusCode, Bytes),
    Fail(TransportError),
}

#[derive(Debug, Default)]
struct Script {
    routes: HashMap<String, VecDeque<Scripted>>,
    calls: Vec<HttpRequest>,
}

/// In-memory transport answering by exact URL. Clones share routes and the call log.
///
/// Timestamps are synthetic: every request is sent at a fixed instant and completes
/// exactly `latency` later. Unrouted URLs answer 404.
#[derive(Debug, Clone)]
pub struct MockTransport {
    script: Arc<Mutex<Script>>,
    latency: Duration,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script::default())),
            latency: Duration::from_millis(5),
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, url: &str, status: StatusCode, body: &str) -> Self {
        self.sequence(url, vec![(status, body)])
    }

    /// Answers successive calls with `responses` in order, then repeats the last one.
    pub fn sequence(self, url: &str, responses: Vec<(StatusCode, &str)>) -> Self {
        let scripted = responses
            .into_iter()
            .map(|(status, body)| Scripted::Respond(status, Bytes::copy_from_slice(body.as_bytes())))
            .collect();
        self.script.lock().unwrap().routes.insert(url.to_string(), scripted);
        self
    }

    pub fn fail(self, url: &str, error: TransportError) -> Self {
        self.script
            .lock()
            .unwrap()
            .routes
            .insert(url.to_string(), VecDeque::from([Scripted::Fail(error)]));
        self
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Requests received so far, in arrival order.
    pub fn calls(&self) -> Vec<HttpRequest> {
        self.script.lock().unwrap().calls.clone()
    }

    fn next(&self, request: HttpRequest) -> Scripted {
        let mut script = self.script.lock().unwrap();
        let answer = match script.routes.get_mut(&request.url) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        script.calls.push(request);
        answer.unwrap_or(Scripted::Respond(StatusCode::NOT_FOUND, Bytes::new()))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(
        &self,
        request: HttpRequest,
        handler: &mut dyn LifecycleHandler,
    ) -> Result<(), TransportError> {
        let sent = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let (status, body) = match self.next(request) {
            Scripted::Respond(status, body) => (status, body),
            Scripted::Fail(error) => {
                handler.on_failed(&error);
                return Err(error);
            }
        };
        tokio::task::yield_now().await;

        handler.on_request_sent(sent);
        if handler.on_status_received(status) == Signal::Abort {
            return Err(TransportError::Aborted);
        }
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        if handler.on_headers_received(headers) == Signal::Abort {
            return Err(TransportError::Aborted);
        }
        if !body.is_empty() && handler.on_body_part_received(body) == Signal::Abort {
            return Err(TransportError::Aborted);
        }
        handler.on_completed(sent + self.latency);
        Ok(())
    }
}

/// A factory over `transport` with a fresh dispatcher owned only by the factory.
pub fn factory(transport: MockTransport) -> (Arc<MaterializerFactory>, EventStream) {
    let (dispatcher, stream) = EventDispatcher::new();
    (MaterializerFactory::new(Arc::new(transport), dispatcher), stream)
}

pub fn session() -> UserSession {
    UserSession::new(User::new(7, "tester"))
}
