use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::TransportError;

/// A fully resolved outbound request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// The aggregated response handed back to the session once a request completes.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Returned by the status/header/body callbacks to tell the transport whether to keep
/// delivering the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Continue,
    Abort,
}

/// Callbacks a [`Transport`] delivers over the life of one request, in order:
/// `on_request_sent`, `on_status_received`, `on_headers_received`,
/// `on_body_part_received` (zero or more times), then `on_completed`.
/// `on_failed` may replace any step after `on_request_sent`, or come first.
pub trait LifecycleHandler: Send {
    fn on_request_sent(&mut self, at: SystemTime);
    fn on_status_received(&mut self, status: StatusCode) -> Signal;
    fn on_headers_received(&mut self, headers: HeaderMap) -> Signal;
    fn on_body_part_received(&mut self, chunk: Bytes) -> Signal;
    fn on_completed(&mut self, at: SystemTime);
    fn on_failed(&mut self, error: &TransportError);
}

/// The HTTP client the engine drives. The engine never speaks the wire protocol itself.
///
/// Implementations must not block; request timeouts are the transport's own concern and
/// the only bound on how long a request step may hang.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        request: HttpRequest,
        handler: &mut dyn LifecycleHandler,
    ) -> Result<(), TransportError>;
}

#[cfg(feature = "builtins")]
pub use builtins::*;

#[cfg(feature = "builtins")]
mod builtins {
    use super::*;
    use std::time::Duration;

    /// [`Transport`] backed by a shared `reqwest::Client`.
    ///
    /// Build it once per run; the client pools connections across every virtual user.
    #[derive(Debug, Clone)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
    }

    impl ReqwestTransport {
        pub fn new(timeout: Duration) -> Result<Self, TransportError> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(transport_error)?;
            Ok(Self { client })
        }

        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }

        async fn drive(
            &self,
            request: reqwest::Request,
            handler: &mut dyn LifecycleHandler,
        ) -> Result<(), TransportError> {
            handler.on_request_sent(SystemTime::now());
            let mut response = self.client.execute(request).await.map_err(transport_error)?;

            if handler.on_status_received(response.status()) == Signal::Abort {
                return Err(TransportError::Aborted);
            }
            if handler.on_headers_received(response.headers().clone()) == Signal::Abort {
                return Err(TransportError::Aborted);
            }
            while let Some(chunk) = response.chunk().await.map_err(transport_error)? {
                if handler.on_body_part_received(chunk) == Signal::Abort {
                    return Err(TransportError::Aborted);
                }
            }
            handler.on_completed(SystemTime::now());
            Ok(())
        }
    }

    #[async_trait]
    impl Transport for ReqwestTransport {
        async fn execute(
            &self,
            request: HttpRequest,
            handler: &mut dyn LifecycleHandler,
        ) -> Result<(), TransportError> {
            let mut builder = self
                .client
                .request(request.method, &request.url)
                .headers(request.headers);
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let result = match builder.build() {
                Ok(req) => self.drive(req, handler).await,
                Err(e) => Err(transport_error(e)),
            };
            if let Err(e) = &result {
                handler.on_failed(e);
            }
            result
        }
    }

    fn transport_error(e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Request(e.to_string())
        }
    }
}
