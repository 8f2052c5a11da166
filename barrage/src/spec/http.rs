use bytes::Bytes;
use ::http::{HeaderMap, HeaderName, HeaderValue, Method};

use super::{Capabilities, RetryPolicy, Spec, SpecKind, Template};
use crate::{
    error::MaterializeError, measurement::MeasurementMode, session::UserSession,
    transport::{HttpRequest, Response},
};

/// The request part of a request spec: what to send, resolved per session.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub url: Template,
    pub headers: Vec<(String, Template)>,
    pub body: Option<Template>,
}

impl RequestSpec {
    pub fn resolve(&self, step: &str, session: &UserSession) -> Result<HttpRequest, MaterializeError> {
        let url = self.url.resolve(session)?;
        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| MaterializeError::Step {
                step: step.to_string(),
                reason: format!("invalid header name `{name}`: {e}"),
            })?;
            let value = value.resolve(session)?;
            let value = HeaderValue::from_str(&value).map_err(|e| MaterializeError::Step {
                step: step.to_string(),
                reason: format!("invalid value for header `{name}`: {e}"),
            })?;
            headers.append(name, value);
        }
        let body = match &self.body {
            Some(t) => Some(Bytes::from(t.resolve(session)?)),
            None => None,
        };
        Ok(HttpRequest {
            method: self.method.clone(),
            url,
            headers,
            body,
        })
    }
}

/// Builder of a request step. Start with [`http`].
///
/// ```rust
/// use barrage::spec::http;
///
/// let spec = http("discovery")
///     .get("http://{host}/api/discovery")
///     .header("Accept", "application/json")
///     .save_to("discovery")
///     .cumulative_measurement();
/// ```
#[derive(Debug, Clone)]
pub struct HttpSpec {
    name: String,
    request: RequestSpec,
    save_to: Option<String>,
    capabilities: Capabilities,
}

/// Starts a request step named `name`. The name keys its measurements.
pub fn http(name: impl Into<String>) -> HttpSpec {
    HttpSpec {
        name: name.into(),
        request: RequestSpec {
            method: Method::GET,
            url: Template::Static(String::new()),
            headers: Vec::new(),
            body: None,
        },
        save_to: None,
        capabilities: Capabilities::default(),
    }
}

impl HttpSpec {
    pub fn method(mut self, method: Method, url: impl Into<Template>) -> Self {
        self.request.method = method;
        self.request.url = url.into();
        self
    }

    pub fn get(self, url: impl Into<Template>) -> Self {
        self.method(Method::GET, url)
    }

    pub fn post(self, url: impl Into<Template>) -> Self {
        self.method(Method::POST, url)
    }

    pub fn put(self, url: impl Into<Template>) -> Self {
        self.method(Method::PUT, url)
    }

    pub fn patch(self, url: impl Into<Template>) -> Self {
        self.method(Method::PATCH, url)
    }

    pub fn delete(self, url: impl Into<Template>) -> Self {
        self.method(Method::DELETE, url)
    }

    pub fn head(self, url: impl Into<Template>) -> Self {
        self.method(Method::HEAD, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<Template>) -> Self {
        self.request.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Template>) -> Self {
        self.request.body = Some(body.into());
        self
    }

    /// Session key the response is stored under. Defaults to the step name.
    pub fn save_to(mut self, key: impl Into<String>) -> Self {
        self.save_to = Some(key.into());
        self
    }

    pub fn no_measurement(mut self) -> Self {
        self.capabilities.measurement = MeasurementMode::None;
        self
    }

    /// Folds every execution of this step into a single measurement per scenario, emitted when
    /// the run ends.
    pub fn cumulative_measurement(mut self) -> Self {
        self.capabilities.measurement = MeasurementMode::Cumulative;
        self
    }

    /// Re-executes the request while `predicate` holds, at most `max_retries` more times.
    pub fn retry_if<P>(mut self, predicate: P, max_retries: usize) -> Self
    where
        P: Fn(&Response) -> bool + Send + Sync + 'static,
    {
        self.capabilities.retry = Some(RetryPolicy::new(predicate, max_retries));
        self
    }
}

impl From<HttpSpec> for Spec {
    fn from(spec: HttpSpec) -> Self {
        let context_key = spec.save_to.unwrap_or_else(|| spec.name.clone());
        Spec::new(spec.name, SpecKind::Request(spec.request))
            .with_context_key(context_key)
            .with_capabilities(spec.capabilities)
    }
}
