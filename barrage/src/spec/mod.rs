//! Declarative scenario nodes.
//!
//! A [`Spec`] is one executable step of a scenario. Building specs has no side effects:
//! nothing runs until a [`Materializer`](crate::materializer::Materializer) turns the spec into
//! a future bound to a user session.
pub mod for_each;
pub mod http;
pub mod mapper;
pub mod template;

pub use for_each::ForEachBuilder;
pub use self::http::{HttpSpec, RequestSpec, http};
pub use mapper::MapperBuilder;
pub use template::Template;

use std::{fmt, sync::Arc, time::Duration};

use crate::{dsl::LoadDsl, measurement::MeasurementMode, session::UserSession, transport::Response};

/// Code run by a custom step. Its result is stored under the step's context key.
pub type CustomFn = Arc<dyn Fn(&UserSession) -> String + Send + Sync>;

/// Variant tag of a [`Spec`]. Each tag has exactly one materializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SpecTag {
    Wait,
    Request,
    Map,
    ForEach,
    Custom,
    Dsl,
}

impl SpecTag {
    pub const COUNT: usize = 6;

    pub const ALL: [SpecTag; Self::COUNT] = [
        SpecTag::Wait,
        SpecTag::Request,
        SpecTag::Map,
        SpecTag::ForEach,
        SpecTag::Custom,
        SpecTag::Dsl,
    ];

    /// Position of the tag in [`SpecTag::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone)]
pub enum SpecKind {
    Wait(Duration),
    Request(RequestSpec),
    Map(MapperBuilder),
    ForEach(ForEachBuilder),
    Custom(CustomFn),
    /// A nested chain, run sequentially with the same session.
    Dsl(LoadDsl),
}

/// Author-composed retry of a request step.
///
/// While `predicate` holds for a response the request is executed again, at most
/// `max_retries` additional times.
#[derive(Clone)]
pub struct RetryPolicy {
    pub max_retries: usize,
    predicate: Arc<dyn Fn(&Response) -> bool + Send + Sync>,
}

impl RetryPolicy {
    pub fn new<P>(predicate: P, max_retries: usize) -> Self
    where
        P: Fn(&Response) -> bool + Send + Sync + 'static,
    {
        Self {
            max_retries,
            predicate: Arc::new(predicate),
        }
    }

    pub fn should_retry(&self, response: &Response) -> bool {
        (self.predicate)(response)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

/// Per-spec capability record.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub measurement: MeasurementMode,
    pub retry: Option<RetryPolicy>,
}

/// One declarative node of a scenario.
#[derive(Clone)]
pub struct Spec {
    name: String,
    /// Name of the enclosing DSL, set when the spec is attached to one.
    parent: Option<String>,
    context_key: String,
    capabilities: Capabilities,
    kind: SpecKind,
}

impl Spec {
    pub fn new(name: impl Into<String>, kind: SpecKind) -> Self {
        let name = name.into();
        Self {
            context_key: name.clone(),
            name,
            parent: None,
            capabilities: Capabilities::default(),
            kind,
        }
    }

    pub fn wait(duration: Duration) -> Self {
        Self::new("wait", SpecKind::Wait(duration))
    }

    pub fn map(mapper: MapperBuilder) -> Self {
        let target = mapper.target().to_string();
        Self::new(format!("map:{target}"), SpecKind::Map(mapper)).with_context_key(target)
    }

    pub fn for_each(builder: ForEachBuilder) -> Self {
        let key = builder.key().to_string();
        let context_key = builder.context_key().to_string();
        Self::new(key, SpecKind::ForEach(builder)).with_context_key(context_key)
    }

    pub fn custom<F>(name: impl Into<String>, code: F) -> Self
    where
        F: Fn(&UserSession) -> String + Send + Sync + 'static,
    {
        Self::new(name, SpecKind::Custom(Arc::new(code)))
    }

    pub fn with_context_key(mut self, key: impl Into<String>) -> Self {
        self.context_key = key.into();
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub(crate) fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn context_key(&self) -> &str {
        &self.context_key
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn kind(&self) -> &SpecKind {
        &self.kind
    }

    pub fn tag(&self) -> SpecTag {
        match self.kind {
            SpecKind::Wait(_) => SpecTag::Wait,
            SpecKind::Request(_) => SpecTag::Request,
            SpecKind::Map(_) => SpecTag::Map,
            SpecKind::ForEach(_) => SpecTag::ForEach,
            SpecKind::Custom(_) => SpecTag::Custom,
            SpecKind::Dsl(_) => SpecTag::Dsl,
        }
    }

    /// `parent/name`, used to identify the step in logs.
    pub fn path(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{parent}/{}", self.name),
            None => self.name.clone(),
        }
    }
}

impl From<LoadDsl> for Spec {
    fn from(dsl: LoadDsl) -> Self {
        Self::new(dsl.name().to_string(), SpecKind::Dsl(dsl))
    }
}

impl fmt::Debug for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spec")
            .field("name", &self.name)
            .field("tag", &self.tag())
            .field("parent", &self.parent)
            .field("context_key", &self.context_key)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_follows_variant() {
        let specs = [
            Spec::wait(Duration::from_millis(1)),
            http("get").get("http://localhost/").into(),
            Spec::map(MapperBuilder::from("a").to("b", |v: &String| v.len())),
            Spec::for_each(ForEachBuilder::over::<String, _>("items", |_| {
                Spec::wait(Duration::ZERO)
            })),
            Spec::custom("code", |_| String::new()),
            Spec::from(LoadDsl::new("nested")),
        ];
        let tags: Vec<SpecTag> = specs.iter().map(Spec::tag).collect();
        assert_eq!(tags, SpecTag::ALL.to_vec());
    }

    #[test]
    fn context_key_defaults_to_name() {
        let spec = Spec::custom("token", |_| String::new());
        assert_eq!(spec.context_key(), "token");
        assert_eq!(spec.path(), "token");

        let spec = spec.with_parent("login");
        assert_eq!(spec.parent(), Some("login"));
        assert_eq!(spec.path(), "login/token");
    }

    #[test]
    fn map_stores_under_target() {
        let spec = Spec::map(MapperBuilder::from("discovery").to("endpoint", |v: &String| v.clone()));
        assert_eq!(spec.context_key(), "endpoint");
    }
}
