use std::{fmt, time::Duration};

use crate::{
    session::UserSession,
    spec::{ForEachBuilder, MapperBuilder, Spec},
};

/// A named chain of specs, run sequentially against one user session.
///
/// Every combinator attaches a new spec as the next child of the chain and hands the chain
/// back, so a scenario reads top to bottom:
///
/// ```rust
/// use std::time::Duration;
/// use barrage::{LoadDsl, spec::{MapperBuilder, http}, transport::Response};
///
/// let dsl = LoadDsl::new("discovery")
///     .run(http("discover").get("http://localhost:8080/api/discovery"))
///     .map(MapperBuilder::from("discover").try_to("endpoint", |r: &Response| {
///         r.json::<serde_json::Value>().ok()?["endpoint"].as_str().map(str::to_string)
///     }))
///     .wait(Duration::from_millis(100))
///     .run(http("resource").get("{endpoint}"));
///
/// assert_eq!(dsl.children().len(), 4);
/// ```
///
/// Building a chain has no side effects; nothing runs until it is materialized.
#[derive(Clone)]
pub struct LoadDsl {
    name: String,
    children: Vec<Spec>,
}

impl LoadDsl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn wait(self, duration: Duration) -> Self {
        self.attach(Spec::wait(duration))
    }

    pub fn run(self, spec: impl Into<Spec>) -> Self {
        self.attach(spec.into())
    }

    pub fn map(self, mapper: MapperBuilder) -> Self {
        self.attach(Spec::map(mapper))
    }

    pub fn for_each(self, builder: ForEachBuilder) -> Self {
        self.attach(Spec::for_each(builder))
    }

    pub fn custom<F>(self, name: impl Into<String>, code: F) -> Self
    where
        F: Fn(&UserSession) -> String + Send + Sync + 'static,
    {
        self.attach(Spec::custom(name, code))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn children(&self) -> &[Spec] {
        &self.children
    }

    fn attach(mut self, spec: Spec) -> Self {
        self.children.push(spec.with_parent(self.name.clone()));
        self
    }
}

impl fmt::Debug for LoadDsl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadDsl")
            .field("name", &self.name)
            .field("children", &self.children)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{SpecTag, http};

    #[test]
    fn combinators_append_in_order() {
        let dsl = LoadDsl::new("checkout")
            .wait(Duration::from_millis(10))
            .run(http("cart").get("http://localhost/cart"))
            .map(MapperBuilder::from("cart").to("status", |r: &crate::transport::Response| {
                r.status().as_u16()
            }))
            .for_each(ForEachBuilder::over::<String, _>("items", |item| {
                http("item").get(format!("http://localhost/items/{item}")).into()
            }))
            .custom("note", |_| "done".into());

        let tags: Vec<SpecTag> = dsl.children().iter().map(Spec::tag).collect();
        assert_eq!(
            tags,
            vec![
                SpecTag::Wait,
                SpecTag::Request,
                SpecTag::Map,
                SpecTag::ForEach,
                SpecTag::Custom
            ]
        );
        assert!(dsl.children().iter().all(|s| s.parent() == Some("checkout")));
    }

    #[test]
    fn nested_dsl_keeps_its_own_children() {
        let inner = LoadDsl::new("login").run(http("token").post("http://localhost/token"));
        let outer = LoadDsl::new("main").run(inner);

        let nested = &outer.children()[0];
        assert_eq!(nested.tag(), SpecTag::Dsl);
        assert_eq!(nested.path(), "main/login");
        let crate::spec::SpecKind::Dsl(dsl) = nested.kind() else {
            panic!("expected a nested dsl");
        };
        assert_eq!(dsl.children()[0].path(), "login/token");
    }
}
