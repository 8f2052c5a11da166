use std::{any::Any, fmt, sync::Arc};

use crate::{
    error::MaterializeError,
    session::{SessionValue, UserSession},
};

type Transform = Arc<dyn Fn(SessionValue) -> Option<SessionValue> + Send + Sync>;

/// Maps one session value into another, e.g. a response into a field of its JSON body.
///
/// ```rust
/// use barrage::{spec::MapperBuilder, transport::Response};
///
/// let mapper = MapperBuilder::from("discovery").try_to("endpoint", |r: &Response| {
///     r.json::<serde_json::Value>().ok()?["endpoint"].as_str().map(str::to_string)
/// });
/// ```
#[derive(Clone)]
pub struct MapperBuilder {
    source: String,
    target: String,
    transform: Transform,
}

/// First half of a [`MapperBuilder`]: the source key is known, the transform is not.
#[derive(Debug, Clone)]
pub struct MapperSource {
    source: String,
}

impl MapperBuilder {
    pub fn from(source: impl Into<String>) -> MapperSource {
        MapperSource {
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Reads the source value and transforms it. A missing source, a value of another type,
    /// or a transform yielding nothing all fail with `UnresolvedMappingSource`.
    pub fn apply(&self, session: &UserSession) -> Result<SessionValue, MaterializeError> {
        session
            .get_value(&self.source)
            .and_then(|value| (self.transform)(value))
            .ok_or_else(|| MaterializeError::UnresolvedMappingSource {
                key: self.source.clone(),
            })
    }
}

impl MapperSource {
    pub fn to<R, T, F>(self, target: impl Into<String>, f: F) -> MapperBuilder
    where
        R: Any + Send + Sync,
        T: Any + Send + Sync,
        F: Fn(&R) -> T + Send + Sync + 'static,
    {
        self.try_to(target, move |r: &R| Some(f(r)))
    }

    pub fn try_to<R, T, F>(self, target: impl Into<String>, f: F) -> MapperBuilder
    where
        R: Any + Send + Sync,
        T: Any + Send + Sync,
        F: Fn(&R) -> Option<T> + Send + Sync + 'static,
    {
        let transform: Transform = Arc::new(move |value: SessionValue| {
            let typed = value.downcast::<R>().ok()?;
            f(&typed).map(|t| Arc::new(t) as SessionValue)
        });
        MapperBuilder {
            source: self.source,
            target: target.into(),
            transform,
        }
    }
}

impl fmt::Debug for MapperBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapperBuilder")
            .field("source", &self.source)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::User;

    #[test]
    fn maps_typed_value() {
        let mut session = UserSession::new(User::new(0, "u"));
        session.insert("name", String::from("barrage"));

        let mapper = MapperBuilder::from("name").to("length", |s: &String| s.len());
        let out = mapper.apply(&session).unwrap();
        assert_eq!(out.downcast_ref::<usize>(), Some(&7));
    }

    #[test]
    fn unresolved_source_names_the_key() {
        let mut session = UserSession::new(User::new(0, "u"));
        session.insert("name", 5u32);

        let mapper = MapperBuilder::from("name").to("length", |s: &String| s.len());
        let err = mapper.apply(&session).unwrap_err();
        assert!(matches!(err, MaterializeError::UnresolvedMappingSource { ref key } if key == "name"));

        let mapper = MapperBuilder::from("absent").to("length", |s: &String| s.len());
        assert!(mapper.apply(&session).is_err());
    }
}
