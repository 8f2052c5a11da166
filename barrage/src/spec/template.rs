use std::{fmt, sync::Arc};

use crate::{error::MaterializeError, session::UserSession};

/// A string resolved against the session at materialization time.
///
/// Static templates substitute `{key}` placeholders with scalar session values. Only
/// placeholders made of `[A-Za-z0-9_.-]` are substituted, so JSON bodies pass through.
#[derive(Clone)]
pub enum Template {
    Static(String),
    Dynamic(Arc<dyn Fn(&UserSession) -> String + Send + Sync>),
}

impl Template {
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&UserSession) -> String + Send + Sync + 'static,
    {
        Self::Dynamic(Arc::new(f))
    }

    pub fn resolve(&self, session: &UserSession) -> Result<String, MaterializeError> {
        match self {
            Self::Dynamic(f) => Ok(f(session)),
            Self::Static(raw) => interpolate(raw, session),
        }
    }
}

fn is_placeholder(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn interpolate(raw: &str, session: &UserSession) -> Result<String, MaterializeError> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if is_placeholder(&after[..close]) => {
                let key = &after[..close];
                let value = session.get_string(key).ok_or_else(|| {
                    MaterializeError::UnresolvedTemplate {
                        template: raw.to_string(),
                        key: key.to_string(),
                    }
                })?;
                out.push_str(&value);
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

impl From<&str> for Template {
    fn from(value: &str) -> Self {
        Self::Static(value.to_string())
    }
}

impl From<String> for Template {
    fn from(value: String) -> Self {
        Self::Static(value)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(raw) => f.debug_tuple("Static").field(raw).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::User;

    fn session() -> UserSession {
        let mut s = UserSession::new(User::new(0, "u"));
        s.insert("host", String::from("localhost:8080"));
        s.insert("id", 17usize);
        s
    }

    #[test]
    fn substitutes_placeholders() {
        let t = Template::from("http://{host}/items/{id}");
        assert_eq!(t.resolve(&session()).unwrap(), "http://localhost:8080/items/17");
    }

    #[test]
    fn json_braces_pass_through() {
        let t = Template::from(r#"{"id": "{id}", "tags": {}}"#);
        assert_eq!(t.resolve(&session()).unwrap(), r#"{"id": "17", "tags": {}}"#);
    }

    #[test]
    fn missing_key_is_reported() {
        let err = Template::from("/users/{user_id}").resolve(&session()).unwrap_err();
        assert!(matches!(err, MaterializeError::UnresolvedTemplate { ref key, .. } if key == "user_id"));
    }

    #[test]
    fn dynamic_template_sees_session() {
        let t = Template::from_fn(|s| format!("user-{}", s.user().username));
        assert_eq!(t.resolve(&session()).unwrap(), "user-u");
    }
}
