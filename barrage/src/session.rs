use std::{
    any::Any,
    collections::HashMap,
    fmt,
    sync::{Arc, Weak},
};

use crate::user::User;

/// Type-erased value stored in a [`UserSession`].
pub type SessionValue = Arc<dyn Any + Send + Sync>;

/// Per-virtual-user store of named values threaded through a spec chain.
///
/// A session is created once per virtual user before the first spec materializes and is
/// handed from step to step by value, so a step always observes everything the previous
/// step committed.
///
/// Nested scopes (loop branches) get a *child* session: it owns its own writes and holds
/// only a weak link to the enclosing session. Reads that miss locally fall through to the
/// parent while the parent is alive.
#[derive(Clone)]
pub struct UserSession {
    user: Arc<User>,
    values: HashMap<String, SessionValue>,
    parent: Option<Weak<UserSession>>,
}

impl UserSession {
    pub fn new(user: User) -> Self {
        Self {
            user: Arc::new(user),
            values: HashMap::new(),
            parent: None,
        }
    }

    /// Creates an empty session for a nested scope of `parent`, sharing its user.
    pub fn child_of(parent: &Arc<UserSession>) -> Self {
        Self {
            user: Arc::clone(&parent.user),
            values: HashMap::new(),
            parent: Some(Arc::downgrade(parent)),
        }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    /// The enclosing session, if this is a nested scope and the parent is still alive.
    pub fn parent(&self) -> Option<Arc<UserSession>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn insert<T>(&mut self, key: impl Into<String>, value: T)
    where
        T: Any + Send + Sync,
    {
        self.values.insert(key.into(), Arc::new(value));
    }

    pub fn insert_value(&mut self, key: impl Into<String>, value: SessionValue) {
        self.values.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<SessionValue> {
        self.values.remove(key)
    }

    pub fn get_value(&self, key: &str) -> Option<SessionValue> {
        match self.values.get(key) {
            Some(v) => Some(Arc::clone(v)),
            None => self.parent().and_then(|p| p.get_value(key)),
        }
    }

    /// Typed lookup. Returns `None` when the key is missing or holds another type.
    pub fn get<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.get_value(key).and_then(|v| v.downcast::<T>().ok())
    }

    /// Renders a scalar value as a string, used when resolving `{key}` templates.
    pub fn get_string(&self, key: &str) -> Option<String> {
        let value = self.get_value(key)?;
        if let Some(s) = value.downcast_ref::<String>() {
            return Some(s.clone());
        }
        if let Some(s) = value.downcast_ref::<&'static str>() {
            return Some((*s).to_string());
        }
        if let Some(n) = value.downcast_ref::<i64>() {
            return Some(n.to_string());
        }
        if let Some(n) = value.downcast_ref::<u64>() {
            return Some(n.to_string());
        }
        if let Some(n) = value.downcast_ref::<usize>() {
            return Some(n.to_string());
        }
        if let Some(b) = value.downcast_ref::<bool>() {
            return Some(b.to_string());
        }
        if let Some(json) = value.downcast_ref::<serde_json::Value>() {
            return Some(match json {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        }
        None
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key) || self.parent().is_some_and(|p| p.contains_key(key))
    }

    /// Keys written directly into this session, ignoring the parent.
    pub fn local_keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Consumes the session, returning only the values it owns.
    pub fn into_local_values(self) -> HashMap<String, SessionValue> {
        self.values
    }

    /// Overwrites entries with `values`, last write wins per key.
    pub fn extend(&mut self, values: impl IntoIterator<Item = (String, SessionValue)>) {
        self.values.extend(values);
    }
}

impl fmt::Debug for UserSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.local_keys().collect();
        keys.sort_unstable();
        f.debug_struct("UserSession")
            .field("user", &self.user)
            .field("keys", &keys)
            .field("nested", &self.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> UserSession {
        UserSession::new(User::new(7, "tester"))
    }

    #[test]
    fn typed_lookup_rejects_other_types() {
        let mut s = session();
        s.insert("count", 3usize);

        assert_eq!(s.get::<usize>("count").as_deref(), Some(&3));
        assert!(s.get::<String>("count").is_none());
        assert!(s.get::<usize>("missing").is_none());
    }

    #[test]
    fn child_reads_through_to_parent_but_writes_locally() {
        let mut root = session();
        root.insert("token", String::from("abc"));
        let root = Arc::new(root);

        let mut child = UserSession::child_of(&root);
        assert_eq!(child.get_string("token").as_deref(), Some("abc"));
        assert_eq!(child.user().id, 7);

        child.insert("token", String::from("override"));
        assert_eq!(child.get_string("token").as_deref(), Some("override"));
        assert_eq!(root.get_string("token").as_deref(), Some("abc"));
        assert_eq!(child.local_keys().collect::<Vec<_>>(), vec!["token"]);
    }

    #[test]
    fn child_never_keeps_parent_alive() {
        let root = Arc::new(session());
        let child = UserSession::child_of(&root);
        assert!(child.parent().is_some());

        drop(root);
        assert!(child.parent().is_none());
        assert!(!child.contains_key("anything"));
    }

    #[test]
    fn scalar_values_render_as_strings() {
        let mut s = session();
        s.insert("n", 42i64);
        s.insert("flag", true);
        s.insert("json", serde_json::json!("quoted"));

        assert_eq!(s.get_string("n").as_deref(), Some("42"));
        assert_eq!(s.get_string("flag").as_deref(), Some("true"));
        assert_eq!(s.get_string("json").as_deref(), Some("quoted"));
    }
}
