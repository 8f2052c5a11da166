use serde::{Deserialize, Serialize};

/// Identity of one virtual user.
///
/// A user is immutable for the lifetime of its session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: usize,
    pub username: String,
}

impl User {
    pub fn new(id: usize, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }
}

/// Source of the virtual users taking part in a run.
pub trait UserProvider: Send + Sync {
    fn users(&self) -> Vec<User>;
}

impl UserProvider for Vec<User> {
    fn users(&self) -> Vec<User> {
        self.clone()
    }
}

/// Generates `count` users named `user-0`, `user-1`, ...
#[derive(Debug, Clone, Copy)]
pub struct SequentialUserProvider {
    pub count: usize,
}

impl SequentialUserProvider {
    pub fn new(count: usize) -> Self {
        Self { count }
    }
}

impl UserProvider for SequentialUserProvider {
    fn users(&self) -> Vec<User> {
        (0..self.count)
            .map(|id| User::new(id, format!("user-{id}")))
            .collect()
    }
}
