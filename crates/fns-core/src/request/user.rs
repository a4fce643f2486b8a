use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Tree-structured key/value attribute bag, spec §3: `user.attributes`.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

#[derive(Default, Serialize, Deserialize)]
struct UserState {
    id: String,
    attributes: Attributes,
}

/// Mutable per-request user container (`{id, attributes}`,
/// `authenticated ⇔ id ≠ ""`). Shared via `Arc` so that derived internal
/// requests (spec §4.1) and the signature/cache layers all observe the same
/// mutable identity without threading `&mut` through the call chain.
#[derive(Clone, Default)]
pub struct User(Arc<RwLock<UserState>>);

impl User {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        let user = Self::new();
        user.set_id(id);
        user
    }

    pub fn id(&self) -> String {
        self.0.read().id.clone()
    }

    pub fn set_id(&self, id: impl Into<String>) {
        self.0.write().id = id.into();
    }

    pub fn authenticated(&self) -> bool {
        !self.0.read().id.is_empty()
    }

    pub fn attributes(&self) -> Attributes {
        self.0.read().attributes.clone()
    }

    pub fn set_attributes(&self, attributes: Attributes) {
        self.0.write().attributes = attributes;
    }

    /// Deep clone into a fresh, independently-mutable `User`, used when a
    /// request is internal-derived and should not share mutation with its
    /// parent (spec §4.1: the inherited header/user is cloned, not aliased).
    pub fn deep_clone(&self) -> Self {
        let state = self.0.read();
        Self(Arc::new(RwLock::new(UserState {
            id: state.id.clone(),
            attributes: state.attributes.clone(),
        })))
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.0.read();
        f.debug_struct("User")
            .field("id", &state.id)
            .field("authenticated", &!state.id.is_empty())
            .finish()
    }
}
