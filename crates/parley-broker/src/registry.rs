//! User registry: membership only, no message logic.

use crate::endpoint::Endpoint;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Maps user identifiers to their delivery endpoints.
///
/// Every read and write goes through one reader/writer lock. Callers that
/// write to endpoints must copy them out with [`Registry::lookup`] or
/// [`Registry::snapshot`] first; the lock is never held while delivering.
#[derive(Debug, Default)]
pub struct Registry {
    users: RwLock<HashMap<String, Endpoint>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace the endpoint for `user_id`.
    ///
    /// A replaced endpoint is returned as-is and is *not* closed; callers
    /// are expected to unregister before registering again.
    pub fn register(&self, user_id: impl Into<String>, endpoint: Endpoint) -> Option<Endpoint> {
        let user_id = user_id.into();
        let previous = self.users.write().insert(user_id.clone(), endpoint);

        if previous.is_some() {
            warn!(user_id = %user_id, "User re-registered without unregistering");
        } else {
            debug!(user_id = %user_id, "User registered");
        }

        previous
    }

    /// Remove `user_id` and close its endpoint. No-op if absent.
    pub fn unregister(&self, user_id: &str) -> bool {
        let removed = self.users.write().remove(user_id);
        match removed {
            Some(endpoint) => {
                endpoint.close();
                debug!(user_id = %user_id, "User unregistered");
                true
            }
            None => false,
        }
    }

    /// Remove `user_id` only if it is still registered with `endpoint`.
    ///
    /// The endpoint is closed either way.
    pub fn unregister_endpoint(&self, user_id: &str, endpoint: &Endpoint) -> bool {
        let removed = {
            let mut users = self.users.write();
            match users.get(user_id) {
                Some(current) if current.same_endpoint(endpoint) => users.remove(user_id),
                _ => None,
            }
        };
        endpoint.close();

        if removed.is_some() {
            debug!(user_id = %user_id, "User unregistered");
        }
        removed.is_some()
    }

    /// Get the endpoint registered for `user_id`.
    pub fn lookup(&self, user_id: &str) -> Option<Endpoint> {
        self.users.read().get(user_id).cloned()
    }

    /// Copy out every registration.
    pub fn snapshot(&self) -> Vec<(String, Endpoint)> {
        self.users
            .read()
            .iter()
            .map(|(id, endpoint)| (id.clone(), endpoint.clone()))
            .collect()
    }

    /// Check whether `user_id` is registered.
    pub fn contains(&self, user_id: &str) -> bool {
        self.users.read().contains_key(user_id)
    }

    /// Registered user ids, sorted.
    pub fn user_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.users.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered users.
    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    /// True when nobody is registered.
    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }

    /// Close and remove every endpoint.
    pub fn close_all(&self) -> usize {
        let drained: Vec<Endpoint> = self.users.write().drain().map(|(_, e)| e).collect();
        for endpoint in &drained {
            endpoint.close();
        }
        drained.len()
    }
}
