use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::{messages::ForwardEnvelope, Error, Result};

/// Recipient key to owning relationship, for a relay.
///
/// Every operation takes the lock once, so the duplicate and ownership
/// checks hold under concurrent updates.
#[derive(Default)]
pub struct RoutingTable {
    routes: RwLock<HashMap<String, String>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails with `DuplicateRoute` if `key` is routed, whoever owns it.
    pub async fn add(&self, key: &str, connection_id: &str) -> Result<()> {
        let mut routes = self.routes.write().await;
        if routes.contains_key(key) {
            return Err(Error::DuplicateRoute(key.into()));
        }
        routes.insert(key.into(), connection_id.into());
        debug!("added route {} -> {}", key, connection_id);
        Ok(())
    }

    /// Fails with `NoRoute` if unrouted and `RouteOwnershipMismatch` if
    /// `connection_id` does not own the route.
    pub async fn remove(&self, key: &str, connection_id: &str) -> Result<()> {
        let mut routes = self.routes.write().await;
        match routes.get(key) {
            None => Err(Error::NoRoute(key.into())),
            Some(owner) if owner != connection_id => Err(Error::RouteOwnershipMismatch {
                key: key.into(),
                owner: owner.clone(),
                requested: connection_id.into(),
            }),
            Some(_) => {
                routes.remove(key);
                debug!("removed route {} -> {}", key, connection_id);
                Ok(())
            }
        }
    }

    /// Owning relationship id of `key`.
    pub async fn find(&self, key: &str) -> Option<String> {
        self.routes.read().await.get(key).cloned()
    }

    /// Owning relationship of the envelope's `to` key.
    pub async fn route(&self, envelope: &ForwardEnvelope) -> Result<String> {
        self.find(&envelope.to)
            .await
            .ok_or_else(|| Error::NoRoute(envelope.to.clone()))
    }

    /// Keys routed to `connection_id`.
    pub async fn keys_for(&self, connection_id: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .routes
            .read()
            .await
            .iter()
            .filter(|(_, owner)| owner.as_str() == connection_id)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }
}
