use crate::core::{Result, SyncError};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Issued auth tokens, one live token per nation id.
///
/// Only bcrypt hashes are kept; the plain token leaves through `issue` once.
pub struct TokenStore {
    hashes: RwLock<HashMap<i64, String>>,
    cost: u32,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::with_cost(bcrypt::DEFAULT_COST)
    }

    /// Lower costs are only sensible for tests.
    pub fn with_cost(cost: u32) -> Self {
        Self {
            hashes: RwLock::new(HashMap::new()),
            cost,
        }
    }

    /// Issue a fresh token for `nation_id`, replacing any previous one.
    pub async fn issue(&self, nation_id: i64) -> Result<String> {
        let token = Uuid::new_v4().simple().to_string();
        let hash = {
            let token = token.clone();
            let cost = self.cost;
            tokio::task::spawn_blocking(move || bcrypt::hash(token, cost))
                .await
                .map_err(|e| SyncError::Verification(format!("token hasher panicked: {}", e)))?
                .map_err(|e| SyncError::Verification(format!("failed to hash token: {}", e)))?
        };
        self.hashes.write().await.insert(nation_id, hash);
        Ok(token)
    }

    pub async fn is_valid(&self, nation_id: i64, token: &str) -> bool {
        let Some(hash) = self.hashes.read().await.get(&nation_id).cloned() else {
            return false;
        };
        let token = token.to_string();
        tokio::task::spawn_blocking(move || bcrypt::verify(token, &hash).unwrap_or(false))
            .await
            .unwrap_or(false)
    }

    pub async fn revoke(&self, nation_id: i64) -> bool {
        self.hashes.write().await.remove(&nation_id).is_some()
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}
