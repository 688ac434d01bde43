use std::sync::Arc;

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use tracing::debug;

use crate::error::{RegistryError, Result};
use crate::store::{MemoryStore, ShareEntry, ShareStore};
use crate::token::generate_token;

/// How long a share stays resolvable.
pub const SHARE_TTL: TimeDelta = TimeDelta::minutes(30);

/// Fresh tokens tried before giving up on a collision streak.
const MAX_TOKEN_ATTEMPTS: usize = 4;

/// Maps short-lived share tokens to endpoint ids.
///
/// Entries are never updated or deleted explicitly; they disappear once
/// `now >= expires_at`.
#[derive(Clone)]
pub struct ShareRegistry {
    store: Arc<dyn ShareStore>,
}

impl ShareRegistry {
    pub fn new(store: Arc<dyn ShareStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn ShareStore> {
        &self.store
    }

    /// Register `endpoint` and return its share token.
    pub fn create(&self, endpoint: &str) -> Result<String> {
        self.create_at(endpoint, Utc::now())
    }

    pub fn create_at(&self, endpoint: &str, now: DateTime<Utc>) -> Result<String> {
        if endpoint.trim().is_empty() {
            return Err(RegistryError::InvalidInput("endpoint is empty".into()));
        }

        // Millisecond precision keeps both backends on the same boundary.
        let created_at = now.trunc_subsecs(3);
        for _ in 0..MAX_TOKEN_ATTEMPTS {
            let entry = ShareEntry {
                token: generate_token(),
                endpoint: endpoint.to_string(),
                created_at,
                expires_at: created_at + SHARE_TTL,
            };
            if self.store.insert(&entry)? {
                debug!(token = %entry.token, expires_at = %entry.expires_at, "share created");
                return Ok(entry.token);
            }
        }
        Err(RegistryError::Store("could not allocate a unique token".into()))
    }

    /// Endpoint registered under `token`.
    pub fn resolve(&self, token: Option<&str>) -> Result<String> {
        self.resolve_at(token, Utc::now())
    }

    pub fn resolve_at(&self, token: Option<&str>, now: DateTime<Utc>) -> Result<String> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or(RegistryError::MissingToken)?;
        self.store
            .get(token, now)?
            .map(|entry| entry.endpoint)
            .ok_or(RegistryError::NotFound)
    }

    /// Delete expired entries. Returns how many were removed.
    pub fn sweep(&self) -> Result<usize> {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> Result<usize> {
        self.store.remove_expired(now)
    }
}
