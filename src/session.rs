//! In-process session snapshots.
//!
//! Each successful batch is retained under its freshly minted session
//! id for the lifetime of the process, so the read endpoints can serve
//! the enriched view without a round-trip to the store. No eviction,
//! no persistence across restarts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::domain::{EnrichedTicket, Manager};

/// Everything the read endpoints need about one processed batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub tickets: Vec<EnrichedTicket>,
    pub managers: Vec<Manager>,
    pub created_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn new(tickets: Vec<EnrichedTicket>, managers: Vec<Manager>) -> Self {
        Self {
            tickets,
            managers,
            created_at: Utc::now(),
        }
    }
}

/// Concurrent session_id → snapshot map.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<SessionSnapshot>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session_id: impl Into<String>, snapshot: SessionSnapshot) {
        self.sessions.insert(session_id.into(), Arc::new(snapshot));
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<SessionSnapshot>> {
        self.sessions.get(session_id).map(|entry| entry.value().clone())
    }
}
