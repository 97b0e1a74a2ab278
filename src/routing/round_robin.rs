//! Hash-bucketed round-robin selection.
//!
//! Managers are ranked by (workload, md5("{id}:{i}") mod 10⁹) — load
//! first, then a stable per-position hash so ties rotate across the
//! batch instead of sticking to one name. Within each bucket the
//! previous pick alternates between the two lowest-loaded candidates,
//! which keeps a narrow (office, segment, language, type) slice from
//! funnelling into a single manager.

use std::collections::HashMap;

use crate::domain::{Language, Manager};

use super::TicketProfile;

/// Alternation is tracked per (office, vip-or-priority, language,
/// data-change) slice of the ticket stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    office: String,
    vip_or_priority: bool,
    language: Language,
    data_change: bool,
}

impl BucketKey {
    fn new(office_name: &str, profile: &TicketProfile) -> Self {
        Self {
            office: office_name.to_lowercase(),
            vip_or_priority: profile.is_vip_or_priority(),
            language: profile.language,
            data_change: profile.is_data_change(),
        }
    }
}

/// Per-batch round-robin memory. Created fresh for every batch; never
/// shared across uploads.
#[derive(Debug, Default)]
pub struct RoundRobinState {
    last_assigned: HashMap<BucketKey, String>,
    bucket_counter: HashMap<BucketKey, u64>,
}

fn hash_tiebreak(manager_id: &str, i: u64) -> u64 {
    let digest = md5::compute(format!("{manager_id}:{i}"));
    (u128::from_be_bytes(digest.0) % 1_000_000_000) as u64
}

impl RoundRobinState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick a manager from `eligible` for a ticket routed to
    /// `office_name`. Returns `None` only when `eligible` is empty.
    pub fn choose<'a>(
        &mut self,
        office_name: &str,
        profile: &TicketProfile,
        eligible: &[&'a Manager],
    ) -> Option<&'a Manager> {
        if eligible.is_empty() {
            return None;
        }

        let bucket = BucketKey::new(office_name, profile);
        let counter = self.bucket_counter.entry(bucket.clone()).or_insert(0);
        let i = *counter;
        *counter += 1;

        let mut ranked: Vec<&Manager> = eligible.to_vec();
        ranked.sort_by_key(|m| (m.workload, hash_tiebreak(&m.manager_id, i)));

        let top2 = &ranked[..ranked.len().min(2)];
        let chosen = match self.last_assigned.get(&bucket) {
            Some(prev) if top2.len() == 2 => {
                if top2[0].manager_id == *prev {
                    top2[1]
                } else if top2[1].manager_id == *prev {
                    top2[0]
                } else {
                    top2[0]
                }
            }
            _ => top2[0],
        };

        self.last_assigned
            .insert(bucket, chosen.manager_id.clone());
        Some(chosen)
    }
}
