//! The enrichment-and-assignment pipeline.
//!
//! Stage order per upload batch, each stage completing before the
//! next: truncate → NLP fan-out (+ priority) → language detect →
//! geocode fan-out → load managers & offices → assign per-ticket →
//! upsert → snapshot session.
//!
//! Per-ticket failures (model, geocoder, eligibility) stay local and
//! the batch proceeds; only a store failure aborts the batch.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::Repository;
use crate::domain::{AssignmentOutcome, EnrichedTicket, Office, TicketRecord};
use crate::error::{Error, Result};
use crate::geo::geocoder::{GeoProvider, GeocodeFetch};
use crate::geo::nearest_office;
use crate::nlp::{detect_language, NlpPool};
use crate::routing::{pick_manager, RoundRobinState, TicketProfile};
use crate::session::{SessionSnapshot, SessionStore};

/// Aggregate report for one processed batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub session_id: String,
    pub ticket_count: usize,
    pub manager_count: usize,
    pub status: String,
    pub ok: usize,
    pub fail: usize,
    pub unmapped: usize,
    pub nlp_total_time_ms: u64,
    pub nlp_avg_time_ms: f64,
}

/// The batch orchestrator. Owns the long-lived collaborators; the
/// geocoding provider (and its caches) is created fresh per batch.
pub struct Pipeline {
    max_batch: usize,
    nlp: Arc<NlpPool>,
    geo_fetch: Arc<dyn GeocodeFetch>,
    repo: Arc<dyn Repository>,
    sessions: Arc<SessionStore>,
}

impl Pipeline {
    pub fn new(
        max_batch: usize,
        nlp: Arc<NlpPool>,
        geo_fetch: Arc<dyn GeocodeFetch>,
        repo: Arc<dyn Repository>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self {
            max_batch,
            nlp,
            geo_fetch,
            repo,
            sessions,
        }
    }

    /// Run the full pipeline over one parsed batch.
    #[instrument(skip_all, fields(tickets = tickets.len()))]
    pub async fn process_batch(&self, mut tickets: Vec<TicketRecord>) -> Result<BatchSummary> {
        if tickets.is_empty() {
            return Err(Error::InputInvalid("no ticket rows in upload".to_string()));
        }

        // Stage 1: cap the batch.
        tickets.truncate(self.max_batch);
        let total = tickets.len();

        // Stage 2: NLP fan-out; results merge positionally.
        let mut outcomes = join_all(
            tickets
                .iter()
                .enumerate()
                .map(|(i, t)| self.nlp.analyze(&t.description, t.segment, i, total)),
        )
        .await;

        // Stage 3: the model's language guess is overwritten by the
        // rule-augmented detector.
        for (ticket, outcome) in tickets.iter().zip(outcomes.iter_mut()) {
            outcome.language = detect_language(&ticket.description);
        }

        // Stage 4: geocode fan-out. Provider caches live exactly as
        // long as this batch.
        let geocoder = GeoProvider::new(self.geo_fetch.clone());
        let coordinates = join_all(tickets.iter().map(|t| {
            geocoder.geocode(
                t.country.as_deref(),
                t.region.as_deref(),
                t.city.as_deref(),
                t.street.as_deref(),
                t.building_number.as_deref(),
            )
        }))
        .await;
        for (ticket, (lat, lon)) in tickets.iter_mut().zip(coordinates) {
            ticket.latitude = lat;
            ticket.longitude = lon;
        }

        // Stage 5: load the human side of the equation.
        let mut managers = self.repo.load_managers().await?;
        let offices = self.repo.load_offices().await?;
        let manager_count = managers.len();
        let office_index: HashMap<String, &Office> = offices
            .iter()
            .map(|o| (o.name.to_lowercase(), o))
            .collect();

        // Stage 6: sequential assignment in input order.
        let mut rr = RoundRobinState::new();
        let mut enriched = Vec::with_capacity(total);
        for (ticket, outcome) in tickets.into_iter().zip(outcomes) {
            let profile = TicketProfile {
                segment: ticket.segment,
                request_type: outcome.request_type,
                language: outcome.language,
                priority_score: outcome.priority_score,
            };

            let assignment = match nearest_office(ticket.latitude, ticket.longitude, &offices) {
                None => AssignmentOutcome::Unmapped,
                Some(nearest) => {
                    let pick = pick_manager(&profile, nearest, &offices, &mut managers, &mut rr);
                    let office = office_index
                        .get(&pick.office_name.to_lowercase())
                        .copied()
                        .unwrap_or(nearest);

                    let chosen = pick
                        .manager_id
                        .as_deref()
                        .and_then(|id| managers.iter().find(|m| m.manager_id == id));
                    match chosen {
                        Some(manager) => AssignmentOutcome::Assigned {
                            manager_name: manager.full_name.clone(),
                            manager_level: manager.position,
                            office_name: office.name.clone(),
                            office_address: office.address.clone(),
                        },
                        None => AssignmentOutcome::NoEligibleManager {
                            office_name: office.name.clone(),
                            office_address: office.address.clone(),
                        },
                    }
                }
            };

            info!(
                customer_guid = %ticket.customer_guid,
                outcome = assignment.as_log_label(),
                priority = outcome.priority_score,
                "ticket routed"
            );

            enriched.push(EnrichedTicket {
                ticket,
                request_type: outcome.request_type,
                sentiment: outcome.sentiment,
                language: outcome.language,
                priority_score: outcome.priority_score,
                summary: outcome.summary,
                next_actions: outcome.next_actions,
                infer_time_ms: outcome.infer_time_ms,
                assignment,
            });
        }

        // Stage 7: persist. A store failure is fatal to the batch and
        // leaves no session snapshot behind.
        self.repo.upsert_tickets(&enriched).await?;

        // Stage 8: summary + snapshot under a fresh session id.
        let ok = count_label(&enriched, "OK");
        let fail = count_label(&enriched, "FAIL");
        let unmapped = count_label(&enriched, "UNMAPPED");
        let nlp_total_time_ms: u64 = enriched.iter().map(|t| t.infer_time_ms).sum();
        let nlp_avg_time_ms = nlp_total_time_ms as f64 / total as f64;

        let session_id = Uuid::new_v4().to_string();
        self.sessions
            .insert(session_id.clone(), SessionSnapshot::new(enriched, managers));

        info!(
            %session_id,
            total, ok, fail, unmapped, nlp_total_time_ms, "batch complete"
        );

        Ok(BatchSummary {
            session_id,
            ticket_count: total,
            manager_count,
            status: "ok".to_string(),
            ok,
            fail,
            unmapped,
            nlp_total_time_ms,
            nlp_avg_time_ms,
        })
    }
}

fn count_label(tickets: &[EnrichedTicket], label: &str) -> usize {
    tickets
        .iter()
        .filter(|t| t.assignment.as_log_label() == label)
        .count()
}
