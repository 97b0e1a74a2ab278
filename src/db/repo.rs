//! Batch repository: manager/office loading and the idempotent ticket
//! upsert.
//!
//! The upsert runs as one transaction per batch. On conflict the
//! enrichment and assignment columns are overwritten; the customer's
//! demographic columns are never touched. Assignment columns are added
//! on demand so older tables upgrade in place.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::{EnrichedTicket, Manager, Office, Position, Skill};
use crate::error::Result;

/// Store operations the pipeline depends on. Implemented over
/// Postgres in production and in-memory in tests.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn load_managers(&self) -> Result<Vec<Manager>>;
    async fn load_offices(&self) -> Result<Vec<Office>>;
    async fn upsert_tickets(&self, tickets: &[EnrichedTicket]) -> Result<()>;
}

const ENSURE_TABLE_SQL: &str = "
CREATE TABLE IF NOT EXISTS tickets_final_enriched (
    customer_guid   TEXT PRIMARY KEY,
    gender          TEXT,
    date_of_birth   TEXT,
    description     TEXT,
    attachments     TEXT,
    client_segment  TEXT,
    country         TEXT,
    region          TEXT,
    city            TEXT,
    street          TEXT,
    building        TEXT,
    lat             DOUBLE PRECISION,
    lon             DOUBLE PRECISION,
    request_type    TEXT,
    sentiment       TEXT,
    priority        INTEGER,
    language        TEXT,
    summary         TEXT,
    next_actions    TEXT,
    infer_time_ms   BIGINT
);
ALTER TABLE tickets_final_enriched ADD COLUMN IF NOT EXISTS assigned_manager_name TEXT;
ALTER TABLE tickets_final_enriched ADD COLUMN IF NOT EXISTS assigned_manager_level TEXT;
ALTER TABLE tickets_final_enriched ADD COLUMN IF NOT EXISTS assigned_office TEXT;
ALTER TABLE tickets_final_enriched ADD COLUMN IF NOT EXISTS assigned_office_address TEXT;
";

const UPSERT_SQL: &str = "
INSERT INTO tickets_final_enriched (
    customer_guid, gender, date_of_birth, description, attachments,
    client_segment, country, region, city, street, building,
    lat, lon, request_type, sentiment, priority, language,
    summary, next_actions, infer_time_ms,
    assigned_manager_name, assigned_manager_level,
    assigned_office, assigned_office_address
) VALUES (
    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
    $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24
)
ON CONFLICT (customer_guid) DO UPDATE SET
    lat                     = EXCLUDED.lat,
    lon                     = EXCLUDED.lon,
    request_type            = EXCLUDED.request_type,
    sentiment               = EXCLUDED.sentiment,
    priority                = EXCLUDED.priority,
    language                = EXCLUDED.language,
    summary                 = EXCLUDED.summary,
    next_actions            = EXCLUDED.next_actions,
    infer_time_ms           = EXCLUDED.infer_time_ms,
    assigned_manager_name   = EXCLUDED.assigned_manager_name,
    assigned_manager_level  = EXCLUDED.assigned_manager_level,
    assigned_office         = EXCLUDED.assigned_office,
    assigned_office_address = EXCLUDED.assigned_office_address
";

/// Postgres-backed repository.
pub struct PostgresRepository {
    pool: deadpool_postgres::Pool,
}

impl PostgresRepository {
    pub fn new(pool: deadpool_postgres::Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn load_managers(&self) -> Result<Vec<Manager>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT manager_id, full_name, position, office, skills, active_tickets_count
                 FROM managers",
                &[],
            )
            .await?;

        let mut managers = Vec::with_capacity(rows.len());
        for row in rows {
            let manager_id: String = row.get(0);
            let position_label: String = row.try_get::<_, Option<String>>(2)?.unwrap_or_default();
            let position = Position::from_label(&position_label).unwrap_or_else(|| {
                warn!(
                    manager_id = %manager_id,
                    position = %position_label,
                    "unknown position, treating as Specialist"
                );
                Position::Specialist
            });
            let skills: Option<String> = row.get(4);
            let workload: Option<i32> = row.get(5);

            managers.push(Manager {
                manager_id,
                full_name: row.get(1),
                position,
                skills: Skill::parse_set(skills.as_deref().unwrap_or("")),
                office: row.try_get::<_, Option<String>>(3)?.unwrap_or_default(),
                workload: workload.unwrap_or(0).max(0) as u32,
                active: true,
            });
        }
        Ok(managers)
    }

    async fn load_offices(&self) -> Result<Vec<Office>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT office, address, latitude, longitude FROM business_units",
                &[],
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| Office {
                name: row.get(0),
                address: row.try_get::<_, Option<String>>(1).ok().flatten().unwrap_or_default(),
                latitude: row.get(2),
                longitude: row.get(3),
            })
            .collect())
    }

    async fn upsert_tickets(&self, tickets: &[EnrichedTicket]) -> Result<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        tx.batch_execute(ENSURE_TABLE_SQL).await?;
        let statement = tx.prepare(UPSERT_SQL).await?;

        for enriched in tickets {
            let ticket = &enriched.ticket;
            tx.execute(
                &statement,
                &[
                    &ticket.customer_guid,
                    &ticket.gender,
                    &ticket.date_of_birth,
                    &ticket.description,
                    &ticket.attachments,
                    &ticket.segment.as_str(),
                    &ticket.country,
                    &ticket.region,
                    &ticket.city,
                    &ticket.street,
                    &ticket.building_number,
                    &ticket.latitude,
                    &ticket.longitude,
                    &enriched.request_type.as_str(),
                    &enriched.sentiment.as_str(),
                    &(enriched.priority_score as i32),
                    &enriched.language.as_str(),
                    &enriched.summary,
                    &enriched.next_actions,
                    &(enriched.infer_time_ms as i64),
                    &enriched.assignment.manager_name(),
                    &enriched.assignment.manager_level().map(|p| p.as_str()),
                    &enriched.assignment.office_name(),
                    &enriched.assignment.office_address(),
                ],
            )
            .await?;
        }

        tx.commit().await?;
        info!(count = tickets.len(), "batch upserted");
        Ok(())
    }
}
