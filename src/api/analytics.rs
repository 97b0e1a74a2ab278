//! Direct-DB analytics over the enriched table, without a session.

use std::collections::HashMap;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::{ApiError, AppState};

#[derive(Debug, Serialize)]
pub struct DistributionBucket {
    pub label: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub total_tickets: usize,
    pub total_managers: usize,
    pub assigned_count: usize,
    pub unassigned_count: usize,
    pub by_segment: Vec<DistributionBucket>,
    pub by_request_type: Vec<DistributionBucket>,
    pub by_sentiment: Vec<DistributionBucket>,
    pub by_language: Vec<DistributionBucket>,
    pub by_office: Vec<DistributionBucket>,
    pub avg_priority_score: f64,
}

impl AnalyticsResponse {
    fn empty() -> Self {
        Self {
            total_tickets: 0,
            total_managers: 0,
            assigned_count: 0,
            unassigned_count: 0,
            by_segment: Vec::new(),
            by_request_type: Vec::new(),
            by_sentiment: Vec::new(),
            by_language: Vec::new(),
            by_office: Vec::new(),
            avg_priority_score: 0.0,
        }
    }
}

/// Count distinct values and express each as a share of the total,
/// largest bucket first.
fn distribution(values: &[Option<String>], total: usize) -> Vec<DistributionBucket> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values.iter().flatten() {
        *counts.entry(value.as_str()).or_default() += 1;
    }

    let mut buckets: Vec<DistributionBucket> = counts
        .into_iter()
        .map(|(label, count)| DistributionBucket {
            label: label.to_string(),
            count,
            percentage: if total > 0 {
                (count as f64 / total as f64 * 1000.0).round() / 10.0
            } else {
                0.0
            },
        })
        .collect();
    buckets.sort_by(|a, b| b.count.cmp(&a.count).then(a.label.cmp(&b.label)));
    buckets
}

/// `GET /api/db/analytics`
pub async fn get_db_analytics(
    State(state): State<AppState>,
) -> Result<Json<AnalyticsResponse>, ApiError> {
    let client = state.pool.get().await.map_err(crate::error::Error::from)?;
    let rows = client
        .query(
            "SELECT client_segment, request_type, sentiment, language, city,
                    priority, assigned_manager_name
             FROM tickets_final_enriched",
            &[],
        )
        .await
        .map_err(crate::error::Error::from)?;

    let total = rows.len();
    if total == 0 {
        return Ok(Json(AnalyticsResponse::empty()));
    }

    let mut segments = Vec::with_capacity(total);
    let mut request_types = Vec::with_capacity(total);
    let mut sentiments = Vec::with_capacity(total);
    let mut languages = Vec::with_capacity(total);
    let mut cities = Vec::with_capacity(total);
    let mut priorities = Vec::new();
    let mut assigned_count = 0usize;

    for row in &rows {
        segments.push(row.get::<_, Option<String>>(0));
        request_types.push(row.get::<_, Option<String>>(1));
        sentiments.push(row.get::<_, Option<String>>(2));
        languages.push(row.get::<_, Option<String>>(3));
        cities.push(row.get::<_, Option<String>>(4));
        if let Some(priority) = row.get::<_, Option<i32>>(5) {
            priorities.push(priority);
        }
        if row
            .get::<_, Option<String>>(6)
            .is_some_and(|name| !name.trim().is_empty())
        {
            assigned_count += 1;
        }
    }

    let avg_priority_score = if priorities.is_empty() {
        0.0
    } else {
        let avg = priorities.iter().map(|p| *p as f64).sum::<f64>() / priorities.len() as f64;
        (avg * 100.0).round() / 100.0
    };

    Ok(Json(AnalyticsResponse {
        total_tickets: total,
        total_managers: 0,
        assigned_count,
        unassigned_count: total - assigned_count,
        by_segment: distribution(&segments, total),
        by_request_type: distribution(&request_types, total),
        by_sentiment: distribution(&sentiments, total),
        by_language: distribution(&languages, total),
        by_office: distribution(&cities, total),
        avg_priority_score,
    }))
}
