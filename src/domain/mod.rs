//! Domain records for the routing engine.
//!
//! Tickets arrive from CSV ingestion, get enriched by the pipeline and
//! leave as [`EnrichedTicket`]s carrying a typed [`AssignmentOutcome`].
//! Managers and offices are loaded from the persistent store per batch.
//!
//! ```text
//! TicketRecord --NLP/geo--> EnrichedTicket { ..., assignment }
//!                                              ├── Assigned
//!                                              ├── NoEligibleManager
//!                                              └── Unmapped
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Classification enums
// ---------------------------------------------------------------------------

/// Client segment from the CRM export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Segment {
    #[default]
    Mass,
    Priority,
    #[serde(rename = "VIP")]
    Vip,
}

impl Segment {
    /// Parse a CSV/DB label. Unknown values fold to `Mass`.
    pub fn from_label(s: &str) -> Self {
        match s.trim() {
            "VIP" | "vip" | "Vip" => Self::Vip,
            "Priority" | "priority" => Self::Priority,
            _ => Self::Mass,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mass => "Mass",
            Self::Priority => "Priority",
            Self::Vip => "VIP",
        }
    }

    /// Whether this segment triggers the VIP-skill requirement.
    pub fn is_vip_or_priority(&self) -> bool {
        matches!(self, Self::Vip | Self::Priority)
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical request type. The model answers with Russian labels;
/// [`RequestType::from_label`] maps both Russian and English spellings
/// and folds anything unrecognised to `Consultation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestType {
    Complaint,
    DataChange,
    Consultation,
    Claim,
    AppMalfunction,
    FraudulentActivity,
    Spam,
}

impl RequestType {
    pub fn from_label(s: &str) -> Self {
        match s.trim() {
            "Жалоба" | "Complaint" => Self::Complaint,
            "Смена данных" | "DataChange" => Self::DataChange,
            "Претензия" | "Claim" => Self::Claim,
            "Неработоспособность приложения" | "AppMalfunction" => Self::AppMalfunction,
            "Мошеннические действия" | "FraudulentActivity" => Self::FraudulentActivity,
            "Спам" | "Spam" => Self::Spam,
            _ => Self::Consultation,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complaint => "Complaint",
            Self::DataChange => "DataChange",
            Self::Consultation => "Consultation",
            Self::Claim => "Claim",
            Self::AppMalfunction => "AppMalfunction",
            Self::FraudulentActivity => "FraudulentActivity",
            Self::Spam => "Spam",
        }
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sentiment of the customer message. Unknown labels fold to `Neutral`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn from_label(s: &str) -> Self {
        match s.trim() {
            "Положительная" | "Positive" => Self::Positive,
            "Негативная" | "Negative" => Self::Negative,
            _ => Self::Neutral,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "Positive",
            Self::Neutral => "Neutral",
            Self::Negative => "Negative",
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detected ticket language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "RU")]
    Ru,
    #[serde(rename = "KZ")]
    Kz,
    #[serde(rename = "ENG")]
    Eng,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ru => "RU",
            Self::Kz => "KZ",
            Self::Eng => "ENG",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Managers and offices
// ---------------------------------------------------------------------------

/// Manager seniority level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    Specialist,
    SeniorSpecialist,
    ChiefSpecialist,
}

impl Position {
    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim() {
            "Specialist" => Some(Self::Specialist),
            "SeniorSpecialist" | "Senior Specialist" => Some(Self::SeniorSpecialist),
            "ChiefSpecialist" | "Chief Specialist" => Some(Self::ChiefSpecialist),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Specialist => "Specialist",
            Self::SeniorSpecialist => "SeniorSpecialist",
            Self::ChiefSpecialist => "ChiefSpecialist",
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A routable manager skill. The store keeps skills as a comma-string;
/// tokens outside this set are dropped at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Skill {
    #[serde(rename = "VIP")]
    Vip,
    #[serde(rename = "KZ")]
    Kz,
    #[serde(rename = "ENG")]
    Eng,
}

impl Skill {
    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "VIP" => Some(Self::Vip),
            "KZ" => Some(Self::Kz),
            "ENG" => Some(Self::Eng),
            _ => None,
        }
    }

    /// Parse a comma-separated skill string into a set.
    pub fn parse_set(s: &str) -> HashSet<Skill> {
        s.split(',').filter_map(Skill::from_label).collect()
    }
}

/// A human manager at an office. `workload` is mutated in-memory only
/// while a single batch is being assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manager {
    pub manager_id: String,
    pub full_name: String,
    pub position: Position,
    pub skills: HashSet<Skill>,
    /// Office name; compared case-insensitively against `Office::name`.
    pub office: String,
    pub workload: u32,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl Manager {
    pub fn has_skill(&self, skill: Skill) -> bool {
        self.skills.contains(&skill)
    }
}

/// A branch office. Offices without coordinates stay valid assignment
/// targets but are excluded from distance routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Office {
    pub name: String,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Office {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tickets
// ---------------------------------------------------------------------------

/// A raw ticket as parsed from the uploaded CSV, before enrichment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketRecord {
    pub customer_guid: String,
    pub gender: Option<String>,
    pub date_of_birth: Option<String>,
    pub description: String,
    pub attachments: Option<String>,
    pub segment: Segment,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub street: Option<String>,
    pub building_number: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Where a ticket ended up after the assignment stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AssignmentOutcome {
    /// A manager at `office_name` accepted the ticket.
    Assigned {
        manager_name: String,
        manager_level: Position,
        office_name: String,
        office_address: String,
    },
    /// An office was resolved but no manager anywhere was eligible.
    NoEligibleManager {
        office_name: String,
        office_address: String,
    },
    /// No nearest office could be resolved (missing coordinates).
    Unmapped,
}

impl AssignmentOutcome {
    pub fn manager_name(&self) -> Option<&str> {
        match self {
            Self::Assigned { manager_name, .. } => Some(manager_name),
            _ => None,
        }
    }

    pub fn manager_level(&self) -> Option<Position> {
        match self {
            Self::Assigned { manager_level, .. } => Some(*manager_level),
            _ => None,
        }
    }

    pub fn office_name(&self) -> Option<&str> {
        match self {
            Self::Assigned { office_name, .. } | Self::NoEligibleManager { office_name, .. } => {
                Some(office_name)
            }
            Self::Unmapped => None,
        }
    }

    pub fn office_address(&self) -> Option<&str> {
        match self {
            Self::Assigned { office_address, .. }
            | Self::NoEligibleManager { office_address, .. } => Some(office_address),
            Self::Unmapped => None,
        }
    }

    /// Log label for the batch summary: OK / FAIL / UNMAPPED.
    pub fn as_log_label(&self) -> &'static str {
        match self {
            Self::Assigned { .. } => "OK",
            Self::NoEligibleManager { .. } => "FAIL",
            Self::Unmapped => "UNMAPPED",
        }
    }
}

/// A fully enriched ticket, ready for persistence and the session
/// snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedTicket {
    #[serde(flatten)]
    pub ticket: TicketRecord,
    pub request_type: RequestType,
    pub sentiment: Sentiment,
    pub language: Language,
    pub priority_score: u8,
    pub summary: String,
    pub next_actions: String,
    pub infer_time_ms: u64,
    pub assignment: AssignmentOutcome,
}
