use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type AgencyId = i64;
pub type DocumentId = i64;

/// Agency type of the state-level department of transportation.
pub const STATE_DOT_TYPE: &str = "State DOT";

// --- Agencies ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agency {
    pub agency_id: AgencyId,
    pub name: String,
    pub state: Option<String>,
    pub agency_type: Option<String>,
    pub procurement_url: Option<String>,
    pub planning_url: Option<String>,
    pub minutes_url: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Agency {
    /// Minimal agency, handy for seeding fixtures.
    pub fn new(agency_id: AgencyId, name: impl Into<String>) -> Self {
        Self {
            agency_id,
            name: name.into(),
            state: None,
            agency_type: None,
            procurement_url: None,
            planning_url: None,
            minutes_url: None,
            latitude: None,
            longitude: None,
        }
    }

    pub fn with_state(mut self, state: &str) -> Self {
        self.state = Some(state.to_string());
        self
    }

    pub fn with_type(mut self, agency_type: &str) -> Self {
        self.agency_type = Some(agency_type.to_string());
        self
    }

    pub fn with_planning_url(mut self, url: &str) -> Self {
        self.planning_url = Some(url.to_string());
        self
    }

    pub fn with_minutes_url(mut self, url: &str) -> Self {
        self.minutes_url = Some(url.to_string());
        self
    }
}

/// Directed edge in the agency graph. `(parent, child, structure)` is unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgencyRelationship {
    pub parent_agency_id: AgencyId,
    pub child_agency_id: AgencyId,
    pub structure_id: i64,
}

// --- Documents ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    PlanningDocument,
    MeetingMinutes,
    Solicitation,
    ItsArchitecture,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlanningDocument => "Planning Document",
            Self::MeetingMinutes => "Meeting Minutes",
            Self::Solicitation => "Solicitation",
            Self::ItsArchitecture => "ITS Architecture",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Planning Document" => Some(Self::PlanningDocument),
            "Meeting Minutes" => Some(Self::MeetingMinutes),
            "Solicitation" => Some(Self::Solicitation),
            "ITS Architecture" => Some(Self::ItsArchitecture),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub agency_id: AgencyId,
    pub document_type: DocumentType,
    pub url: String,
    /// `None` records an extraction failure.
    pub raw_text: Option<String>,
    pub scraped_at: DateTime<Utc>,
    pub publication_date: NaiveDate,
}

/// A document with text and no entities yet.
#[derive(Debug, Clone, PartialEq)]
pub struct UnprocessedDocument {
    pub document_id: DocumentId,
    pub raw_text: String,
}

/// Recently scraped document whose text is missing or suspiciously short.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuspectDocument {
    pub document_id: DocumentId,
    pub agency_id: Option<AgencyId>,
    pub url: String,
    /// `None` when the stored text is null.
    pub text_chars: Option<usize>,
    pub scraped_at: DateTime<Utc>,
}

// --- Entities ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityLabel {
    ItsTechnology,
    Money,
    Date,
    Org,
}

impl EntityLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ItsTechnology => "ITS_TECHNOLOGY",
            Self::Money => "MONEY",
            Self::Date => "DATE",
            Self::Org => "ORG",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ITS_TECHNOLOGY" => Some(Self::ItsTechnology),
            "MONEY" => Some(Self::Money),
            "DATE" => Some(Self::Date),
            "ORG" => Some(Self::Org),
            _ => None,
        }
    }
}

impl fmt::Display for EntityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ValidationStatus {
    #[default]
    Unverified,
    Correct,
    Incorrect,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unverified => "unverified",
            Self::Correct => "correct",
            Self::Incorrect => "incorrect",
        }
    }
}

/// Source type recorded on entities extracted from documents.
pub const DOCUMENT_SOURCE_TYPE: &str = "document";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NewEntity {
    pub source_id: DocumentId,
    pub entity_text: String,
    pub label: EntityLabel,
    pub context_sentence: String,
}

/// Validated entity count for one (agency, document type, label) group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityCount {
    pub agency_id: AgencyId,
    pub document_type: String,
    pub entity_label: String,
    pub count: i64,
}

// --- Solicitations and news ---

#[derive(Debug, Clone, PartialEq)]
pub struct NewSolicitation {
    /// `None` when the issuing organisation matched no known agency.
    pub agency_id: Option<AgencyId>,
    pub release_date: NaiveDate,
    pub title: String,
    pub url: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolicitationDate {
    pub agency_id: AgencyId,
    pub release_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNewsArticle {
    pub agency_id: AgencyId,
    pub article_url: String,
    pub title: String,
    pub source_name: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub content: Option<String>,
}

// --- Predictions ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub agency_id: AgencyId,
    pub prediction_date: NaiveDate,
    pub prob_6_months: Option<f64>,
    pub prob_12_months: f64,
    pub supporting_evidence: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub simulation_date: NaiveDate,
    pub agency_id: AgencyId,
    pub predicted_prob_12m: f64,
    pub actual_outcome_12m: bool,
    /// Days from the simulation date to the first later solicitation, if any.
    pub time_to_event_days: Option<i64>,
}

/// A high-confidence prediction with no recent solicitation.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifierCandidate {
    pub agency_id: AgencyId,
    pub name: String,
    pub procurement_url: Option<String>,
    pub prob_12_months: f64,
}

/// Result of a conditional insert keyed on a natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyPresent,
}

impl InsertOutcome {
    pub fn from_rows_affected(rows: u64) -> Self {
        if rows == 0 {
            Self::AlreadyPresent
        } else {
            Self::Inserted
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted)
    }
}
