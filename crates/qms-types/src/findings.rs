use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    Pmid,
    Doi,
    ArxivId,
    NctId,
    Url,
}

/// A single piece of literature or registry evidence normalized from a
/// vendor tool adapter's response, independent of which vendor produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub finding_id: String,
    pub project_id: String,
    pub source: String,
    pub identifier_kind: IdentifierKind,
    pub identifier: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_level: Option<u8>,
    #[serde(default)]
    pub retracted: bool,
    #[serde(default)]
    pub selected: bool,
    pub retrieved_at: DateTime<Utc>,
}

impl Finding {
    /// Evidence-currency bucket relative to `as_of`: current (<=5y),
    /// aging (5-7y), outdated (>7y). `None` when the finding carries no
    /// publication year.
    pub fn currency(&self, as_of: DateTime<Utc>) -> Option<&'static str> {
        let year = self.publication_year?;
        let age = as_of.format("%Y").to_string().parse::<i32>().ok()? - year;
        Some(if age <= 5 {
            "current"
        } else if age <= 7 {
            "aging"
        } else {
            "outdated"
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Grounded,
    Hallucinated,
    Refused,
}

/// An identifier a model mentioned in its own output text (the "cited
/// set"), tracked separately from the identifiers tool calls actually
/// returned (the "verified set") so the two can be diffed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationAssertion {
    pub agent_key: String,
    pub task_id: String,
    pub identifier_kind: IdentifierKind,
    pub identifier: String,
    pub verdict: Verdict,
}
