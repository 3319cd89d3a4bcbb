use serde::{Deserialize, Serialize};

/// One row of the output: a single agent listing.
///
/// Every field is always present; a field that couldn't be read is an empty
/// string (or [`NAME_ERROR`] for the name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "Page")]
    pub page: u32,
    #[serde(rename = "Agent_index")]
    pub agent_index: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Years of Service")]
    pub years_of_service: String,
    #[serde(rename = "Badges")]
    pub badges: String,
    #[serde(rename = "Phone")]
    pub phone: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Website")]
    pub website: String,
    #[serde(rename = "Languages")]
    pub languages: String,
    #[serde(rename = "State")]
    pub state: String,
}

/// Stored in the name column when a card has no readable name.
pub const NAME_ERROR: &str = "Name Error";

pub const AGENT_INDEX_COLUMN: &str = "Agent_index";

/// `agent_<N>`
pub fn agent_index(index: u64) -> String {
    format!("agent_{index}")
}

impl Record {
    /// An all-empty record for `page` / `index`; the extractor fills it in field by field.
    pub fn blank(page: u32, index: u64, state: &str) -> Self {
        Self {
            page,
            agent_index: agent_index(index),
            name: String::new(),
            years_of_service: String::new(),
            badges: String::new(),
            phone: String::new(),
            email: String::new(),
            website: String::new(),
            languages: String::new(),
            state: state.to_string(),
        }
    }
}
