//! Turning a listing card into a [`Record`], one field at a time.
//!
//! Every field is read by its own fallible extractor. A field that can't be read
//! falls back to its value from the table below and never takes the rest of
//! the record down with it.

use std::marker::PhantomData;

use tracing::{error, warn};

use crate::error::FieldFault;
use crate::record::{Record, NAME_ERROR};
use crate::session::Element;

/// The results list on a listing page.
pub const CONTAINER_SELECTOR: &str = ".qa-flh-results-list";
/// One card inside [`CONTAINER_SELECTOR`].
pub const CARD_SELECTOR: &str = "li";

const NAME: &str = ".qa-flh-resource-name";
const SERVICE: &str = ".ds-u-font-size--md";
const BADGE: &str = ".ds-c-badge";
const PHONE: &str = ".qa-flh-resource-phone";
const EMAIL: &str = r#"a[href*="mailto:"]"#;
const WEBSITE: &str = r#"a[href*="http"]"#;
const ROW: &str = ".ds-l-row";
const LANGUAGES_LABEL: &str = "Languages spoken";

type FieldResult = Result<String, FieldFault>;

/// What to store (and say) when a field can't be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Empty string, nothing logged. Missing is normal for this field.
    Empty,
    /// Empty string and a warning.
    EmptyWarn,
    /// The given sentinel and an error.
    Sentinel(&'static str),
}

pub struct FieldSpec<E> {
    pub column: &'static str,
    pub extract: fn(&E) -> FieldResult,
    pub slot: fn(&mut Record) -> &mut String,
    pub on_missing: Fallback,
}

/// The seven fields of a directory listing card.
pub fn listing_fields<E: Element>() -> Vec<FieldSpec<E>> {
    vec![
        FieldSpec {
            column: "Name",
            extract: name::<E>,
            slot: |r| &mut r.name,
            on_missing: Fallback::Sentinel(NAME_ERROR),
        },
        FieldSpec {
            column: "Years of Service",
            extract: years_of_service::<E>,
            slot: |r| &mut r.years_of_service,
            on_missing: Fallback::Empty,
        },
        FieldSpec {
            column: "Badges",
            extract: badges::<E>,
            slot: |r| &mut r.badges,
            on_missing: Fallback::Empty,
        },
        FieldSpec {
            column: "Phone",
            extract: phone::<E>,
            slot: |r| &mut r.phone,
            on_missing: Fallback::EmptyWarn,
        },
        FieldSpec {
            column: "Email",
            extract: email::<E>,
            slot: |r| &mut r.email,
            on_missing: Fallback::Empty,
        },
        FieldSpec {
            column: "Website",
            extract: website::<E>,
            slot: |r| &mut r.website,
            on_missing: Fallback::Empty,
        },
        FieldSpec {
            column: "Languages",
            extract: languages::<E>,
            slot: |r| &mut r.languages,
            on_missing: Fallback::Empty,
        },
    ]
}

pub struct RecordExtractor<E> {
    state: String,
    fields: Vec<FieldSpec<E>>,
    _card: PhantomData<fn(&E)>,
}

impl<E: Element> RecordExtractor<E> {
    pub fn new(state: impl Into<String>) -> Self {
        Self::with_fields(state, listing_fields())
    }

    pub fn with_fields(state: impl Into<String>, fields: Vec<FieldSpec<E>>) -> Self {
        Self {
            state: state.into(),
            fields,
            _card: PhantomData,
        }
    }

    /// Builds the record for `card`. Never fails; see [`Fallback`].
    pub fn extract(&self, card: &E, page: u32, index: u64) -> Record {
        let mut record = Record::blank(page, index, &self.state);

        for field in &self.fields {
            let value = match (field.extract)(card) {
                Ok(value) => value,
                Err(fault) => match field.on_missing {
                    Fallback::Empty => String::new(),
                    Fallback::EmptyWarn => {
                        warn!(page, agent = %record.agent_index, "{} not found: {fault}", field.column);
                        String::new()
                    }
                    Fallback::Sentinel(sentinel) => {
                        error!(page, agent = %record.agent_index, "Error getting {}: {fault}", field.column);
                        sentinel.to_string()
                    }
                },
            };
            *(field.slot)(&mut record) = value;
        }

        record
    }
}

fn required<E: Element>(card: &E, selector: &str) -> Result<E, FieldFault> {
    card.find(selector)?
        .ok_or_else(|| FieldFault::Missing(selector.to_string()))
}

fn name<E: Element>(card: &E) -> FieldResult {
    Ok(required(card, NAME)?.text())
}

fn years_of_service<E: Element>(card: &E) -> FieldResult {
    let text = required(card, SERVICE)?.text();
    Ok(text.trim().lines().next().unwrap_or_default().to_string())
}

fn badges<E: Element>(card: &E) -> FieldResult {
    let badges: Vec<String> = card.find_all(BADGE)?.iter().map(Element::text).collect();
    Ok(badges.join(", "))
}

fn phone<E: Element>(card: &E) -> FieldResult {
    Ok(required(card, PHONE)?.text())
}

fn email<E: Element>(card: &E) -> FieldResult {
    Ok(required(card, EMAIL)?.text())
}

fn website<E: Element>(card: &E) -> FieldResult {
    Ok(required(card, WEBSITE)?.text())
}

/// The row labelled "Languages spoken"; the value sits in its second column.
fn languages<E: Element>(card: &E) -> FieldResult {
    for row in card.find_all(ROW)? {
        let labelled = row
            .find_all("span")?
            .iter()
            .any(|span| span.text() == LANGUAGES_LABEL);
        if labelled {
            let columns = row.children();
            return Ok(columns
                .get(1)
                .map(|col| col.text().trim().to_string())
                .unwrap_or_default());
        }
    }
    Err(FieldFault::Missing(format!("{ROW} labelled {LANGUAGES_LABEL}")))
}
