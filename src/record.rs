//! # Records
//! Wire shapes for submitted line items and the tagged `ConsumptionRecord`
//! they are classified into. Classification happens once, here; processors
//! never re-inspect raw fields to guess a category.
//!
//! Also holds the per-item outcome types: `ProcessedItem` for accepted
//! records and `DiscardedItem` for rejected ones.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::category::Category;

/* ----------------------------
Wire shapes
---------------------------- */

/// Reporting period as submitted. Dates stay strings until a processor
/// validates them; unknown keys are kept so accepted items are stored
/// exactly as received.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Period {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Consumption sub-document (`{value, unit, ...}`). `value` keeps its JSON
/// number form, so an integer stays an integer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Consumption {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Consumption {
    pub fn amount(&self) -> Option<f64> {
        self.value.as_ref().and_then(Number::as_f64)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Travel {
    #[serde(default, alias = "from", skip_serializing_if = "Option::is_none")]
    pub from_airport_code: Option<String>,
    #[serde(default, alias = "to", skip_serializing_if = "Option::is_none")]
    pub to_airport_code: Option<String>,
}

/// Loose view of one submitted item; every field optional.
#[derive(Debug, Clone, Default, Deserialize)]
struct RawRecord {
    #[serde(default)]
    document_type: Option<String>,
    #[serde(default)]
    period: Option<Period>,
    #[serde(default)]
    total_electricity_consumption: Option<Consumption>,
    #[serde(default, rename = "consumption_sMc")]
    consumption_smc: Option<Consumption>,
    #[serde(default)]
    total_diesel_consumption: Option<Consumption>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    travel: Option<Travel>,
    #[serde(default)]
    num_travelers: Option<i64>,
}

/* ----------------------------
Tagged record
---------------------------- */

/// Fields shared by Electricity, Gas and Diesel items.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeteredFields {
    pub period: Option<Period>,
    pub consumption: Option<Consumption>,
    /// Wire name of the consumption field, used in discard reasons.
    pub consumption_field: &'static str,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlightFields {
    pub date: Option<String>,
    pub travel: Option<Travel>,
    pub num_travelers: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordKind {
    Electricity(MeteredFields),
    Gas(MeteredFields),
    Diesel(MeteredFields),
    Flight(FlightFields),
}

/// One submitted line item with its category decided.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumptionRecord {
    pub document_name: String,
    pub kind: RecordKind,
}

impl ConsumptionRecord {
    pub fn category(&self) -> Category {
        match self.kind {
            RecordKind::Electricity(_) => Category::Electricity,
            RecordKind::Gas(_) => Category::Gas,
            RecordKind::Diesel(_) => Category::Diesel,
            RecordKind::Flight(_) => Category::Flight,
        }
    }

    pub fn electricity(&self) -> Option<&MeteredFields> {
        match &self.kind {
            RecordKind::Electricity(m) => Some(m),
            _ => None,
        }
    }

    pub fn gas(&self) -> Option<&MeteredFields> {
        match &self.kind {
            RecordKind::Gas(m) => Some(m),
            _ => None,
        }
    }

    pub fn diesel(&self) -> Option<&MeteredFields> {
        match &self.kind {
            RecordKind::Diesel(m) => Some(m),
            _ => None,
        }
    }

    pub fn flight(&self) -> Option<&FlightFields> {
        match &self.kind {
            RecordKind::Flight(f) => Some(f),
            _ => None,
        }
    }
}

pub const ELECTRICITY_FIELD: &str = "total_electricity_consumption";
pub const GAS_FIELD: &str = "consumption_sMc";
pub const DIESEL_FIELD: &str = "total_diesel_consumption";

/// Classify one raw JSON item.
///
/// `declared` is the submission-level discriminator; when set every item is
/// read as that category. Otherwise the record's own `document_type` wins,
/// then field presence in fixed order: electricity, gas, diesel, flight.
/// `index` names records that lack a `document_name`.
pub fn classify(
    index: usize,
    item: &Value,
    declared: Option<Category>,
) -> Result<ConsumptionRecord, DiscardedItem> {
    let document_name = item
        .get("document_name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let label = document_name
        .clone()
        .unwrap_or_else(|| format!("item[{index}]"));

    if !item.is_object() {
        return Err(DiscardedItem::new(
            label,
            declared,
            DiscardReason::InvalidField {
                field: "item".into(),
                detail: "expected a JSON object".into(),
            },
        ));
    }

    let raw: RawRecord = serde_json::from_value(item.clone()).map_err(|e| {
        DiscardedItem::new(
            label.clone(),
            declared,
            DiscardReason::InvalidField {
                field: "item".into(),
                detail: e.to_string(),
            },
        )
    })?;

    let category = match declared {
        Some(c) => Some(c),
        None => match raw.document_type.as_deref() {
            Some(t) => Some(t.parse::<Category>().map_err(|e| {
                DiscardedItem::new(
                    label.clone(),
                    None,
                    DiscardReason::InvalidField {
                        field: "document_type".into(),
                        detail: e.to_string(),
                    },
                )
            })?),
            None => infer_category(&raw),
        },
    };

    let Some(category) = category else {
        return Err(DiscardedItem::new(
            label,
            None,
            DiscardReason::MissingField {
                field: "category".into(),
            },
        ));
    };

    let Some(document_name) = document_name else {
        return Err(DiscardedItem::new(
            label,
            Some(category),
            DiscardReason::MissingField {
                field: "document_name".into(),
            },
        ));
    };

    let kind = match category {
        Category::Electricity => RecordKind::Electricity(MeteredFields {
            period: raw.period,
            consumption: raw.total_electricity_consumption,
            consumption_field: ELECTRICITY_FIELD,
        }),
        Category::Gas => RecordKind::Gas(MeteredFields {
            period: raw.period,
            consumption: raw.consumption_smc,
            consumption_field: GAS_FIELD,
        }),
        Category::Diesel => RecordKind::Diesel(MeteredFields {
            period: raw.period,
            consumption: raw.total_diesel_consumption,
            consumption_field: DIESEL_FIELD,
        }),
        Category::Flight => RecordKind::Flight(FlightFields {
            date: raw.date,
            travel: raw.travel,
            num_travelers: raw.num_travelers,
        }),
    };

    Ok(ConsumptionRecord {
        document_name,
        kind,
    })
}

fn infer_category(raw: &RawRecord) -> Option<Category> {
    if raw.total_electricity_consumption.is_some() {
        Some(Category::Electricity)
    } else if raw.consumption_smc.is_some() {
        Some(Category::Gas)
    } else if raw.total_diesel_consumption.is_some() {
        Some(Category::Diesel)
    } else if raw.travel.is_some() || raw.num_travelers.is_some() {
        Some(Category::Flight)
    } else {
        None
    }
}

/* ----------------------------
Dates
---------------------------- */

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("iso date regex"));

/// Strict `YYYY-MM-DD`; chrono alone would accept unpadded fields.
pub fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if !ISO_DATE.is_match(s) {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Year of a strict ISO date.
pub fn iso_year(s: &str) -> Option<i32> {
    parse_iso_date(s).map(|d| d.year())
}

/* ----------------------------
Outcomes
---------------------------- */

/// Accepted metered item; `period` and `consumption` are the submitted
/// sub-documents, untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeteredItem {
    pub document_name: String,
    pub period: Period,
    pub consumption: Consumption,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub from_airport_code: String,
    pub to_airport_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightItem {
    pub document_name: String,
    pub date: String,
    pub travel: Route,
    pub num_travelers: u32,
    pub distance_km: f64,
    /// `distance_km × num_travelers`
    pub impact: f64,
}

/// An accepted record, enriched for flights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProcessedItem {
    Metered(MeteredItem),
    Flight(FlightItem),
}

impl ProcessedItem {
    pub fn document_name(&self) -> &str {
        match self {
            ProcessedItem::Metered(m) => &m.document_name,
            ProcessedItem::Flight(f) => &f.document_name,
        }
    }

    /// Contribution to the category total.
    pub fn quantity(&self) -> f64 {
        match self {
            ProcessedItem::Metered(m) => m.consumption.amount().unwrap_or(0.0),
            ProcessedItem::Flight(f) => f.impact,
        }
    }
}

/// Why an item was left out of the totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum DiscardReason {
    MissingField { field: String },
    InvalidField { field: String, detail: String },
    OutOfYear { year: i32 },
    UnresolvableAirport { code: String },
}

impl DiscardReason {
    pub fn code(&self) -> &'static str {
        match self {
            DiscardReason::MissingField { .. } => "missing-field",
            DiscardReason::InvalidField { .. } => "invalid-field",
            DiscardReason::OutOfYear { .. } => "out-of-year",
            DiscardReason::UnresolvableAirport { .. } => "unresolvable-airport",
        }
    }

    pub fn describe(&self) -> String {
        match self {
            DiscardReason::MissingField { field } => format!("missing {field}"),
            DiscardReason::InvalidField { field, detail } => format!("invalid {field}: {detail}"),
            DiscardReason::OutOfYear { year } => format!("not in reporting year {year}"),
            DiscardReason::UnresolvableAirport { code } => {
                format!("airport '{code}' could not be resolved")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscardedItem {
    pub document_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(flatten)]
    pub reason: DiscardReason,
}

impl DiscardedItem {
    pub fn new(
        document_name: impl Into<String>,
        category: Option<Category>,
        reason: DiscardReason,
    ) -> Self {
        Self {
            document_name: document_name.into(),
            category,
            reason,
        }
    }
}

/// Per-item result of a category processor.
pub type ItemOutcome = Result<ProcessedItem, DiscardedItem>;
