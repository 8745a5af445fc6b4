//! # Aggregation coordinator
//! Routes classified records to the category processors, merges their
//! results into one snapshot and builds the report returned to the caller.
//!
//! No I/O besides airport resolution; persisting the snapshot is the
//! caller's job (see `store`).

use chrono::Utc;
use metrics::counter;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::airports::DynResolver;
use crate::category::Category;
use crate::error::SubmissionError;
use crate::processor::{CategoryResult, FlightProcessor, DIESEL, ELECTRICITY, GAS};
use crate::record::{classify, ConsumptionRecord, DiscardedItem};
use crate::snapshot::{empty_data, AggregateSnapshot};

/// Who is submitting, resolved at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContext {
    pub client_name: String,
    pub username: String,
    pub authorized_user_keys: Vec<String>,
}

/// A validated submission: reporting year plus raw items.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub year: i32,
    /// Explicit single-category mode when set.
    pub document_type: Option<Category>,
    pub items: Vec<Value>,
}

impl Submission {
    pub fn new(year: i32, items: Vec<Value>) -> Self {
        Self {
            year,
            document_type: None,
            items,
        }
    }

    pub fn single_category(year: i32, category: Category, items: Vec<Value>) -> Self {
        Self {
            year,
            document_type: Some(category),
            items,
        }
    }

    /// Parse `{ "year": 2023 | "2023", "items": [...], "document_type"?: "gas" }`.
    pub fn from_json(body: &Value) -> Result<Self, SubmissionError> {
        let obj = body.as_object().ok_or(SubmissionError::NotAnObject)?;

        let year = match obj.get("year") {
            None | Some(Value::Null) => return Err(SubmissionError::MissingYear),
            Some(v) => parse_year(v)?,
        };

        let items = match obj.get("items") {
            None | Some(Value::Null) => return Err(SubmissionError::MissingItems),
            Some(Value::Array(a)) => a.clone(),
            Some(_) => return Err(SubmissionError::ItemsNotArray),
        };

        let document_type = match obj.get("document_type") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.parse::<Category>()?),
            Some(other) => {
                return Err(crate::category::UnknownCategory(other.to_string()).into());
            }
        };

        Ok(Self {
            year,
            document_type,
            items,
        })
    }
}

fn parse_year(v: &Value) -> Result<i32, SubmissionError> {
    let parsed = match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed
        .filter(|y| (1..=9999).contains(y))
        .map(|y| y as i32)
        .ok_or_else(|| SubmissionError::InvalidYear(v.to_string()))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub total: f64,
    pub unit: &'static str,
    pub accepted: usize,
    pub discarded: usize,
}

/// Response payload: totals, units and the discard report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    pub year: i32,
    pub totals: BTreeMap<Category, CategoryTotal>,
    pub discarded: Vec<DiscardedItem>,
    /// Present only when something was discarded.
    pub note: Option<String>,
}

impl AggregateReport {
    pub fn accepted_count(&self) -> usize {
        self.totals.values().map(|t| t.accepted).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub snapshot: AggregateSnapshot,
    pub report: AggregateReport,
}

pub struct Aggregator {
    resolver: DynResolver,
}

impl Aggregator {
    pub fn new(resolver: DynResolver) -> Self {
        Self { resolver }
    }

    pub async fn aggregate(&self, ctx: &ClientContext, submission: &Submission) -> Aggregation {
        let year = submission.year;

        // 1) classify once
        let mut records: Vec<ConsumptionRecord> = Vec::with_capacity(submission.items.len());
        let mut unclassified: Vec<DiscardedItem> = Vec::new();
        for (i, item) in submission.items.iter().enumerate() {
            match classify(i, item, submission.document_type) {
                Ok(r) => records.push(r),
                Err(d) => unclassified.push(d),
            }
        }

        // 2) every processor runs; empty input gives an empty result
        let results = [
            ELECTRICITY.process(&records, year),
            GAS.process(&records, year),
            DIESEL.process(&records, year),
            FlightProcessor::new(self.resolver.as_ref())
                .process(&records, year)
                .await,
        ];

        // 3) merge
        for d in &unclassified {
            counter!("aggregate_items_discarded_total", "reason" => d.reason.code()).increment(1);
        }
        let mut data = empty_data();
        let mut totals = BTreeMap::new();
        let mut discarded = unclassified;
        for r in results {
            record_metrics(&r);
            let CategoryResult {
                category,
                accepted_items,
                total_value,
                unit,
                discarded: dropped,
            } = r;
            debug!(
                target: "aggregate",
                %category, accepted = accepted_items.len(), discarded = dropped.len(), total = total_value,
                "category processed"
            );
            totals.insert(
                category,
                CategoryTotal {
                    total: total_value,
                    unit,
                    accepted: accepted_items.len(),
                    discarded: dropped.len(),
                },
            );
            data.insert(category, accepted_items);
            discarded.extend(dropped);
        }

        let note = discard_note(&discarded);
        let report = AggregateReport {
            year,
            totals,
            discarded,
            note,
        };

        let snapshot = AggregateSnapshot {
            client_name: ctx.client_name.clone(),
            created_at: Utc::now(),
            username: ctx.username.clone(),
            authorized_user_keys: ctx.authorized_user_keys.clone(),
            year,
            data,
        };

        counter!("aggregate_submissions_total").increment(1);
        info!(
            target: "aggregate",
            client = %ctx.client_name,
            year,
            items = submission.items.len(),
            accepted = report.accepted_count(),
            discarded = report.discarded.len(),
            "submission aggregated"
        );

        Aggregation { snapshot, report }
    }
}

fn record_metrics(r: &CategoryResult) {
    let category = r.category.as_str();
    counter!("aggregate_items_accepted_total", "category" => category)
        .increment(r.accepted_items.len() as u64);
    for d in &r.discarded {
        counter!("aggregate_items_discarded_total", "reason" => d.reason.code()).increment(1);
    }
}

/// Human-readable summary of discards, `None` when there are none.
pub fn discard_note(discarded: &[DiscardedItem]) -> Option<String> {
    if discarded.is_empty() {
        return None;
    }
    let listed = discarded
        .iter()
        .map(|d| format!("{} ({})", d.document_name, d.reason.describe()))
        .collect::<Vec<_>>()
        .join("; ");
    Some(format!(
        "{} item(s) were not included in the totals: {listed}",
        discarded.len()
    ))
}
