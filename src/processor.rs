//! # Category processors
//! Validate, year-filter and sum one category of records.
//!
//! Electricity, Gas and Diesel share `MeteredProcessor`, parameterized by the
//! record accessor and unit. Flights additionally resolve airports and derive
//! `distance_km` and `impact`.
//!
//! Every item yields an `ItemOutcome`; a failing item never stops the batch.

use serde::Serialize;

use crate::airports::AirportResolver;
use crate::category::Category;
use crate::geo;
use crate::record::{
    iso_year, ConsumptionRecord, DiscardReason, DiscardedItem, FlightFields, FlightItem,
    ItemOutcome, MeteredFields, MeteredItem, ProcessedItem, Route,
};

/// Output of one category processor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryResult {
    pub category: Category,
    pub accepted_items: Vec<ProcessedItem>,
    pub total_value: f64,
    pub unit: &'static str,
    pub discarded: Vec<DiscardedItem>,
}

impl CategoryResult {
    pub fn empty(category: Category) -> Self {
        Self {
            category,
            accepted_items: Vec::new(),
            total_value: 0.0,
            unit: category.unit(),
            discarded: Vec::new(),
        }
    }

    /// Fold per-item outcomes, keeping input order in both lists.
    pub fn collect<I: IntoIterator<Item = ItemOutcome>>(category: Category, outcomes: I) -> Self {
        let mut out = Self::empty(category);
        for o in outcomes {
            match o {
                Ok(item) => {
                    out.total_value += item.quantity();
                    out.accepted_items.push(item);
                }
                Err(d) => out.discarded.push(d),
            }
        }
        out
    }
}

fn discard(rec: &ConsumptionRecord, reason: DiscardReason) -> DiscardedItem {
    DiscardedItem::new(rec.document_name.clone(), Some(rec.category()), reason)
}

fn missing(rec: &ConsumptionRecord, field: &str) -> DiscardedItem {
    discard(
        rec,
        DiscardReason::MissingField {
            field: field.to_string(),
        },
    )
}

fn invalid(rec: &ConsumptionRecord, field: &str, detail: impl Into<String>) -> DiscardedItem {
    discard(
        rec,
        DiscardReason::InvalidField {
            field: field.to_string(),
            detail: detail.into(),
        },
    )
}

fn year_of(rec: &ConsumptionRecord, field: &str, raw: &str) -> Result<i32, DiscardedItem> {
    iso_year(raw).ok_or_else(|| invalid(rec, field, format!("'{raw}' is not a YYYY-MM-DD date")))
}

/* ----------------------------
Metered (Electricity, Gas, Diesel)
---------------------------- */

type MeteredAccessor = fn(&ConsumptionRecord) -> Option<&MeteredFields>;

#[derive(Clone, Copy)]
pub struct MeteredProcessor {
    pub category: Category,
    fields: MeteredAccessor,
}

impl std::fmt::Debug for MeteredProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeteredProcessor")
            .field("category", &self.category)
            .finish()
    }
}

pub const ELECTRICITY: MeteredProcessor = MeteredProcessor {
    category: Category::Electricity,
    fields: ConsumptionRecord::electricity,
};

pub const GAS: MeteredProcessor = MeteredProcessor {
    category: Category::Gas,
    fields: ConsumptionRecord::gas,
};

pub const DIESEL: MeteredProcessor = MeteredProcessor {
    category: Category::Diesel,
    fields: ConsumptionRecord::diesel,
};

impl MeteredProcessor {
    /// Records of other categories are ignored.
    pub fn process(&self, records: &[ConsumptionRecord], target_year: i32) -> CategoryResult {
        let outcomes = records
            .iter()
            .filter_map(|r| (self.fields)(r).map(|f| self.process_item(r, f, target_year)));
        CategoryResult::collect(self.category, outcomes)
    }

    fn process_item(
        &self,
        rec: &ConsumptionRecord,
        fields: &MeteredFields,
        target_year: i32,
    ) -> ItemOutcome {
        let field = fields.consumption_field;

        // (a) required fields, all before anything else
        let period = fields.period.as_ref().ok_or_else(|| missing(rec, "period"))?;
        let start = period
            .start_date
            .as_deref()
            .ok_or_else(|| missing(rec, "period.start_date"))?;
        let end = period
            .end_date
            .as_deref()
            .ok_or_else(|| missing(rec, "period.end_date"))?;
        let consumption = fields.consumption.as_ref().ok_or_else(|| missing(rec, field))?;
        if consumption.amount().is_none() {
            return Err(missing(rec, &format!("{field}.value")));
        }

        // (b) dates
        let start_year = year_of(rec, "period.start_date", start)?;
        let end_year = year_of(rec, "period.end_date", end)?;

        // (c) either endpoint in the target year
        if start_year != target_year && end_year != target_year {
            return Err(discard(rec, DiscardReason::OutOfYear { year: target_year }));
        }

        // (d) accept as received
        Ok(ProcessedItem::Metered(MeteredItem {
            document_name: rec.document_name.clone(),
            period: period.clone(),
            consumption: consumption.clone(),
        }))
    }
}

/* ----------------------------
Flight
---------------------------- */

/// Flight processor. Total is in passenger·kilometers.
pub struct FlightProcessor<'a> {
    resolver: &'a dyn AirportResolver,
}

struct ValidFlight<'r> {
    date: &'r str,
    from: &'r str,
    to: &'r str,
    travelers: u32,
}

impl<'a> FlightProcessor<'a> {
    pub fn new(resolver: &'a dyn AirportResolver) -> Self {
        Self { resolver }
    }

    /// Records of other categories are ignored. Items are handled one after
    /// another; the two endpoints of one item resolve concurrently.
    pub async fn process(&self, records: &[ConsumptionRecord], target_year: i32) -> CategoryResult {
        let mut outcomes = Vec::new();
        for rec in records {
            if let Some(fields) = rec.flight() {
                outcomes.push(self.process_item(rec, fields, target_year).await);
            }
        }
        CategoryResult::collect(Category::Flight, outcomes)
    }

    async fn process_item(
        &self,
        rec: &ConsumptionRecord,
        fields: &FlightFields,
        target_year: i32,
    ) -> ItemOutcome {
        let f = validate_flight(rec, fields)?;

        let year = year_of(rec, "date", f.date)?;
        if year != target_year {
            return Err(discard(rec, DiscardReason::OutOfYear { year: target_year }));
        }

        let (from, to) = tokio::join!(self.resolver.resolve(f.from), self.resolver.resolve(f.to));
        let from = from.ok_or_else(|| {
            discard(
                rec,
                DiscardReason::UnresolvableAirport {
                    code: f.from.to_string(),
                },
            )
        })?;
        let to = to.ok_or_else(|| {
            discard(
                rec,
                DiscardReason::UnresolvableAirport {
                    code: f.to.to_string(),
                },
            )
        })?;

        let distance_km = geo::distance_km(&from, &to);
        Ok(ProcessedItem::Flight(FlightItem {
            document_name: rec.document_name.clone(),
            date: f.date.to_string(),
            travel: Route {
                from_airport_code: f.from.to_string(),
                to_airport_code: f.to.to_string(),
            },
            num_travelers: f.travelers,
            distance_km,
            impact: distance_km * f64::from(f.travelers),
        }))
    }
}

fn validate_flight<'r>(
    rec: &ConsumptionRecord,
    fields: &'r FlightFields,
) -> Result<ValidFlight<'r>, DiscardedItem> {
    let non_empty = |s: &'r Option<String>| s.as_deref().map(str::trim).filter(|s| !s.is_empty());

    let date = non_empty(&fields.date).ok_or_else(|| missing(rec, "date"))?;
    let travel = fields.travel.as_ref().ok_or_else(|| missing(rec, "travel"))?;
    let from = non_empty(&travel.from_airport_code)
        .ok_or_else(|| missing(rec, "travel.from_airport_code"))?;
    let to = non_empty(&travel.to_airport_code)
        .ok_or_else(|| missing(rec, "travel.to_airport_code"))?;
    let n = fields
        .num_travelers
        .ok_or_else(|| missing(rec, "num_travelers"))?;
    let travelers = u32::try_from(n)
        .ok()
        .filter(|n| *n >= 1)
        .ok_or_else(|| invalid(rec, "num_travelers", format!("{n} is not a positive count")))?;

    Ok(ValidFlight {
        date,
        from,
        to,
        travelers,
    })
}
