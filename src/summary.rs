//! Year-range sums over a stored snapshot.

use serde::Serialize;

use crate::category::Category;
use crate::record::{iso_year, ProcessedItem};
use crate::snapshot::AggregateSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SumError {
    #[error("start_year {start} is after end_year {end}")]
    InvertedRange { start: i32, end: i32 },
    #[error("no data for category {0}")]
    NoData(Category),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySum {
    pub category: Category,
    pub start_year: i32,
    pub end_year: i32,
    pub sum: f64,
    pub unit: &'static str,
    /// Items that fell inside the range.
    pub items: usize,
}

/// Sum one category of `snapshot` over `[start_year, end_year]`.
///
/// Metered items count when their start or end year is in range; flights
/// count their impact when the flight date is in range.
pub fn category_sum(
    snapshot: &AggregateSnapshot,
    category: Category,
    start_year: i32,
    end_year: i32,
) -> Result<CategorySum, SumError> {
    if start_year > end_year {
        return Err(SumError::InvertedRange {
            start: start_year,
            end: end_year,
        });
    }
    let items = snapshot.items(category);
    if items.is_empty() {
        return Err(SumError::NoData(category));
    }

    let range = start_year..=end_year;
    let in_range = |d: Option<&str>| d.and_then(iso_year).is_some_and(|y| range.contains(&y));

    let mut sum = 0.0;
    let mut n = 0;
    for it in items {
        let hit = match it {
            ProcessedItem::Metered(m) => {
                in_range(m.period.start_date.as_deref()) || in_range(m.period.end_date.as_deref())
            }
            ProcessedItem::Flight(f) => in_range(Some(f.date.as_str())),
        };
        if hit {
            sum += it.quantity();
            n += 1;
        }
    }

    Ok(CategorySum {
        category,
        start_year,
        end_year,
        sum,
        unit: category.unit(),
        items: n,
    })
}
