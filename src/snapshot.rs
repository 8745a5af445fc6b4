//! # Aggregate snapshot
//! The persisted unit: one immutable document per submission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::category::Category;
use crate::record::ProcessedItem;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub client_name: String,
    /// Stamped when aggregation completes.
    pub created_at: DateTime<Utc>,
    pub username: String,
    /// Copied from the client at submission time.
    pub authorized_user_keys: Vec<String>,
    pub year: i32,
    /// Every category key is present, possibly with an empty list.
    pub data: BTreeMap<Category, Vec<ProcessedItem>>,
}

impl AggregateSnapshot {
    pub fn items(&self, category: Category) -> &[ProcessedItem] {
        self.data.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_authorized(&self, api_key: &str) -> bool {
        self.authorized_user_keys.iter().any(|k| k == api_key)
    }
}

/// A `data` map with all four category keys and no items.
pub fn empty_data() -> BTreeMap<Category, Vec<ProcessedItem>> {
    Category::ALL.iter().map(|c| (*c, Vec::new())).collect()
}
