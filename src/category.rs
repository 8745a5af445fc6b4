//! # Categories
//! The four record classes the engine knows about, with their reporting unit.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A consumption/travel data class. Ordering is the stable report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Electricity,
    Gas,
    Diesel,
    Flight,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Electricity,
        Category::Gas,
        Category::Diesel,
        Category::Flight,
    ];

    /// Unit of the category total.
    pub fn unit(self) -> &'static str {
        match self {
            Category::Electricity => "kWh",
            Category::Gas => "Smc",
            Category::Diesel => "L",
            Category::Flight => "passenger·kilometers",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Electricity => "Electricity",
            Category::Gas => "Gas",
            Category::Diesel => "Diesel",
            Category::Flight => "Flight",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category '{0}' (expected electricity, gas, diesel or flight)")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    /// Case-insensitive; accepts the canonical names only.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "electricity" => Ok(Category::Electricity),
            "gas" => Ok(Category::Gas),
            "diesel" => Ok(Category::Diesel),
            "flight" => Ok(Category::Flight),
            _ => Err(UnknownCategory(s.to_string())),
        }
    }
}
