use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Catalog tag used by the category chips and the category filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    Service,
    Goods,
    Material,
    Labor,
    Other,
}

impl ProductCategory {
    pub const ALL: [ProductCategory; 5] = [
        ProductCategory::Service,
        ProductCategory::Goods,
        ProductCategory::Material,
        ProductCategory::Labor,
        ProductCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductCategory::Service => "service",
            ProductCategory::Goods => "goods",
            ProductCategory::Material => "material",
            ProductCategory::Labor => "labor",
            ProductCategory::Other => "other",
        }
    }
}

impl fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProductCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("Unknown product category '{s}'"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub description: String,
    pub unit_price: Decimal,
    pub unit: String,
    pub category: ProductCategory,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when a product is created.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub unit_price: Decimal,
    pub unit: String,
    pub category: ProductCategory,
}

/// Partial update; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub unit_price: Option<Decimal>,
    pub unit: Option<String>,
    pub category: Option<ProductCategory>,
    pub is_active: Option<bool>,
}

impl ProductChanges {
    pub fn apply(self, product: &mut Product) {
        if let Some(name) = self.name {
            product.name = name;
        }
        if let Some(description) = self.description {
            product.description = description;
        }
        if let Some(unit_price) = self.unit_price {
            product.unit_price = unit_price;
        }
        if let Some(unit) = self.unit {
            product.unit = unit;
        }
        if let Some(category) = self.category {
            product.category = category;
        }
        if let Some(is_active) = self.is_active {
            product.is_active = is_active;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parses_its_own_tag() {
        for category in ProductCategory::ALL {
            assert_eq!(category.as_str().parse::<ProductCategory>(), Ok(category));
        }
        assert!("Service".parse::<ProductCategory>().is_err());
    }
}
