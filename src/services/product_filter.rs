use serde::Serialize;

use crate::models::product::{Product, ProductCategory};

/// Criteria behind the product list. The filtered list is a pure function of
/// these fields and the source collection.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub category: Option<ProductCategory>,
    pub active_only: bool,
}

impl ProductFilter {
    pub fn new(search: Option<String>, category: Option<ProductCategory>, active_only: bool) -> Self {
        Self { search, category, active_only }
    }

    /// Lower-cased, trimmed search text, or `None` when it imposes no constraint.
    fn needle(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    fn matches_needle(&self, product: &Product, needle: Option<&str>) -> bool {
        if self.active_only && !product.is_active {
            return false;
        }
        if let Some(category) = self.category {
            if product.category != category {
                return false;
            }
        }
        match needle {
            Some(needle) => {
                product.name.to_lowercase().contains(needle)
                    || product.description.to_lowercase().contains(needle)
            }
            None => true,
        }
    }

    /// Keeps matching products in their source order.
    pub fn apply(&self, products: Vec<Product>) -> Vec<Product> {
        let needle = self.needle();
        products
            .into_iter()
            .filter(|p| self.matches_needle(p, needle.as_deref()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub category: ProductCategory,
    pub count: usize,
}

/// Per-category counts for the category chips, every category included.
pub fn category_counts(products: &[Product], active_only: bool) -> Vec<CategoryCount> {
    ProductCategory::ALL
        .into_iter()
        .map(|category| CategoryCount {
            category,
            count: products
                .iter()
                .filter(|p| p.category == category && (!active_only || p.is_active))
                .count(),
        })
        .collect()
}
