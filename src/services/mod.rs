//! Pure computations over in-memory snapshots loaded from the store.

pub mod dashboard;
pub mod product_filter;
