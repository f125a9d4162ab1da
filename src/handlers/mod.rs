pub mod dashboard;
pub mod invoice;
pub mod product;
pub mod user;
