pub mod amount;
pub mod invoice;
pub mod product;
pub mod user;
