//! API endpoint handlers, one module per route.

pub mod analyze;
pub mod compare;
pub mod health;
pub mod summaries;
