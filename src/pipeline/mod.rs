pub mod extraction;
pub mod inference;
pub mod localization;
pub mod findings;
pub mod narrative;
pub mod comparison;
pub mod staging;
pub mod processor;
