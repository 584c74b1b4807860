//! API middleware.
//!
//! Authentication happens upstream; the only middleware here turns the
//! caller identity it forwards into a request extension.

pub mod owner;
