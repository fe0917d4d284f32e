//! Small helpers shared across the crate.

pub mod datetime;

pub use datetime::CoralDateTime;
