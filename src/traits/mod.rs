pub mod record;

pub use record::{CoralRecord, Entity};
