//! Coral instances and the thread-affine sessions they hand out.

pub mod coral;
pub mod coral_session;
pub(crate) mod pool;

pub use coral::Coral;
pub use coral_session::{CoralSession, current_session_id};
