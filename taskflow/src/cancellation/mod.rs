//! Cooperative cancellation for task generations.
//!
//! Each `run` of a task owns a fresh [`GenerationToken`]. Starting a newer
//! generation cancels the previous token, which aborts its worker and stops it
//! from publishing anything.

mod token;

pub use token::{CancelCallback, GenerationToken};
