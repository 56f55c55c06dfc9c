//! Reactive state containers.
//!
//! A [`StateContainer`] holds one immutable snapshot and replaces it
//! atomically. [`Selector`]s derive deduplicated projections from it and share
//! one upstream subscription between all of their subscribers.

mod container;
mod selector;

pub use container::StateContainer;
pub use selector::Selector;
