//! Task pipelines.
//!
//! This module provides:
//! - [`Task`], a wrapped operation with pending/result/error channels
//! - [`TaskBuilder`] with fail-fast validation
//! - [`RetryConfig`] linear backoff policy and [`TaskConfig`] loading
//! - The [`Operation`] trait for struct-based operations

mod config;
mod integration_tests;
mod operation;
mod pipeline;
mod retry;

pub use config::TaskConfig;
pub use operation::{BoxedOperation, Operation};
pub use pipeline::{Task, TaskBuilder, TaskFailure};
pub use retry::RetryConfig;
