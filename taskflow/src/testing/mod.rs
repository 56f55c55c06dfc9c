//! Testing utilities for task pipelines and state containers.
//!
//! This module provides:
//! - [`Recorder`] for capturing notifications from any observable
//! - [`ScriptedOperation`] for driving retry and failure paths

mod recorder;
mod scripted;

pub use recorder::Recorder;
pub use scripted::ScriptedOperation;
