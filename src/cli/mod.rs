//! CLI-specific functionality for the taskserver binary
//!
//! This module contains argument parsing and the demo project the `run`
//! command schedules.

pub mod args;
pub mod demo;

pub use args::{Args, Commands, ExecutionMode, RunConfig};
pub use demo::{IterationTask, demo_project};
