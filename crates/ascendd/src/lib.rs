//! Ascend daemon library - exposes modules for testing.

pub mod advisor;
pub mod engine;
pub mod ollama;
pub mod report;
pub mod sweeper;
