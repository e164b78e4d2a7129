//! Core engine: fetch → snapshot → match → score, then guardrailed execution.

pub mod executor;
pub mod scanner;
