//! Telar — Rust-native dataflow graph execution.
//!
//! Frame-aware scheduling over computation graphs with conditionals and
//! loops. Write-once values. BLAKE3 provenance tracing.

pub mod cli;
pub mod core;
pub mod ops;
pub mod trace;
