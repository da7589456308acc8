//! Provenance tracing — BLAKE3 fingerprints and append-only JSONL run logs.

pub mod eventlog;
pub mod hasher;
