//! Marker merge pipeline.
//!
//! # Responsibility
//! - Collapse groups of markers describing the same physical site into one
//!   aggregated survivor record.
//! - Sweep the whole store for proximity clusters and merge them.

pub mod engine;
pub mod scanner;
