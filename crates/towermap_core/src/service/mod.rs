//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Keep transport layers decoupled from storage details and guarantee
//!   the one-audit-entry-per-mutation rule.

pub mod marker_service;
