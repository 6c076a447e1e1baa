//! Integration test modules for Candide
//!
//! - engine: Construction, queues, diagnostics, hardware events
//! - voices: Allocation, stealing, zones, lifecycle ordering
//! - expression: Bend scaling, precedence, resets

pub mod engine;
pub mod expression;
pub mod voices;
