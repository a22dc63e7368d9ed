//! Response analysis.
//!
//! Aggregation is a pure reduction over a form's full response set.

pub mod aggregator;

pub use aggregator::*;
