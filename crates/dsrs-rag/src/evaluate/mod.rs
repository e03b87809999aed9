//! Metrics and the evaluation harness.
//!
//! A [`Metric`] turns `(example, prediction, trace)` into a [`MetricOutcome`]:
//! a list of named pass/fail checks. The bootstrap optimizer calls it with the
//! run's trace to validate candidate demonstrations; [`Evaluate`] calls it
//! without one to score a devset.

pub mod evaluator;
pub mod metrics;

pub use evaluator::*;
pub use metrics::*;
