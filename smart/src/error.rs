//! Error taxonomy for the feature extraction pipeline.
//!
//! Errors are split by how far they are allowed to travel:
//!
//! - [`ConfigError`] is a startup precondition failure. A pipeline built from an
//!   invalid configuration never processes a single frame.
//! - [`DegenerateFeature`] is scoped to one detected region. The extractor logs it
//!   and drops that region, the rest of the frame pair is unaffected.
//! - [`SmartError`] covers everything recoverable at frame-pair granularity plus the
//!   sink rejection that ends a run.

use thiserror::Error;

/// Invalid static configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },
    #[error("{name} must not be negative, got {value}")]
    Negative { name: &'static str, value: f64 },
    #[error("{name} must be an odd kernel size, got {size}")]
    EvenKernel { name: &'static str, size: usize },
    #[error("{name} = {value} is outside the allowed range ({min}, {max}]")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("Failed to read configuration: {0}")]
    Io(String),
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Aggregation over a masked sample failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatsError {
    #[error("No valid samples under the mask")]
    NoData,
    #[error("Non-finite value encountered at index {0:?}")]
    NonFinite((usize, usize)),
    #[error("Value array has shape {values:?} but mask has shape {mask:?}")]
    ShapeMismatch {
        values: (usize, usize),
        mask: (usize, usize),
    },
}

/// A detected region whose properties cannot be computed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DegenerateFeature {
    #[error("Feature footprint is empty after intersecting with the disk mask")]
    EmptyFootprint,
    #[error("Polarity separation thinning did not converge within {iterations} iterations")]
    SkeletonDidNotConverge { iterations: usize },
}

/// Top-level error for frame and feature processing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SmartError {
    #[error("Input unavailable: {0}")]
    InputUnavailable(String),
    #[error("Degenerate feature: {0}")]
    Degenerate(#[from] DegenerateFeature),
    #[error("Property sink rejected batch: {0}")]
    SinkRejected(String),
    #[error("Shape mismatch for {what}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("Invalid wire record: {0}")]
    InvalidWire(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Stats(#[from] StatsError),
}

pub type Result<T, E = SmartError> = std::result::Result<T, E>;
