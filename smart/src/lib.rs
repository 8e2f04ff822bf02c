//! Detection and characterization of magnetic active regions on full-disk
//! line-of-sight magnetograms.
//!
//! Consecutive magnetograms are compared after differential rotation to find
//! regions whose flux is new or changing. Each region is measured (area, flux,
//! field statistics, polarity separation line) and classified by polarity balance,
//! size and growth.
//!
//! # Pipeline
//!
//! 1. [`pipeline::FrameProvider`] lists and fetches frames for a time range
//! 2. [`rotation::DifferentialRotation`] aligns the previous frame with the current one
//! 3. [`segment::FeatureSegmenter`] finds region contours in the frame pair
//! 4. [`characterize::FeatureCharacterizer`] measures each region
//! 5. [`pipeline::PropertySink`] stores the resulting [`feature::FeatureWire`] batch
//!
//! [`pipeline::FeatureExtractor`] drives the whole loop.

pub mod characterize;
pub mod config;
pub mod error;
pub mod feature;
pub mod image_proc;
pub mod magnetogram;
pub mod pipeline;
pub mod preprocess;
pub mod rotation;
pub mod segment;
pub mod synthetic;

pub use characterize::{FeatureCharacterizer, PreviousField};
pub use config::SmartConfig;
pub use error::{ConfigError, DegenerateFeature, Result, SmartError, StatsError};
pub use feature::{Classification, FeatureRecord, FeatureWire};
pub use magnetogram::{CoordinateMaps, Magnetogram};
pub use pipeline::{
    ExtractionSummary, FeatureBatch, FeatureExtractor, FrameDescriptor, FrameProvider,
    FramePairProcessor, PreviousFrame, PropertySink,
};
pub use rotation::{DifferentialRotation, NativeRotation};
pub use segment::FeatureSegmenter;
