//! Shared test infrastructure for the `smart` pipeline.
//!
//! # Test doubles
//! - [`ScriptedProvider`]: in-memory frames, with descriptors that fail on demand
//!   and a log of every fetch
//! - [`RecordingSink`]: keeps every batch, optionally rejecting one of them
//! - [`IdentityRotation`]: returns the image unchanged, so tests can reason about
//!   pixel positions without differential rotation
//!
//! # Artifacts
//! [`output_path`] places files under `<workspace>/test_output/` for manual
//! inspection after a run.
//!
//! ```rust
//! use test_helpers::{init_logging, RecordingSink};
//!
//! init_logging();
//! let sink = RecordingSink::default();
//! assert!(sink.batches.is_empty());
//! ```

use std::cell::RefCell;
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayView2};
use once_cell::sync::Lazy;
use smart::pipeline::{FeatureBatch, FrameDescriptor, FrameProvider, PropertySink};
use smart::rotation::DifferentialRotation;
use smart::{Magnetogram, SmartError};

#[derive(thiserror::Error, Debug)]
pub enum TestHelperError {
    #[error("Failed to find project root: {0}")]
    ProjectRootNotFound(String),
}

/// Route `log` output through the test harness; safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Walk up from the working directory to the Cargo workspace root.
pub fn find_project_root() -> Result<PathBuf, TestHelperError> {
    let mut current_dir = env::current_dir().map_err(|e| {
        TestHelperError::ProjectRootNotFound(format!("Failed to get current directory: {e}"))
    })?;

    loop {
        let cargo_toml = current_dir.join("Cargo.toml");
        if cargo_toml.exists() {
            let content = std::fs::read_to_string(&cargo_toml).map_err(|e| {
                TestHelperError::ProjectRootNotFound(format!("Failed to read Cargo.toml: {e}"))
            })?;
            if content.contains("[workspace]") {
                return Ok(current_dir);
            }
        }
        if !current_dir.pop() {
            break;
        }
    }

    Err(TestHelperError::ProjectRootNotFound(
        "Workspace root not found".to_string(),
    ))
}

static PROJECT_ROOT: Lazy<PathBuf> =
    Lazy::new(|| find_project_root().expect("Failed to find project root directory"));

/// `<workspace>/test_output/`, created on first use.
pub fn get_output_dir() -> PathBuf {
    let output_dir = PROJECT_ROOT.join("test_output");
    if !output_dir.exists() {
        std::fs::create_dir_all(&output_dir).expect("Failed to create output directory");
    }
    output_dir
}

/// Path of a test artifact inside [`get_output_dir`].
pub fn output_path<P: AsRef<Path>>(path: P) -> PathBuf {
    get_output_dir().join(path)
}

/// In-memory provider whose frames can be made unavailable per URL.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    frames: Vec<(FrameDescriptor, Magnetogram)>,
    failing: HashSet<String>,
    fetches: RefCell<Vec<String>>,
}

impl ScriptedProvider {
    /// Serve `frames` as `frame://0`, `frame://1`, ...
    pub fn new(frames: Vec<Magnetogram>) -> Self {
        let frames = frames
            .into_iter()
            .enumerate()
            .map(|(i, frame)| {
                let descriptor = FrameDescriptor {
                    url: format!("frame://{i}"),
                    date_obs: frame.time(),
                };
                (descriptor, frame)
            })
            .collect();
        Self {
            frames,
            ..Default::default()
        }
    }

    /// Make every fetch of frame `index` fail with `InputUnavailable`.
    pub fn fail_on(mut self, index: usize) -> Self {
        self.failing.insert(format!("frame://{index}"));
        self
    }

    /// URLs fetched so far, in call order.
    pub fn fetches(&self) -> Vec<String> {
        self.fetches.borrow().clone()
    }
}

impl FrameProvider for ScriptedProvider {
    fn list(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> smart::Result<Vec<FrameDescriptor>> {
        Ok(self
            .frames
            .iter()
            .map(|(d, _)| d.clone())
            .filter(|d| d.date_obs >= start && d.date_obs <= end)
            .collect())
    }

    fn fetch(&self, descriptor: &FrameDescriptor) -> smart::Result<Magnetogram> {
        self.fetches.borrow_mut().push(descriptor.url.clone());
        if self.failing.contains(&descriptor.url) {
            return Err(SmartError::InputUnavailable(format!(
                "{} is scripted to fail",
                descriptor.url
            )));
        }
        self.frames
            .iter()
            .find(|(d, _)| d.url == descriptor.url)
            .map(|(_, frame)| frame.clone())
            .ok_or_else(|| SmartError::InputUnavailable(descriptor.url.clone()))
    }
}

/// Sink that records provenances and batches.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub provenances: Vec<String>,
    pub batches: Vec<FeatureBatch>,
    /// Zero-based index of the insert call to reject
    pub reject_at: Option<usize>,
    inserts: usize,
}

impl RecordingSink {
    pub fn rejecting_at(call: usize) -> Self {
        Self {
            reject_at: Some(call),
            ..Default::default()
        }
    }

    pub fn feature_count(&self) -> usize {
        self.batches.iter().map(|b| b.features.len()).sum()
    }
}

impl PropertySink for RecordingSink {
    fn register_provenance(&mut self, provenance: &str) -> smart::Result<()> {
        self.provenances.push(provenance.to_string());
        Ok(())
    }

    fn insert(&mut self, batch: &FeatureBatch) -> smart::Result<()> {
        let call = self.inserts;
        self.inserts += 1;
        if self.reject_at == Some(call) {
            return Err(SmartError::SinkRejected(format!(
                "duplicate batch for {}",
                batch.end
            )));
        }
        self.batches.push(batch.clone());
        Ok(())
    }
}

/// Rotation that leaves every pixel in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityRotation;

impl DifferentialRotation for IdentityRotation {
    fn rotate(
        &self,
        image: &ArrayView2<f64>,
        _center: (f64, f64),
        _radius: f64,
        _elapsed_seconds: f64,
    ) -> Array2<f64> {
        image.to_owned()
    }
}
