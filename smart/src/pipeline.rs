//! Ingestion loop over a time range of magnetograms.
//!
//! Frames are walked in chronological order. Each frame is paired with its
//! predecessor: the predecessor is rotated onto the current frame, the pair is
//! segmented, every feature is characterized, and the batch is handed to the
//! property sink.
//!
//! The rolling predecessor is an explicit [`PreviousFrame`] state. A failed fetch
//! or a failed pair drops it to [`PreviousFrame::NoPreviousFrame`], and the next
//! pair re-fetches its predecessor instead of reusing anything stale.
//!
//! Collaborators are traits: [`FrameProvider`] lists and fetches frames,
//! [`DifferentialRotation`] aligns them, [`PropertySink`] stores the results.

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::characterize::{FeatureCharacterizer, PreviousField};
use crate::config::SmartConfig;
use crate::error::{ConfigError, Result, SmartError};
use crate::feature::{FeatureRecord, FeatureWire};
use crate::magnetogram::Magnetogram;
use crate::rotation::DifferentialRotation;
use crate::segment::FeatureSegmenter;

/// Handle of one frame available from a [`FrameProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDescriptor {
    pub url: String,
    pub date_obs: DateTime<Utc>,
}

/// Source of magnetogram frames.
pub trait FrameProvider {
    /// Descriptors of every frame observed in `[start, end]`.
    fn list(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<FrameDescriptor>>;

    /// Fetch and parse one frame.
    ///
    /// # Errors
    /// [`SmartError::InputUnavailable`] when the frame cannot be retrieved or
    /// parsed. The pipeline skips such frames.
    fn fetch(&self, descriptor: &FrameDescriptor) -> Result<Magnetogram>;
}

impl<P: FrameProvider + ?Sized> FrameProvider for &P {
    fn list(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<FrameDescriptor>> {
        (**self).list(start, end)
    }

    fn fetch(&self, descriptor: &FrameDescriptor) -> Result<Magnetogram> {
        (**self).fetch(descriptor)
    }
}

/// One frame pair's features, tagged for the property database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBatch {
    pub provenance: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub features: Vec<FeatureWire>,
}

/// Destination of feature batches.
pub trait PropertySink {
    /// Declare the provenance label used by subsequent batches.
    fn register_provenance(&mut self, provenance: &str) -> Result<()>;

    /// Store one batch.
    ///
    /// # Errors
    /// [`SmartError::SinkRejected`] carrying the sink's message. The pipeline
    /// surfaces it and stops; it never retries.
    fn insert(&mut self, batch: &FeatureBatch) -> Result<()>;
}

/// Rolling predecessor of the frame being processed.
#[derive(Debug, Clone, Default)]
pub enum PreviousFrame {
    /// Nothing usable; the next pair must re-fetch its predecessor
    #[default]
    NoPreviousFrame,
    /// Last successfully fetched and processed frame
    HavePreviousFrame(Box<Magnetogram>),
}

impl PreviousFrame {
    /// Transition after a frame was fetched (and, if paired, processed).
    pub fn on_fetch_success(self, frame: Magnetogram) -> Self {
        PreviousFrame::HavePreviousFrame(Box::new(frame))
    }

    /// Transition after a fetch or a pair failed.
    pub fn on_fetch_failure(self) -> Self {
        PreviousFrame::NoPreviousFrame
    }

    pub fn is_available(&self) -> bool {
        matches!(self, PreviousFrame::HavePreviousFrame(_))
    }

    /// Take the frame out, leaving [`PreviousFrame::NoPreviousFrame`] behind.
    pub fn take(&mut self) -> Option<Magnetogram> {
        match std::mem::take(self) {
            PreviousFrame::HavePreviousFrame(frame) => Some(*frame),
            PreviousFrame::NoPreviousFrame => None,
        }
    }
}

/// Features of one frame pair.
#[derive(Debug, Clone)]
pub struct PairOutcome {
    /// Characterized features in segmentation order
    pub features: Vec<FeatureRecord>,
    /// Regions dropped as degenerate
    pub degenerate: usize,
    /// Seconds between the two frames
    pub elapsed_seconds: f64,
}

/// Segments and characterizes one frame pair.
#[derive(Debug, Clone)]
pub struct FramePairProcessor {
    segmenter: FeatureSegmenter,
    characterizer: FeatureCharacterizer,
}

impl FramePairProcessor {
    /// Build both stages from one validated configuration.
    pub fn new(config: &SmartConfig) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            segmenter: FeatureSegmenter::new(config)?,
            characterizer: FeatureCharacterizer::new(config)?,
        })
    }

    /// Rotate `previous` onto `current`, segment the pair and characterize every
    /// region in parallel.
    ///
    /// Degenerate regions are logged and counted, not returned.
    ///
    /// # Errors
    /// Any non-degenerate failure, e.g. [`SmartError::ShapeMismatch`] between the
    /// frames. The whole pair is then unusable.
    pub fn process(
        &self,
        previous: &Magnetogram,
        current: &Magnetogram,
        rotation: &dyn DifferentialRotation,
    ) -> Result<PairOutcome> {
        if previous.shape() != current.shape() {
            return Err(SmartError::ShapeMismatch {
                what: "previous frame",
                expected: current.shape(),
                found: previous.shape(),
            });
        }

        let elapsed_seconds =
            (current.time() - previous.time()).num_milliseconds() as f64 / 1000.0;
        let rotated = rotation.rotate(
            &previous.data(),
            previous.center(),
            previous.disk_radius(),
            elapsed_seconds,
        );

        let polygons = self.segmenter.extract_features(
            &current.data(),
            &rotated.view(),
            current.center(),
            current.disk_radius(),
        )?;
        debug!(
            "{} candidate regions at {} ({elapsed_seconds} s after predecessor)",
            polygons.len(),
            current.time()
        );

        let rotated_view = rotated.view();
        let results: Vec<Result<FeatureRecord>> = polygons
            .par_iter()
            .enumerate()
            .map(|(index, polygon)| {
                self.characterizer.characterize(
                    current,
                    index,
                    polygon,
                    Some(PreviousField {
                        data: rotated_view,
                        elapsed_seconds,
                    }),
                )
            })
            .collect();

        let mut features = Vec::with_capacity(results.len());
        let mut degenerate = 0;
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(feature) => features.push(feature),
                Err(SmartError::Degenerate(reason)) => {
                    warn!("Skipping feature {index} at {}: {reason}", current.time());
                    degenerate += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(PairOutcome {
            features,
            degenerate,
            elapsed_seconds,
        })
    }
}

/// Counters of one [`FeatureExtractor::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSummary {
    /// Frames listed by the provider
    pub listed: usize,
    /// Pairs whose batch the sink accepted
    pub pairs_processed: usize,
    /// Pairs skipped because a frame was unavailable or the pair failed
    pub pairs_skipped: usize,
    /// Predecessors fetched a second time after a failure
    pub refetches: usize,
    pub features_inserted: usize,
    pub features_degenerate: usize,
}

/// Drives a [`FramePairProcessor`] over every frame in a time range.
pub struct FeatureExtractor<P, R, S> {
    provenance: String,
    processor: FramePairProcessor,
    provider: P,
    rotation: R,
    sink: S,
}

impl<P, R, S> FeatureExtractor<P, R, S>
where
    P: FrameProvider,
    R: DifferentialRotation,
    S: PropertySink,
{
    /// Assemble an extractor.
    ///
    /// # Errors
    /// A [`ConfigError`] for an invalid configuration, before any frame is touched.
    pub fn new(
        config: &SmartConfig,
        provider: P,
        rotation: R,
        sink: S,
    ) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            provenance: config.provenance.clone(),
            processor: FramePairProcessor::new(config)?,
            provider,
            rotation,
            sink,
        })
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Extract and store the features of every consecutive frame pair in
    /// `[start, end]`.
    ///
    /// # Errors
    /// * Listing failures from the provider
    /// * [`SmartError::SinkRejected`] from provenance registration or any batch;
    ///   the run stops there
    pub fn run(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<ExtractionSummary> {
        self.sink.register_provenance(&self.provenance)?;

        let mut descriptors = self.provider.list(start, end)?;
        descriptors.sort_by_key(|d| d.date_obs);
        let mut summary = ExtractionSummary {
            listed: descriptors.len(),
            ..Default::default()
        };

        if descriptors.is_empty() {
            warn!("No magnetograms found between {start} and {end}");
            return Ok(summary);
        }
        info!(
            "{} magnetograms listed between {start} and {end}",
            descriptors.len()
        );

        let mut previous = match self.provider.fetch(&descriptors[0]) {
            Ok(frame) => PreviousFrame::default().on_fetch_success(frame),
            Err(e) => {
                warn!("Could not fetch {}: {e}", descriptors[0].url);
                PreviousFrame::default().on_fetch_failure()
            }
        };

        let pairs = descriptors.len() - 1;
        for (i, pair) in descriptors.windows(2).enumerate() {
            let (last, next) = (&pair[0], &pair[1]);
            info!(
                "processing magnetogram {} of {} ({})",
                i + 1,
                pairs,
                next.date_obs
            );

            let predecessor = match previous.take() {
                Some(frame) => frame,
                None => {
                    info!("Re-fetching predecessor {}", last.url);
                    summary.refetches += 1;
                    match self.provider.fetch(last) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(
                                "Skipping pair ending at {}: predecessor unavailable: {e}",
                                next.date_obs
                            );
                            summary.pairs_skipped += 1;
                            previous = previous.on_fetch_failure();
                            continue;
                        }
                    }
                }
            };

            let current = match self.provider.fetch(next) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Skipping {}: {e}", next.url);
                    summary.pairs_skipped += 1;
                    previous = previous.on_fetch_failure();
                    continue;
                }
            };

            let outcome = match self
                .processor
                .process(&predecessor, &current, &self.rotation)
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Skipping pair ending at {}: {e}", next.date_obs);
                    summary.pairs_skipped += 1;
                    previous = previous.on_fetch_failure();
                    continue;
                }
            };

            let batch = FeatureBatch {
                provenance: self.provenance.clone(),
                start: predecessor.time(),
                end: current.time(),
                features: outcome.features.iter().map(FeatureRecord::to_wire).collect(),
            };
            if let Err(e) = self.sink.insert(&batch) {
                error!("Error while inserting features for {}: {e}", next.date_obs);
                return Err(e);
            }

            summary.pairs_processed += 1;
            summary.features_inserted += batch.features.len();
            summary.features_degenerate += outcome.degenerate;
            previous = previous.on_fetch_success(current);
        }

        info!(
            "Extraction finished: {} pairs processed, {} skipped, {} features inserted",
            summary.pairs_processed, summary.pairs_skipped, summary.features_inserted
        );
        Ok(summary)
    }
}
