//! Time-persistent feature segmentation.
//!
//! Two binarized frames, the current one and the previous one rotated onto the
//! current grid, are compared after growing both masks. Anything that changed state
//! between the grown masks is treated as transient and removed from the current
//! mask; what survives is grown once more to reconnect fragments and outlined.

use std::sync::Arc;

use log::debug;
use ndarray::{Array2, ArrayView2};

use crate::config::SmartConfig;
use crate::error::{ConfigError, Result, SmartError};
use crate::image_proc::contours::{find_external_contours, BoundaryPolygon};
use crate::image_proc::kernels::disk_element;
use crate::image_proc::morphology::{count_nonzero, dilate, subtract, xor};
use crate::preprocess::Preprocessor;

/// Extracts outer boundaries of time-persistent active regions.
#[derive(Debug, Clone)]
pub struct FeatureSegmenter {
    preprocessor: Preprocessor,
    element: Arc<Array2<u8>>,
    minimal_feature_area: usize,
}

impl FeatureSegmenter {
    /// Build a segmenter from a validated configuration.
    pub fn new(config: &SmartConfig) -> std::result::Result<Self, ConfigError> {
        let preprocessor = Preprocessor::new(config)?;
        Ok(Self {
            preprocessor,
            element: disk_element(config.feature_dilation_radius),
            minimal_feature_area: config.minimal_feature_area,
        })
    }

    /// The preprocessor used by [`FeatureSegmenter::extract_features`].
    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    /// Segment two preprocessed frames.
    ///
    /// # Arguments
    /// * `current` - Preprocessed current frame
    /// * `previous` - Preprocessed previous frame, already rotated onto `current`
    ///
    /// # Returns
    /// Boundary polygons of the persistent regions whose bounding-box area is at
    /// least the configured minimum, in discovery order. No active pixels yields an
    /// empty list.
    ///
    /// # Errors
    /// [`SmartError::ShapeMismatch`] if the frames differ in shape.
    pub fn segment(
        &self,
        current: &ArrayView2<f64>,
        previous: &ArrayView2<f64>,
    ) -> Result<Vec<BoundaryPolygon>> {
        if current.dim() != previous.dim() {
            return Err(SmartError::ShapeMismatch {
                what: "previous frame",
                expected: current.dim(),
                found: previous.dim(),
            });
        }

        let element = self.element.view();
        let mask_current = self.preprocessor.binarize(current);
        let mask_previous = self.preprocessor.binarize(previous);

        let grown_current = dilate(&mask_current.view(), &element);
        let grown_previous = dilate(&mask_previous.view(), &element);
        let diff = xor(&grown_current.view(), &grown_previous.view());

        let persistent = subtract(&mask_current.view(), &diff.view());
        let reconnected = dilate(&persistent.view(), &element);
        debug!(
            "segmentation: {} active, {} changed, {} persistent pixels",
            count_nonzero(&mask_current.view()),
            count_nonzero(&diff.view()),
            count_nonzero(&persistent.view())
        );

        let contours = find_external_contours(&reconnected.view());
        let found = contours.len();
        let kept: Vec<BoundaryPolygon> = contours
            .into_iter()
            .filter(|polygon| {
                polygon
                    .bounding_box()
                    .is_some_and(|bbox| bbox.area() >= self.minimal_feature_area)
            })
            .collect();
        debug!(
            "segmentation: kept {} of {} regions (minimum area {} px)",
            kept.len(),
            found,
            self.minimal_feature_area
        );
        Ok(kept)
    }

    /// Preprocess two raw frames and segment them.
    ///
    /// # Arguments
    /// * `current` - Raw current field array
    /// * `previous` - Raw previous field array, rotated onto `current`
    /// * `center` - Disk center as `(x, y)`
    /// * `disk_radius` - Disk radius in pixels
    pub fn extract_features(
        &self,
        current: &ArrayView2<f64>,
        previous: &ArrayView2<f64>,
        center: (f64, f64),
        disk_radius: f64,
    ) -> Result<Vec<BoundaryPolygon>> {
        let current = self
            .preprocessor
            .smooth_and_threshold(current, center, disk_radius);
        let previous = self
            .preprocessor
            .smooth_and_threshold(previous, center, disk_radius);
        self.segment(&current.view(), &previous.view())
    }
}
