//! Static tuning parameters for feature extraction.
//!
//! All thresholds, kernel sizes and physical constants live in one immutable
//! [`SmartConfig`] that every component receives at construction time. Nothing in
//! the pipeline reads ambient global state, so tests can run side by side with
//! different thresholds.
//!
//! Configurations round-trip through JSON; any field missing from a file falls
//! back to its default.
//!
//! ```rust
//! use smart::config::SmartConfig;
//!
//! let config = SmartConfig::default();
//! assert!(config.validate().is_ok());
//! assert_eq!(config.static_background_threshold, 70.0);
//! assert!((config.meters_per_pixel() - 374_578.806).abs() < 1e-2);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Immutable parameter set shared by all pipeline stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartConfig {
    /// Absolute field strength (Gauss) at or below which a pixel counts as noise
    pub static_background_threshold: f64,
    /// Minimum bounding-box area (pixels) of a kept feature
    pub minimal_feature_area: usize,
    /// Side length of the preprocessing Gaussian kernel (odd)
    pub gaussian_blur_kernel_size: usize,
    /// Standard deviation of the preprocessing Gaussian kernel
    pub gaussian_blur_sigma: f64,
    /// Radius of the structuring element used by the segmenter
    pub feature_dilation_radius: usize,
    /// Radius of the structuring element used to grow polarity masks
    pub psl_dilation_radius: usize,
    /// Fraction of the solar radius treated as usable disk (limb artefacts)
    pub usable_disk_radius: f64,
    /// Solar diameter in meters
    pub sun_diameter_m: f64,
    /// Solar diameter in pixels on a full-resolution magnetogram
    pub sun_diameter_px: f64,
    /// Strong-gradient threshold applied to the normalized PSL gradient
    pub sg_threshold: f64,
    /// Side length of the Gaussian kernel smoothing the PSL zone for R*
    pub r_star_blur_kernel_size: usize,
    /// Standard deviation of the R* smoothing kernel
    pub r_star_blur_sigma: f64,
    /// Viewing angle (degrees) beyond which no cosine correction is applied
    pub max_correction_angle_deg: f64,
    /// Provenance label attached to every batch sent to the property sink
    pub provenance: String,
}

impl Default for SmartConfig {
    fn default() -> Self {
        Self {
            static_background_threshold: 70.0,
            minimal_feature_area: 200,
            gaussian_blur_kernel_size: 41,
            gaussian_blur_sigma: 8.0,
            feature_dilation_radius: 40,
            // 4096 / 250, same ratio as for MDI
            psl_dilation_radius: 16,
            usable_disk_radius: 0.95,
            sun_diameter_m: 1_392_684_000.0,
            sun_diameter_px: 3718.0,
            sg_threshold: 50.0,
            r_star_blur_kernel_size: 2 * 41 + 1,
            r_star_blur_sigma: 16.8,
            max_correction_angle_deg: 60.0,
            provenance: "smart-rust".to_string(),
        }
    }
}

impl SmartConfig {
    /// Meters on the solar surface covered by one pixel at disk center.
    pub fn meters_per_pixel(&self) -> f64 {
        self.sun_diameter_m / self.sun_diameter_px
    }

    /// Square meters covered by one pixel at disk center.
    pub fn area_per_pixel(&self) -> f64 {
        self.meters_per_pixel().powi(2)
    }

    /// Megameters per pixel, used to express gradients in G/Mm.
    pub fn megameters_per_pixel(&self) -> f64 {
        self.meters_per_pixel() / 1.0e6
    }

    /// Check every parameter, returning the first violation.
    ///
    /// # Errors
    /// A [`ConfigError`] naming the offending field. Callers treat this as fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("feature_dilation_radius", self.feature_dilation_radius as f64)?;
        positive("psl_dilation_radius", self.psl_dilation_radius as f64)?;
        odd_kernel("gaussian_blur_kernel_size", self.gaussian_blur_kernel_size)?;
        odd_kernel("r_star_blur_kernel_size", self.r_star_blur_kernel_size)?;
        positive("gaussian_blur_sigma", self.gaussian_blur_sigma)?;
        positive("r_star_blur_sigma", self.r_star_blur_sigma)?;
        positive("sun_diameter_m", self.sun_diameter_m)?;
        positive("sun_diameter_px", self.sun_diameter_px)?;

        if !(self.static_background_threshold >= 0.0) {
            return Err(ConfigError::Negative {
                name: "static_background_threshold",
                value: self.static_background_threshold,
            });
        }
        if !(self.sg_threshold >= 0.0) {
            return Err(ConfigError::Negative {
                name: "sg_threshold",
                value: self.sg_threshold,
            });
        }
        in_range("usable_disk_radius", self.usable_disk_radius, 0.0, 1.0)?;
        in_range(
            "max_correction_angle_deg",
            self.max_correction_angle_deg,
            0.0,
            90.0,
        )?;
        Ok(())
    }

    /// Load a configuration from a JSON file and validate it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        let config: SmartConfig =
            serde_json::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, text).map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { name, value })
    }
}

fn odd_kernel(name: &'static str, size: usize) -> Result<(), ConfigError> {
    if size % 2 == 1 {
        Ok(())
    } else {
        Err(ConfigError::EvenKernel { name, size })
    }
}

fn in_range(name: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if value > min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            min,
            max,
        })
    }
}
