//! Magnetogram preprocessing and binarization.
//!
//! Raw line-of-sight magnetograms are smoothed, stripped of background noise and
//! corrected for foreshortening before the segmenter binarizes them. All
//! thresholds come from the [`SmartConfig`] the [`Preprocessor`] was built with.

use ndarray::{Array2, ArrayView2, Zip};

use crate::config::SmartConfig;
use crate::error::ConfigError;
use crate::image_proc::convolve2d::gaussian_blur;

/// Smoothing, noise suppression, cosine correction and binarization.
///
/// # Examples
///
/// ```rust
/// use ndarray::array;
/// use smart::config::SmartConfig;
/// use smart::preprocess::Preprocessor;
///
/// let pre = Preprocessor::new(&SmartConfig::default()).unwrap();
/// let field = array![[0.0, 70.0, -70.5, 300.0]];
/// assert_eq!(pre.binarize(&field.view()), array![[0u8, 0, 1, 1]]);
/// ```
#[derive(Debug, Clone)]
pub struct Preprocessor {
    threshold: f64,
    blur_size: usize,
    blur_sigma: f64,
    min_correction_cosine: f64,
}

impl Preprocessor {
    /// Build a preprocessor from a validated configuration.
    ///
    /// # Errors
    /// The first [`ConfigError`] reported by [`SmartConfig::validate`].
    pub fn new(config: &SmartConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            threshold: config.static_background_threshold,
            blur_size: config.gaussian_blur_kernel_size,
            blur_sigma: config.gaussian_blur_sigma,
            min_correction_cosine: config.max_correction_angle_deg.to_radians().cos(),
        })
    }

    /// Static noise threshold in Gauss.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Divide every pixel by the cosine of its viewing angle.
    ///
    /// The cosine is estimated geometrically as `sqrt(1 - (d / r)²)`, with `d` the
    /// pixel's distance from `center`. Pixels viewed more obliquely than the
    /// configured maximum angle are left uncorrected. Pixels off the disk and any
    /// non-finite result become 0.
    ///
    /// # Arguments
    /// * `img` - Field array
    /// * `center` - Disk center as `(x, y)`
    /// * `disk_radius` - Disk radius in pixels
    pub fn cosine_correct(
        &self,
        img: &ArrayView2<f64>,
        center: (f64, f64),
        disk_radius: f64,
    ) -> Array2<f64> {
        let (cx, cy) = center;
        let mut out = Array2::zeros(img.dim());
        Zip::indexed(&mut out)
            .and(img)
            .for_each(|(row, col), out, &value| {
                let dx = col as f64 - cx;
                let dy = row as f64 - cy;
                let rho = (dx * dx + dy * dy).sqrt() / disk_radius;
                if !(rho <= 1.0) {
                    return;
                }
                let cosine = (1.0 - rho * rho).sqrt();
                let factor = if cosine < self.min_correction_cosine {
                    1.0
                } else {
                    cosine
                };
                let corrected = value / factor;
                if corrected.is_finite() {
                    *out = corrected;
                }
            });
        out
    }

    /// Zero every value whose magnitude is within the noise threshold.
    pub fn suppress_noise(&self, img: &ArrayView2<f64>) -> Array2<f64> {
        img.mapv(|v| if v.abs() <= self.threshold { 0.0 } else { v })
    }

    /// Gaussian blur, noise suppression, then cosine correction.
    ///
    /// This is the shared stage applied to both frames before binarization.
    pub fn smooth_and_threshold(
        &self,
        img: &ArrayView2<f64>,
        center: (f64, f64),
        disk_radius: f64,
    ) -> Array2<f64> {
        let blurred = gaussian_blur(img, self.blur_size, self.blur_sigma);
        let quiet = self.suppress_noise(&blurred.view());
        self.cosine_correct(&quiet.view(), center, disk_radius)
    }

    /// 1 where `|pixel| > threshold`, 0 elsewhere.
    pub fn binarize(&self, img: &ArrayView2<f64>) -> Array2<u8> {
        img.mapv(|v| u8::from(v.abs() > self.threshold))
    }
}
