//! Synthetic magnetograms for tests and demonstrations.
//!
//! Fields are built additively from Gaussian spots and uniform patches, with
//! optional seeded Gaussian noise, then wrapped into a [`Magnetogram`] with
//! orthographic coordinate maps. [`SyntheticSequence`] serves a list of such frames
//! through the [`FrameProvider`] interface.

use chrono::{DateTime, Utc};
use ndarray::{Array2, Zip};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use crate::config::SmartConfig;
use crate::error::{Result, SmartError};
use crate::image_proc::AABB;
use crate::magnetogram::{CoordinateMaps, Magnetogram};
use crate::pipeline::{FrameDescriptor, FrameProvider};

/// Circular Gaussian spot.
///
/// # Arguments
/// * `shape` - `(rows, cols)`
/// * `center` - Spot center as `(x, y)`
/// * `sigma` - Standard deviation in pixels
/// * `peak` - Field at the center (signed, Gauss)
pub fn gaussian_spot(
    shape: (usize, usize),
    center: (f64, f64),
    sigma: f64,
    peak: f64,
) -> Array2<f64> {
    let two_sigma2 = 2.0 * sigma * sigma;
    Array2::from_shape_fn(shape, |(row, col)| {
        let dx = col as f64 - center.0;
        let dy = row as f64 - center.1;
        peak * (-(dx * dx + dy * dy) / two_sigma2).exp()
    })
}

/// East-west pair of opposite-polarity spots.
///
/// The positive spot sits `separation / 2` east (lower column) of `center`, the
/// negative one the same distance west.
pub fn bipolar_region(
    shape: (usize, usize),
    center: (f64, f64),
    separation: f64,
    sigma: f64,
    peak: f64,
) -> Array2<f64> {
    let half = separation / 2.0;
    gaussian_spot(shape, (center.0 - half, center.1), sigma, peak)
        + gaussian_spot(shape, (center.0 + half, center.1), sigma, -peak)
}

/// Constant `value` inside `bbox`, 0 elsewhere.
pub fn uniform_patch(shape: (usize, usize), bbox: &AABB, value: f64) -> Array2<f64> {
    Array2::from_shape_fn(shape, |(row, col)| {
        if bbox.contains_point(row, col) {
            value
        } else {
            0.0
        }
    })
}

/// Zero-mean Gaussian noise, reproducible for a given seed.
///
/// # Errors
/// [`SmartError::InputUnavailable`] for a negative or non-finite `sigma`.
pub fn gaussian_noise(shape: (usize, usize), sigma: f64, seed: u64) -> Result<Array2<f64>> {
    if !(sigma >= 0.0 && sigma.is_finite()) {
        return Err(SmartError::InputUnavailable(format!(
            "noise sigma {sigma} must be finite and non-negative"
        )));
    }
    let normal = Normal::new(0.0, sigma)
        .map_err(|e| SmartError::InputUnavailable(format!("noise sigma {sigma}: {e}")))?;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut noise = Array2::zeros(shape);
    noise.mapv_inplace(|_: f64| normal.sample(&mut rng));
    Ok(noise)
}

/// Builder for a synthetic full-disk frame centered in its image.
///
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use smart::config::SmartConfig;
/// use smart::synthetic::{bipolar_region, SyntheticFrameBuilder};
///
/// let time = Utc.with_ymd_and_hms(2014, 1, 1, 0, 0, 0).unwrap();
/// let shape = (128, 128);
/// let frame = SyntheticFrameBuilder::new(shape, 60.0, time)
///     .add(&bipolar_region(shape, (64.0, 64.0), 12.0, 3.0, 800.0))
///     .noise(5.0, 7)
///     .build(&SmartConfig::default())
///     .unwrap();
///
/// assert_eq!(frame.center(), (64.0, 64.0));
/// assert!(frame.data()[[64, 58]] > 700.0);
/// ```
#[derive(Debug, Clone)]
pub struct SyntheticFrameBuilder {
    field: Array2<f64>,
    solar_radius: f64,
    time: DateTime<Utc>,
    noise: Option<(f64, u64)>,
}

impl SyntheticFrameBuilder {
    pub fn new(shape: (usize, usize), solar_radius: f64, time: DateTime<Utc>) -> Self {
        Self {
            field: Array2::zeros(shape),
            solar_radius,
            time,
            noise: None,
        }
    }

    /// Add a component field; components of another shape are ignored.
    pub fn add(mut self, component: &Array2<f64>) -> Self {
        if component.dim() == self.field.dim() {
            Zip::from(&mut self.field)
                .and(component)
                .for_each(|f, &c| *f += c);
        }
        self
    }

    /// Add seeded Gaussian noise when the frame is built.
    pub fn noise(mut self, sigma: f64, seed: u64) -> Self {
        self.noise = Some((sigma, seed));
        self
    }

    /// Center of the image as `(x, y)`.
    pub fn center(&self) -> (f64, f64) {
        let (rows, cols) = self.field.dim();
        ((cols / 2) as f64, (rows / 2) as f64)
    }

    pub fn build(self, config: &SmartConfig) -> Result<Magnetogram> {
        let shape = self.field.dim();
        let center = self.center();
        let mut field = self.field;
        if let Some((sigma, seed)) = self.noise {
            field = field + gaussian_noise(shape, sigma, seed)?;
        }
        let maps = CoordinateMaps::orthographic(shape, center, self.solar_radius);
        Magnetogram::new(field, center, self.solar_radius, self.time, maps, config)
    }
}

/// In-memory frame provider over a fixed list of frames.
#[derive(Debug, Clone, Default)]
pub struct SyntheticSequence {
    frames: Vec<(FrameDescriptor, Magnetogram)>,
}

impl SyntheticSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame; its descriptor is `synthetic://<index>` at the frame time.
    pub fn push(&mut self, frame: Magnetogram) {
        let descriptor = FrameDescriptor {
            url: format!("synthetic://{}", self.frames.len()),
            date_obs: frame.time(),
        };
        self.frames.push((descriptor, frame));
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn descriptors(&self) -> Vec<FrameDescriptor> {
        self.frames.iter().map(|(d, _)| d.clone()).collect()
    }
}

impl FrameProvider for SyntheticSequence {
    fn list(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<FrameDescriptor>> {
        Ok(self
            .frames
            .iter()
            .map(|(d, _)| d)
            .filter(|d| d.date_obs >= start && d.date_obs <= end)
            .cloned()
            .collect())
    }

    fn fetch(&self, descriptor: &FrameDescriptor) -> Result<Magnetogram> {
        self.frames
            .iter()
            .find(|(d, _)| d == descriptor)
            .map(|(_, frame)| frame.clone())
            .ok_or_else(|| SmartError::InputUnavailable(format!("no frame at {}", descriptor.url)))
    }
}
