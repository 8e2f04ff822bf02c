//! MaskedSample - statistics over the valid pixels of a 2D array
//!
//! A [`MaskedSample`] pairs a value array with a validity mask of the same shape.
//! Every aggregate is defined only over pixels whose mask entry is non-zero; masked
//! pixels are absent, not zero. Valid samples are gathered once in row-major order,
//! so all aggregates see the same samples in the same order.
//!
//! Non-finite values under the mask poison every aggregate: the first offending
//! pixel is remembered and reported as [`StatsError::NonFinite`].

use std::fmt;

use ndarray::ArrayView2;
use num_traits::float::Float;

use crate::error::StatsError;

/// Valid samples of a masked 2D array.
///
/// # Examples
///
/// ```rust
/// use ndarray::array;
/// use smart::image_proc::masked::MaskedSample;
///
/// let values = array![[1.0, 2.0], [3.0, 100.0]];
/// let mask = array![[1u8, 1], [1, 0]];
/// let sample = MaskedSample::new(&values.view(), &mask.view()).unwrap();
///
/// assert_eq!(sample.count(), 3);
/// assert_eq!(sample.sum().unwrap(), 6.0);
/// assert_eq!(sample.max().unwrap(), 3.0);
/// ```
#[derive(Debug, Clone)]
pub struct MaskedSample<T: Float> {
    values: Vec<T>,
    indices: Vec<(usize, usize)>,
    shape: (usize, usize),
    non_finite: Option<(usize, usize)>,
}

impl<T: Float + fmt::Debug> MaskedSample<T> {
    /// Gather the valid samples of `values` under `mask`.
    ///
    /// # Arguments
    /// * `values` - Value array
    /// * `mask` - Validity mask, non-zero entries are valid
    ///
    /// # Returns
    /// * `Ok(MaskedSample)` - Possibly empty sample
    /// * `Err(StatsError::ShapeMismatch)` - If the two arrays differ in shape
    pub fn new(values: &ArrayView2<T>, mask: &ArrayView2<u8>) -> Result<Self, StatsError> {
        if values.dim() != mask.dim() {
            return Err(StatsError::ShapeMismatch {
                values: values.dim(),
                mask: mask.dim(),
            });
        }

        let mut samples = Vec::new();
        let mut indices = Vec::new();
        let mut non_finite = None;
        for ((index, &value), &valid) in values.indexed_iter().zip(mask.iter()) {
            if valid == 0 {
                continue;
            }
            if !value.is_finite() && non_finite.is_none() {
                non_finite = Some(index);
            }
            samples.push(value);
            indices.push(index);
        }

        Ok(Self {
            values: samples,
            indices,
            shape: values.dim(),
            non_finite,
        })
    }

    /// Number of valid samples.
    pub fn count(&self) -> usize {
        self.values.len()
    }

    /// True when no pixel is valid.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Shape of the array the sample was drawn from.
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    /// Array indices of the valid samples, row-major.
    pub fn indices(&self) -> &[(usize, usize)] {
        &self.indices
    }

    fn checked(&self) -> Result<&[T], StatsError> {
        if let Some(index) = self.non_finite {
            Err(StatsError::NonFinite(index))
        } else if self.values.is_empty() {
            Err(StatsError::NoData)
        } else {
            Ok(&self.values)
        }
    }

    fn from_count(n: usize) -> T {
        T::from(n).unwrap_or_else(T::nan)
    }

    /// Sum of the valid samples.
    pub fn sum(&self) -> Result<T, StatsError> {
        Ok(self
            .checked()?
            .iter()
            .fold(T::zero(), |acc, &v| acc + v))
    }

    /// Sum of the absolute values of the valid samples.
    pub fn abs_sum(&self) -> Result<T, StatsError> {
        Ok(self
            .checked()?
            .iter()
            .fold(T::zero(), |acc, &v| acc + v.abs()))
    }

    /// Sum of the valid samples for which `keep` holds.
    ///
    /// Yields zero when no sample qualifies; fails only when the sample itself is
    /// empty or poisoned.
    pub fn sum_where<F>(&self, keep: F) -> Result<T, StatsError>
    where
        F: Fn(T) -> bool,
    {
        Ok(self
            .checked()?
            .iter()
            .filter(|&&v| keep(v))
            .fold(T::zero(), |acc, &v| acc + v))
    }

    /// Smallest valid sample.
    pub fn min(&self) -> Result<T, StatsError> {
        let values = self.checked()?;
        Ok(values[1..]
            .iter()
            .fold(values[0], |acc, &v| if v < acc { v } else { acc }))
    }

    /// Largest valid sample.
    pub fn max(&self) -> Result<T, StatsError> {
        let values = self.checked()?;
        Ok(values[1..]
            .iter()
            .fold(values[0], |acc, &v| if v > acc { v } else { acc }))
    }

    /// Arithmetic mean of the valid samples.
    pub fn mean(&self) -> Result<T, StatsError> {
        let n = Self::from_count(self.checked()?.len());
        Ok(self.sum()? / n)
    }

    /// Central moment of order `k` about the mean.
    fn central_moment(&self, k: i32) -> Result<T, StatsError> {
        let values = self.checked()?;
        let mean = self.mean()?;
        let n = Self::from_count(values.len());
        Ok(values
            .iter()
            .fold(T::zero(), |acc, &v| acc + (v - mean).powi(k))
            / n)
    }

    /// Population variance (divides by `n`).
    pub fn variance(&self) -> Result<T, StatsError> {
        self.central_moment(2)
    }

    /// Population standard deviation.
    pub fn std_dev(&self) -> Result<T, StatsError> {
        Ok(self.variance()?.sqrt())
    }

    /// Biased sample skewness `m3 / m2^1.5`.
    ///
    /// Zero when the sample has (numerically) no spread.
    pub fn skewness(&self) -> Result<T, StatsError> {
        let m2 = self.central_moment(2)?;
        if self.is_degenerate_spread(m2)? {
            return Ok(T::zero());
        }
        let m3 = self.central_moment(3)?;
        Ok(m3 / m2.powf(Self::from_count(3) / Self::from_count(2)))
    }

    /// Biased excess kurtosis `m4 / m2² - 3`.
    ///
    /// Minus three when the sample has (numerically) no spread.
    pub fn kurtosis(&self) -> Result<T, StatsError> {
        let three = Self::from_count(3);
        let m2 = self.central_moment(2)?;
        if self.is_degenerate_spread(m2)? {
            return Ok(-three);
        }
        let m4 = self.central_moment(4)?;
        Ok(m4 / (m2 * m2) - three)
    }

    /// Whether `m2` is negligible relative to the magnitude of the mean.
    fn is_degenerate_spread(&self, m2: T) -> Result<bool, StatsError> {
        let mean = self.mean()?;
        let scale = mean.abs().max(T::one());
        let tolerance = T::epsilon() * scale;
        Ok(m2 <= tolerance * tolerance)
    }

    /// Mean of `field` over the valid pixels, weighted by this sample.
    ///
    /// Computes `Σ wᵢ·fᵢ / Σ wᵢ` where `wᵢ` are this sample's values and `fᵢ` the
    /// entries of `field` at the same pixels.
    ///
    /// # Returns
    /// * `Ok(Some(mean))` - When the weights sum to a non-zero value
    /// * `Ok(None)` - When the weights sum to zero and the mean is undefined
    /// * `Err(StatsError)` - Shape mismatch, empty sample or non-finite input
    pub fn weighted_mean_of(&self, field: &ArrayView2<T>) -> Result<Option<T>, StatsError> {
        if field.dim() != self.shape {
            return Err(StatsError::ShapeMismatch {
                values: field.dim(),
                mask: self.shape,
            });
        }
        let weights = self.checked()?;

        let mut weighted = T::zero();
        let mut total = T::zero();
        for (&w, &index) in weights.iter().zip(self.indices.iter()) {
            let f = field[index];
            if !f.is_finite() {
                return Err(StatsError::NonFinite(index));
            }
            weighted = weighted + w * f;
            total = total + w;
        }

        if total == T::zero() {
            Ok(None)
        } else {
            Ok(Some(weighted / total))
        }
    }
}
