//! Differential solar rotation.
//!
//! Before two frames can be compared, the earlier one is rotated forward onto the
//! later one's pixel grid. [`DifferentialRotation`] is the seam the pipeline calls
//! through; [`NativeRotation`] is the row-wise sphere rotation used in production.

use ndarray::{Array2, ArrayView2};

/// Rotates a full-disk image by the solar rotation accumulated over a time span.
pub trait DifferentialRotation: Send + Sync {
    /// Rotate `image` forward by `elapsed_seconds`.
    ///
    /// # Arguments
    /// * `image` - Full-disk image
    /// * `center` - Disk center as `(x, y)` pixels
    /// * `radius` - Disk radius in pixels
    /// * `elapsed_seconds` - Time to rotate by
    ///
    /// # Returns
    /// Rotated image of the same shape.
    fn rotate(
        &self,
        image: &ArrayView2<f64>,
        center: (f64, f64),
        radius: f64,
        elapsed_seconds: f64,
    ) -> Array2<f64>;
}

/// Synodic rotation angle (radians) at `latitude` (radians) after `seconds`.
///
/// Uses the rate `2.894 - 0.428 sin²φ - 0.37 sin⁴φ` µrad/s.
pub fn rotation_angle(latitude: f64, seconds: f64) -> f64 {
    let sin2 = latitude.sin().powi(2);
    let sin4 = sin2 * sin2;
    1.0e-6 * seconds * (2.894 - 0.428 * sin2 - 0.37 * sin4)
}

/// Row-wise rigid rotation of each latitude band about the solar axis.
///
/// Center and radius are truncated to whole pixels. Every disk pixel is lifted onto
/// the sphere, rotated about the vertical axis by [`rotation_angle`] for its row's
/// latitude, and written back to the nearest column if it is still on the visible
/// hemisphere. Collisions are averaged. Gaps left on the approaching side of a row
/// (up to `cx + cols / 64`) are filled by linear interpolation; a gap before the
/// first mapped pixel of a row is zero-filled. Off-disk pixels are 0.
///
/// # Examples
///
/// ```rust
/// use ndarray::Array2;
/// use smart::rotation::{DifferentialRotation, NativeRotation};
///
/// let mut image = Array2::zeros((201, 201));
/// image[[100, 100]] = 500.0;
///
/// let rotated = NativeRotation.rotate(&image.view(), (100.0, 100.0), 100.0, 86_400.0);
/// assert_eq!(rotated[[100, 75]], 500.0);
/// assert_eq!(rotated[[100, 100]], 0.0);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeRotation;

impl DifferentialRotation for NativeRotation {
    fn rotate(
        &self,
        image: &ArrayView2<f64>,
        center: (f64, f64),
        radius: f64,
        elapsed_seconds: f64,
    ) -> Array2<f64> {
        let (rows, cols) = image.dim();
        let mut out = Array2::zeros((rows, cols));

        let cx = center.0.trunc() as i64;
        let cy = center.1.trunc() as i64;
        let radius = radius.trunc() as i64;
        if radius <= 0 {
            return out;
        }
        let r2 = radius * radius;
        let fill_limit = cx + (cols / 64) as i64;

        for y in 0..rows {
            let dy = y as i64 - cy;
            let y2 = dy * dy;
            if y2 > r2 {
                continue;
            }
            let latitude = (dy as f64 / radius as f64).asin();
            let angle = rotation_angle(latitude, elapsed_seconds);
            let (sin, cos) = angle.sin_cos();

            let mut last_new_x: i64 = -1;
            for x in 0..cols {
                let dx = x as i64 - cx;
                let dist = dx * dx + y2;
                if dist > r2 {
                    continue;
                }

                let z = ((r2 - dist) as f64).sqrt();
                let rot_x = dx as f64 * cos - z * sin;
                let rot_z = dx as f64 * sin + z * cos;
                if rot_z <= 0.0 {
                    continue;
                }

                let new_x = (cx as f64 + rot_x).round() as i64;
                if new_x < 0 || new_x >= cols as i64 {
                    continue;
                }
                let target = new_x as usize;

                let original = image[[y, x]];
                let existing = out[[y, target]];
                let mut value = if existing == 0.0 {
                    original
                } else {
                    (original + existing) / 2.0
                };
                if value.is_nan() {
                    value = 0.0;
                }
                out[[y, target]] = value;

                if new_x > last_new_x + 1 && new_x <= fill_limit {
                    if last_new_x == -1 {
                        for i in x..target {
                            out[[y, i]] = 0.0;
                        }
                    } else {
                        let gap = new_x - last_new_x;
                        let start = out[[y, last_new_x as usize]];
                        let step = (out[[y, target]] - start) / gap as f64;
                        for i in 1..gap {
                            out[[y, (last_new_x + i) as usize]] = start + i as f64 * step;
                        }
                    }
                }
                last_new_x = new_x;
            }
        }

        out
    }
}
