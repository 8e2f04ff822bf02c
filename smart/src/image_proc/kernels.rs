//! Binary structuring elements and disk masks.
//!
//! One primitive, [`circular_mask`], produces both the full-frame solar disk mask
//! and the square disk-shaped structuring elements used by every morphology stage.
//! Disk elements depend only on their radius, so [`disk_element`] hands out shared,
//! immutable copies from a process-wide cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ndarray::Array2;
use once_cell::sync::Lazy;

static DISK_ELEMENTS: Lazy<Mutex<HashMap<usize, Arc<Array2<u8>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Binary mask of all pixels strictly closer than `radius` to `center`.
///
/// Pixel `(row, col)` is 1 iff `(col - cx)² + (row - cy)² < radius²`. Pixels at
/// exactly `radius` are excluded.
///
/// # Arguments
/// * `radius` - Disk radius in pixels
/// * `center` - Disk center as `(x, y)`, i.e. `(column, row)`
/// * `shape` - Output shape as `(rows, cols)`
///
/// # Examples
/// ```rust
/// use smart::image_proc::kernels::circular_mask;
///
/// let mask = circular_mask(2.0, (2.0, 2.0), (5, 5));
/// assert_eq!(mask[[2, 2]], 1);
/// assert_eq!(mask[[2, 0]], 0); // distance exactly 2
/// assert_eq!(mask[[1, 1]], 1);
/// ```
pub fn circular_mask(radius: f64, center: (f64, f64), shape: (usize, usize)) -> Array2<u8> {
    let (cx, cy) = center;
    let r2 = radius * radius;
    Array2::from_shape_fn(shape, |(row, col)| {
        let dx = col as f64 - cx;
        let dy = row as f64 - cy;
        u8::from(dx * dx + dy * dy < r2)
    })
}

/// Disk structuring element of the given radius.
///
/// The element is `2r × 2r` with its disk centered on `(r, r)`, which is also the
/// anchor used by the morphology routines. Repeated calls with the same radius
/// return the same shared array.
///
/// # Panics
/// If `radius` is zero. Radii come from a validated configuration.
pub fn disk_element(radius: usize) -> Arc<Array2<u8>> {
    assert!(radius > 0, "structuring element radius must be positive");
    let mut cache = DISK_ELEMENTS.lock().unwrap_or_else(|e| e.into_inner());
    cache
        .entry(radius)
        .or_insert_with(|| {
            let r = radius as f64;
            Arc::new(circular_mask(r, (r, r), (2 * radius, 2 * radius)))
        })
        .clone()
}

/// 3×3 cross-shaped structuring element.
pub fn cross_element() -> Array2<u8> {
    let mut element = Array2::zeros((3, 3));
    element[[0, 1]] = 1;
    element[[1, 0]] = 1;
    element[[1, 1]] = 1;
    element[[1, 2]] = 1;
    element[[2, 1]] = 1;
    element
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_inequality_on_boundary() {
        for radius in 1..12usize {
            let r = radius as f64;
            let center = (10.0, 9.0);
            let mask = circular_mask(r, center, (21, 23));
            for ((row, col), &v) in mask.indexed_iter() {
                let d2 = (col as f64 - center.0).powi(2) + (row as f64 - center.1).powi(2);
                assert_eq!(v == 1, d2 < r * r, "radius {radius} at ({row}, {col})");
            }
            // pixel exactly `radius` to the right of the center
            assert_eq!(mask[[9, 10 + radius]], 0);
        }
    }

    #[test]
    fn test_fractional_center() {
        let mask = circular_mask(1.0, (0.5, 0.5), (2, 2));
        assert_eq!(mask.iter().filter(|&&v| v == 1).count(), 4);
    }

    #[test]
    fn test_disk_element_shape_and_symmetry() {
        let element = disk_element(4);
        assert_eq!(element.dim(), (8, 8));
        assert_eq!(element[[4, 4]], 1);
        // first row and column sit at distance >= r from the anchor
        assert!(element.row(0).iter().all(|&v| v == 0));
        assert!(element.column(0).iter().all(|&v| v == 0));
        for row in 1..8 {
            for col in 1..8 {
                assert_eq!(element[[row, col]], element[[8 - row, col]]);
                assert_eq!(element[[row, col]], element[[row, 8 - col]]);
            }
        }
    }

    #[test]
    fn test_disk_element_is_cached() {
        let a = disk_element(7);
        let b = disk_element(7);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_radius_one_is_single_pixel() {
        let element = disk_element(1);
        assert_eq!(element.iter().filter(|&&v| v == 1).count(), 1);
        assert_eq!(element[[1, 1]], 1);
    }

    #[test]
    fn test_cross_element() {
        let cross = cross_element();
        assert_eq!(cross.sum(), 5);
        assert_eq!(cross[[0, 0]], 0);
        assert_eq!(cross[[1, 1]], 1);
    }
}
