//! Separable 2D filtering for magnetogram smoothing and gradients
//!
//! Both filters here are separable, so they run as a horizontal pass followed by a
//! vertical pass. Borders are handled by reflect-101 extrapolation
//! (`dcb|abcdefgh|gfe`), repeated as often as needed when the kernel is wider than
//! the image.

use ndarray::{Array1, Array2, ArrayView2};

/// Map an out-of-range index back into `0..len` by reflect-101 extrapolation.
///
/// # Arguments
/// * `index` - Possibly out-of-range index
/// * `len` - Length of the axis (must be non-zero)
pub fn reflect_101(mut index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    while index < 0 || index > last {
        if index < 0 {
            index = -index;
        }
        if index > last {
            index = 2 * last - index;
        }
    }
    index as usize
}

/// Create a normalized 1D Gaussian kernel with specified size and sigma
///
/// Tap `i` is proportional to `exp(-(i - (size-1)/2)² / (2σ²))` and the taps sum
/// to one.
///
/// # Arguments
/// * `size` - Number of taps (must be odd)
/// * `sigma` - Standard deviation of the Gaussian
///
/// # Returns
/// * Gaussian kernel as a 1D array
pub fn gaussian_kernel(size: usize, sigma: f64) -> Array1<f64> {
    assert!(size % 2 == 1, "Kernel size must be odd");
    assert!(sigma > 0.0, "Sigma must be positive");

    let center = (size as f64 - 1.0) / 2.0;
    let denom = 2.0 * sigma * sigma;
    let mut kernel = Array1::from_shape_fn(size, |i| {
        let x = i as f64 - center;
        (-(x * x) / denom).exp()
    });
    let sum = kernel.sum();
    kernel.mapv_inplace(|v| v / sum);
    kernel
}

/// Correlate an image with a separable kernel `column_kernel ⊗ row_kernel`.
///
/// `row_kernel` runs along x (columns), `column_kernel` along y (rows). Both are
/// anchored at their middle tap.
pub fn separable_filter(
    image: &ArrayView2<f64>,
    row_kernel: &[f64],
    column_kernel: &[f64],
) -> Array2<f64> {
    let (rows, cols) = image.dim();
    if rows == 0 || cols == 0 {
        return Array2::zeros((rows, cols));
    }

    let row_anchor = (row_kernel.len() / 2) as isize;
    let col_anchor = (column_kernel.len() / 2) as isize;

    let mut horizontal = Array2::zeros((rows, cols));
    for r in 0..rows {
        for c in 0..cols {
            let mut sum = 0.0;
            for (k, &w) in row_kernel.iter().enumerate() {
                let src = reflect_101(c as isize + k as isize - row_anchor, cols);
                sum += image[[r, src]] * w;
            }
            horizontal[[r, c]] = sum;
        }
    }

    let mut output = Array2::zeros((rows, cols));
    for r in 0..rows {
        for (k, &w) in column_kernel.iter().enumerate() {
            let src = reflect_101(r as isize + k as isize - col_anchor, rows);
            let src_row = horizontal.row(src);
            let mut out_row = output.row_mut(r);
            out_row.scaled_add(w, &src_row);
        }
    }

    output
}

/// Gaussian blur with a square `size × size` kernel and equal sigma on both axes.
///
/// # Examples
/// ```rust
/// use ndarray::Array2;
/// use smart::image_proc::convolve2d::gaussian_blur;
///
/// let flat = Array2::from_elem((9, 9), 3.0);
/// let blurred = gaussian_blur(&flat.view(), 5, 1.5);
/// assert!((blurred[[4, 4]] - 3.0).abs() < 1e-12);
/// ```
pub fn gaussian_blur(image: &ArrayView2<f64>, size: usize, sigma: f64) -> Array2<f64> {
    let kernel = gaussian_kernel(size, sigma);
    let taps = kernel.to_vec();
    separable_filter(image, &taps, &taps)
}

/// First-order derivative in x and first-order derivative in y, 3×3 Sobel taps.
///
/// The 2D kernel is `[-1, 0, 1]ᵀ ⊗ [-1, 0, 1]`, so the response is
/// `f(y-1,x-1) - f(y-1,x+1) - f(y+1,x-1) + f(y+1,x+1)`. It peaks where the field
/// changes sign across both axes at once, i.e. along diagonal polarity boundaries.
pub fn sobel_xy(image: &ArrayView2<f64>) -> Array2<f64> {
    const DERIVATIVE: [f64; 3] = [-1.0, 0.0, 1.0];
    separable_filter(image, &DERIVATIVE, &DERIVATIVE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_reflect_101() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(-2, 5), 2);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(6, 5), 2);
        assert_eq!(reflect_101(3, 5), 3);
        // kernel wider than the axis keeps bouncing
        assert_eq!(reflect_101(-5, 3), 1);
        assert_eq!(reflect_101(7, 3), 1);
        assert_eq!(reflect_101(-9, 1), 0);
    }

    #[test]
    fn test_gaussian_kernel_normalized_and_symmetric() {
        let kernel = gaussian_kernel(41, 8.0);
        assert_relative_eq!(kernel.sum(), 1.0, epsilon = 1e-12);
        for i in 0..20 {
            assert_relative_eq!(kernel[i], kernel[40 - i]);
        }
        assert!(kernel[20] > kernel[19]);
    }

    #[test]
    #[should_panic(expected = "Kernel size must be odd")]
    fn test_gaussian_kernel_even_size() {
        gaussian_kernel(4, 1.0);
    }

    #[test]
    fn test_blur_preserves_constant_image() {
        let flat = Array2::from_elem((6, 11), -42.0);
        let blurred = gaussian_blur(&flat.view(), 83, 16.8);
        for &v in blurred.iter() {
            assert_relative_eq!(v, -42.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_blur_spreads_impulse() {
        let mut image = Array2::zeros((15, 15));
        image[[7, 7]] = 100.0;
        let blurred = gaussian_blur(&image.view(), 5, 1.0);
        assert!(blurred[[7, 7]] < 100.0);
        assert!(blurred[[7, 8]] > 0.0);
        assert_relative_eq!(blurred[[7, 8]], blurred[[8, 7]], epsilon = 1e-12);
        assert_relative_eq!(blurred.sum(), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_sobel_xy_on_flat_and_linear_images() {
        let flat = Array2::from_elem((5, 5), 7.0);
        assert!(sobel_xy(&flat.view()).iter().all(|&v| v == 0.0));

        // a pure x ramp has no mixed derivative
        let ramp = Array2::from_shape_fn((5, 5), |(_, c)| c as f64);
        let response = sobel_xy(&ramp.view());
        assert_relative_eq!(response[[2, 2]], 0.0);
    }

    #[test]
    fn test_sobel_xy_on_product_image() {
        // f = x * y has constant mixed derivative; [-1,0,1] ⊗ [-1,0,1] gives 4
        let image = Array2::from_shape_fn((6, 6), |(r, c)| (r * c) as f64);
        let response = sobel_xy(&image.view());
        assert_relative_eq!(response[[2, 3]], 4.0);
        assert_relative_eq!(response[[3, 2]], 4.0);
    }
}
