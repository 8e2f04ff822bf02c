//! Binary morphology on 0/1 masks.
//!
//! Masks are `Array2<u8>` holding only 0 and 1. The image is treated as embedded in
//! an infinite background of zeros: out-of-image pixels never contribute to a
//! dilation and always fail an erosion. Structuring elements are anchored at
//! `(rows / 2, cols / 2)`.
//!
//! Dilation and erosion decompose the element into horizontal runs and answer each
//! run with a per-row prefix count, so the cost per pixel is proportional to the
//! element height rather than its area.

use ndarray::{Array2, ArrayView2, Zip};

use crate::error::DegenerateFeature;
use crate::image_proc::kernels::cross_element;

/// One horizontal run of set pixels in a structuring element, relative to its anchor.
#[derive(Debug, Clone, Copy)]
struct Run {
    dy: isize,
    dx_start: isize,
    dx_end: isize,
}

fn element_runs(element: &ArrayView2<u8>) -> Vec<Run> {
    let (rows, cols) = element.dim();
    let anchor_row = (rows / 2) as isize;
    let anchor_col = (cols / 2) as isize;

    let mut runs = Vec::new();
    for r in 0..rows {
        let mut c = 0;
        while c < cols {
            if element[[r, c]] == 0 {
                c += 1;
                continue;
            }
            let start = c;
            while c < cols && element[[r, c]] != 0 {
                c += 1;
            }
            runs.push(Run {
                dy: r as isize - anchor_row,
                dx_start: start as isize - anchor_col,
                dx_end: (c - 1) as isize - anchor_col,
            });
        }
    }
    runs
}

/// Per-row prefix counts: `prefix[[r, c]]` is the number of set pixels in `mask[r, ..c]`.
fn row_prefix_counts(mask: &ArrayView2<u8>) -> Array2<u32> {
    let (rows, cols) = mask.dim();
    let mut prefix = Array2::zeros((rows, cols + 1));
    for r in 0..rows {
        let mut acc = 0u32;
        for c in 0..cols {
            acc += u32::from(mask[[r, c]] != 0);
            prefix[[r, c + 1]] = acc;
        }
    }
    prefix
}

/// Morphological dilation of a binary mask.
///
/// # Arguments
/// * `mask` - Input 0/1 mask
/// * `element` - Structuring element (non-zero entries are active)
///
/// # Returns
/// Mask of the same shape, 1 wherever the anchored element hits a set pixel.
pub fn dilate(mask: &ArrayView2<u8>, element: &ArrayView2<u8>) -> Array2<u8> {
    let (rows, cols) = mask.dim();
    let runs = element_runs(element);
    let prefix = row_prefix_counts(mask);

    let mut output = Array2::zeros((rows, cols));
    Zip::indexed(&mut output).par_for_each(|(r, c), out| {
        let hit = runs.iter().any(|run| {
            let y = r as isize + run.dy;
            if y < 0 || y >= rows as isize {
                return false;
            }
            let x0 = (c as isize + run.dx_start).max(0);
            let x1 = (c as isize + run.dx_end).min(cols as isize - 1);
            if x0 > x1 {
                return false;
            }
            let y = y as usize;
            prefix[[y, x1 as usize + 1]] > prefix[[y, x0 as usize]]
        });
        *out = u8::from(hit);
    });
    output
}

/// Morphological erosion of a binary mask.
///
/// A pixel survives only if every active element pixel lands on a set, in-image
/// pixel.
pub fn erode(mask: &ArrayView2<u8>, element: &ArrayView2<u8>) -> Array2<u8> {
    let (rows, cols) = mask.dim();
    let runs = element_runs(element);
    let prefix = row_prefix_counts(mask);

    let mut output = Array2::zeros((rows, cols));
    Zip::indexed(&mut output).par_for_each(|(r, c), out| {
        let keep = !runs.is_empty()
            && runs.iter().all(|run| {
                let y = r as isize + run.dy;
                let x0 = c as isize + run.dx_start;
                let x1 = c as isize + run.dx_end;
                if y < 0 || y >= rows as isize || x0 < 0 || x1 >= cols as isize {
                    return false;
                }
                let y = y as usize;
                let span = (x1 - x0 + 1) as u32;
                prefix[[y, x1 as usize + 1]] - prefix[[y, x0 as usize]] == span
            });
        *out = u8::from(keep);
    });
    output
}

/// Pixelwise exclusive or.
pub fn xor(a: &ArrayView2<u8>, b: &ArrayView2<u8>) -> Array2<u8> {
    Zip::from(a)
        .and(b)
        .map_collect(|&x, &y| u8::from((x != 0) != (y != 0)))
}

/// Pixelwise `a - b` clipped at zero.
pub fn subtract(a: &ArrayView2<u8>, b: &ArrayView2<u8>) -> Array2<u8> {
    Zip::from(a).and(b).map_collect(|&x, &y| x.saturating_sub(y))
}

/// Pixelwise logical and.
pub fn and(a: &ArrayView2<u8>, b: &ArrayView2<u8>) -> Array2<u8> {
    Zip::from(a)
        .and(b)
        .map_collect(|&x, &y| u8::from(x != 0 && y != 0))
}

/// Pixelwise logical or.
pub fn or(a: &ArrayView2<u8>, b: &ArrayView2<u8>) -> Array2<u8> {
    Zip::from(a)
        .and(b)
        .map_collect(|&x, &y| u8::from(x != 0 || y != 0))
}

/// Number of set pixels.
pub fn count_nonzero(mask: &ArrayView2<u8>) -> usize {
    mask.iter().filter(|&&v| v != 0).count()
}

/// Reduce a mask to a thin skeleton by iterated cross-element thinning.
///
/// Each round erodes the running mask, dilates the eroded mask back, and keeps the
/// layer that the opening removed. The union of those layers is the skeleton.
/// Rounds continue until the running mask is empty.
///
/// Pixels outside the image count as background, so every erosion strips at least
/// the outer ring of the running mask and an `h × w` mask empties within
/// `ceil(min(h, w) / 2)` rounds. The `max(h, w)` cap is therefore never reached by
/// this routine; it bounds the loop rather than reporting a reachable failure.
///
/// # Errors
/// [`DegenerateFeature::SkeletonDidNotConverge`] if the running mask is still
/// non-empty after `max(h, w)` rounds.
pub fn skeletonize(mask: &ArrayView2<u8>) -> Result<Array2<u8>, DegenerateFeature> {
    let (rows, cols) = mask.dim();
    skeletonize_bounded(mask, rows.max(cols))
}

pub(crate) fn skeletonize_bounded(
    mask: &ArrayView2<u8>,
    max_iterations: usize,
) -> Result<Array2<u8>, DegenerateFeature> {
    let (rows, cols) = mask.dim();
    let cross = cross_element();

    let mut running = mask.mapv(|v| u8::from(v != 0));
    let mut skeleton = Array2::zeros((rows, cols));

    for _ in 0..max_iterations {
        if count_nonzero(&running.view()) == 0 {
            return Ok(skeleton);
        }
        let eroded = erode(&running.view(), &cross.view());
        let opened = dilate(&eroded.view(), &cross.view());
        let layer = subtract(&running.view(), &opened.view());
        skeleton = or(&skeleton.view(), &layer.view());
        running = eroded;
    }

    if count_nonzero(&running.view()) == 0 {
        Ok(skeleton)
    } else {
        Err(DegenerateFeature::SkeletonDidNotConverge {
            iterations: max_iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_proc::kernels::disk_element;
    use ndarray::array;

    /// Reference dilation straight from the definition.
    fn naive_dilate(mask: &Array2<u8>, element: &Array2<u8>) -> Array2<u8> {
        let (rows, cols) = mask.dim();
        let (er, ec) = element.dim();
        let (ar, ac) = ((er / 2) as isize, (ec / 2) as isize);
        Array2::from_shape_fn((rows, cols), |(r, c)| {
            for a in 0..er {
                for b in 0..ec {
                    if element[[a, b]] == 0 {
                        continue;
                    }
                    let y = r as isize + a as isize - ar;
                    let x = c as isize + b as isize - ac;
                    if y >= 0
                        && x >= 0
                        && (y as usize) < rows
                        && (x as usize) < cols
                        && mask[[y as usize, x as usize]] != 0
                    {
                        return 1;
                    }
                }
            }
            0
        })
    }

    #[test]
    fn test_dilate_matches_definition() {
        let mut mask = Array2::zeros((17, 13));
        mask[[0, 0]] = 1;
        mask[[8, 6]] = 1;
        mask[[16, 12]] = 1;
        mask[[10, 2]] = 1;
        for radius in [1, 2, 3, 5] {
            let element = disk_element(radius);
            let fast = dilate(&mask.view(), &element.view());
            let slow = naive_dilate(&mask, &element);
            assert_eq!(fast, slow, "radius {radius}");
        }
    }

    #[test]
    fn test_dilate_with_cross() {
        let mut mask = Array2::zeros((5, 5));
        mask[[2, 2]] = 1;
        let out = dilate(&mask.view(), &cross_element().view());
        assert_eq!(out, cross_element_padded());
    }

    fn cross_element_padded() -> Array2<u8> {
        array![
            [0, 0, 0, 0, 0],
            [0, 0, 1, 0, 0],
            [0, 1, 1, 1, 0],
            [0, 0, 1, 0, 0],
            [0, 0, 0, 0, 0]
        ]
    }

    #[test]
    fn test_erode_treats_border_as_background() {
        let full = Array2::from_elem((4, 6), 1u8);
        let out = erode(&full.view(), &cross_element().view());
        assert_eq!(count_nonzero(&out.view()), 2 * 4);
        assert_eq!(out[[0, 0]], 0);
        assert_eq!(out[[1, 1]], 1);
        assert_eq!(out[[2, 4]], 1);
    }

    #[test]
    fn test_erode_undoes_dilate_of_cross() {
        let eroded = erode(&cross_element_padded().view(), &cross_element().view());
        assert_eq!(count_nonzero(&eroded.view()), 1);
        assert_eq!(eroded[[2, 2]], 1);
    }

    #[test]
    fn test_pixelwise_ops() {
        let a = array![[1u8, 1, 0, 0]];
        let b = array![[1u8, 0, 1, 0]];
        assert_eq!(xor(&a.view(), &b.view()), array![[0u8, 1, 1, 0]]);
        assert_eq!(subtract(&a.view(), &b.view()), array![[0u8, 1, 0, 0]]);
        assert_eq!(and(&a.view(), &b.view()), array![[1u8, 0, 0, 0]]);
        assert_eq!(or(&a.view(), &b.view()), array![[1u8, 1, 1, 0]]);
    }

    #[test]
    fn test_skeleton_of_empty_mask() {
        let empty = Array2::<u8>::zeros((6, 6));
        let skeleton = skeletonize(&empty.view()).unwrap();
        assert_eq!(count_nonzero(&skeleton.view()), 0);
    }

    #[test]
    fn test_skeleton_of_horizontal_bar_is_center_line() {
        let mut bar = Array2::zeros((9, 20));
        for r in 3..6 {
            for c in 2..18 {
                bar[[r, c]] = 1;
            }
        }
        let skeleton = skeletonize(&bar.view()).unwrap();
        let count = count_nonzero(&skeleton.view());
        assert!(count > 0);
        // thinner than the bar and contained in it
        assert!(count < count_nonzero(&bar.view()));
        for ((r, c), &v) in skeleton.indexed_iter() {
            if v != 0 {
                assert_eq!(bar[[r, c]], 1);
            }
        }
        // the center row is fully kept between the bar ends
        for c in 3..17 {
            assert_eq!(skeleton[[4, c]], 1, "missing center pixel at column {c}");
        }
    }

    #[test]
    fn test_skeleton_of_full_frame_converges() {
        let full = Array2::from_elem((7, 11), 1u8);
        let skeleton = skeletonize(&full.view()).unwrap();
        assert!(count_nonzero(&skeleton.view()) > 0);
    }

    #[test]
    fn test_skeleton_round_cap() {
        // a 7-wide bar empties after 4 erosions
        let bar = Array2::from_elem((7, 20), 1u8);
        assert_eq!(
            skeletonize_bounded(&bar.view(), 3),
            Err(DegenerateFeature::SkeletonDidNotConverge { iterations: 3 })
        );
        assert_eq!(
            skeletonize_bounded(&bar.view(), 4).unwrap(),
            skeletonize(&bar.view()).unwrap()
        );
    }

    #[test]
    fn test_single_pixel_is_its_own_skeleton() {
        let mut mask = Array2::zeros((3, 3));
        mask[[1, 1]] = 1;
        let skeleton = skeletonize(&mask.view()).unwrap();
        assert_eq!(skeleton, mask);
    }
}
