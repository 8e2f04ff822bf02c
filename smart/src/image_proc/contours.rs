//! Outer contours of binary regions and their rasterization.
//!
//! [`find_external_contours`] returns one closed boundary polygon per 8-connected
//! region that is not nested inside a hole of another region. Boundaries are traced
//! with Suzuki-Abe border following and compressed so that only the end points of
//! horizontal, vertical and diagonal runs remain.
//!
//! [`BoundaryPolygon::fill`] goes the other way: it rasterizes a polygon, filled and
//! including its edges, into a mask.

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::image_proc::aabb::AABB;

/// Chain-code neighbor offsets `(d_row, d_col)`; increasing index turns counterclockwise.
const DIRECTIONS: [(isize, isize); 8] = [
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Closed outer boundary of one region, as `[x, y]` pixel coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoundaryPolygon {
    points: Vec<[usize; 2]>,
}

impl BoundaryPolygon {
    /// Wrap an ordered point list. The polygon closes from the last point to the first.
    pub fn new(points: Vec<[usize; 2]>) -> Self {
        Self { points }
    }

    /// Vertices as `[x, y]`.
    pub fn points(&self) -> &[[usize; 2]] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Smallest box containing every vertex, or `None` for an empty polygon.
    pub fn bounding_box(&self) -> Option<AABB> {
        if self.points.is_empty() {
            return None;
        }
        let mut bbox = AABB::new();
        for &[x, y] in &self.points {
            bbox.expand_to_include(y, x);
        }
        Some(bbox)
    }

    /// Rasterize the filled polygon into a `shape` mask whose `[0, 0]` sits at `origin`.
    ///
    /// Edges are drawn with Bresenham lines and count as inside. Everything not
    /// reachable from outside the mask through 4-connected non-edge pixels is filled.
    /// Vertices outside the mask are clipped.
    ///
    /// # Arguments
    /// * `shape` - Output `(rows, cols)`
    /// * `origin` - Image coordinates `(x, y)` of the output's top-left pixel
    pub fn fill(&self, shape: (usize, usize), origin: (usize, usize)) -> Array2<u8> {
        let (rows, cols) = shape;
        // one pixel of padding on every side so the outside is connected
        let mut edges = Array2::<u8>::zeros((rows + 2, cols + 2));
        let mut plot = |x: isize, y: isize| {
            let px = x - origin.0 as isize + 1;
            let py = y - origin.1 as isize + 1;
            if px >= 1 && py >= 1 && px <= cols as isize && py <= rows as isize {
                edges[[py as usize, px as usize]] = 1;
            }
        };

        let n = self.points.len();
        for i in 0..n {
            let [x0, y0] = self.points[i];
            let [x1, y1] = self.points[(i + 1) % n];
            bresenham(
                (x0 as isize, y0 as isize),
                (x1 as isize, y1 as isize),
                &mut plot,
            );
        }

        let outside = flood_background(&edges.view());
        Array2::from_shape_fn(shape, |(r, c)| u8::from(!outside[[r + 1, c + 1]]))
    }
}

fn bresenham(from: (isize, isize), to: (isize, isize), plot: &mut impl FnMut(isize, isize)) {
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        plot(x, y);
        if x == to.0 && y == to.1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// 4-connected flood of zero pixels starting from `[0, 0]`.
fn flood_background(mask: &ArrayView2<u8>) -> Array2<bool> {
    let (rows, cols) = mask.dim();
    let mut reached = Array2::from_elem((rows, cols), false);
    if rows == 0 || cols == 0 || mask[[0, 0]] != 0 {
        return reached;
    }
    let mut stack = vec![(0usize, 0usize)];
    reached[[0, 0]] = true;
    while let Some((r, c)) = stack.pop() {
        let neighbors = [
            (r.wrapping_sub(1), c),
            (r + 1, c),
            (r, c.wrapping_sub(1)),
            (r, c + 1),
        ];
        for (nr, nc) in neighbors {
            if nr < rows && nc < cols && !reached[[nr, nc]] && mask[[nr, nc]] == 0 {
                reached[[nr, nc]] = true;
                stack.push((nr, nc));
            }
        }
    }
    reached
}

/// Label 8-connected regions of set pixels in raster order.
///
/// # Returns
/// The label image (0 = background, regions numbered from 1) and the raster-first
/// pixel `(row, col)` of every region, indexed by `label - 1`.
pub fn connected_components(mask: &ArrayView2<u8>) -> (Array2<u32>, Vec<(usize, usize)>) {
    let (rows, cols) = mask.dim();
    let mut labels = Array2::zeros((rows, cols));
    let mut starts = Vec::new();

    for i in 0..rows {
        for j in 0..cols {
            if mask[[i, j]] == 0 || labels[[i, j]] != 0 {
                continue;
            }
            starts.push((i, j));
            let label = starts.len() as u32;
            let mut stack = vec![(i, j)];
            labels[[i, j]] = label;

            while let Some((y, x)) = stack.pop() {
                for &(dy, dx) in &DIRECTIONS {
                    let ny = y as isize + dy;
                    let nx = x as isize + dx;
                    if ny < 0 || nx < 0 || ny >= rows as isize || nx >= cols as isize {
                        continue;
                    }
                    let (ny, nx) = (ny as usize, nx as usize);
                    if mask[[ny, nx]] != 0 && labels[[ny, nx]] == 0 {
                        labels[[ny, nx]] = label;
                        stack.push((ny, nx));
                    }
                }
            }
        }
    }

    (labels, starts)
}

/// Outer boundaries of all regions not enclosed by another region.
///
/// Polygons come back in raster order of each region's top-left pixel. Regions
/// touching the image border are kept.
///
/// # Examples
/// ```rust
/// use ndarray::Array2;
/// use smart::image_proc::contours::find_external_contours;
///
/// let mut mask = Array2::<u8>::zeros((6, 6));
/// for r in 1..4 {
///     for c in 2..5 {
///         mask[[r, c]] = 1;
///     }
/// }
/// let contours = find_external_contours(&mask.view());
/// assert_eq!(contours.len(), 1);
/// // a filled square compresses to its four corners
/// assert_eq!(contours[0].len(), 4);
/// ```
pub fn find_external_contours(mask: &ArrayView2<u8>) -> Vec<BoundaryPolygon> {
    let (rows, cols) = mask.dim();
    let (labels, starts) = connected_components(mask);
    if starts.is_empty() {
        return Vec::new();
    }

    let mut padded = Array2::<u8>::zeros((rows + 2, cols + 2));
    padded
        .slice_mut(ndarray::s![1..rows + 1, 1..cols + 1])
        .assign(&mask.mapv(|v| u8::from(v != 0)));
    let outside = flood_background(&padded.view());

    let mut external = vec![false; starts.len()];
    for ((r, c), &label) in labels.indexed_iter() {
        if label == 0 || external[label as usize - 1] {
            continue;
        }
        let (pr, pc) = (r + 1, c + 1);
        if outside[[pr - 1, pc]]
            || outside[[pr + 1, pc]]
            || outside[[pr, pc - 1]]
            || outside[[pr, pc + 1]]
        {
            external[label as usize - 1] = true;
        }
    }

    starts
        .iter()
        .zip(external)
        .filter(|(_, is_external)| *is_external)
        .map(|(&start, _)| {
            let border = trace_outer_border(mask, start);
            BoundaryPolygon::new(compress_chain(&border))
        })
        .collect()
}

fn direction_between(from: (usize, usize), to: (usize, usize)) -> usize {
    let d = (
        to.0 as isize - from.0 as isize,
        to.1 as isize - from.1 as isize,
    );
    DIRECTIONS
        .iter()
        .position(|&offset| offset == d)
        .unwrap_or(0)
}

fn neighbor(mask: &ArrayView2<u8>, at: (usize, usize), dir: usize) -> Option<(usize, usize)> {
    let (rows, cols) = mask.dim();
    let (dr, dc) = DIRECTIONS[dir];
    let r = at.0 as isize + dr;
    let c = at.1 as isize + dc;
    if r < 0 || c < 0 || r >= rows as isize || c >= cols as isize {
        return None;
    }
    let (r, c) = (r as usize, c as usize);
    (mask[[r, c]] != 0).then_some((r, c))
}

/// Follow the outer border of the region whose raster-first pixel is `start`.
///
/// Returns the visited border pixels as `(row, col)`, one entry per step.
fn trace_outer_border(mask: &ArrayView2<u8>, start: (usize, usize)) -> Vec<(usize, usize)> {
    // clockwise search from the left neighbor, which is background by construction
    let first = (0..8)
        .map(|k| (4 + 8 - k) % 8)
        .find_map(|dir| neighbor(mask, start, dir));
    let Some(first) = first else {
        return vec![start];
    };

    let mut border = Vec::new();
    let mut previous = first;
    let mut current = start;
    loop {
        let back = direction_between(current, previous);
        let next = (1..=8)
            .map(|k| (back + k) % 8)
            .find_map(|dir| neighbor(mask, current, dir))
            .unwrap_or(previous);
        border.push(current);
        if next == start && current == first {
            break;
        }
        previous = current;
        current = next;
    }
    border
}

/// Drop border pixels that continue a straight run; returns `[x, y]` points.
fn compress_chain(border: &[(usize, usize)]) -> Vec<[usize; 2]> {
    let n = border.len();
    if n <= 2 {
        return border.iter().map(|&(r, c)| [c, r]).collect();
    }
    (0..n)
        .filter(|&i| {
            let prev = border[(i + n - 1) % n];
            let here = border[i];
            let next = border[(i + 1) % n];
            direction_between(prev, here) != direction_between(here, next)
        })
        .map(|i| [border[i].1, border[i].0])
        .collect()
}
