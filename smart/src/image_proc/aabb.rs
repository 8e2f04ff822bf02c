//! Axis-aligned pixel bounding boxes for detected features.
//!
//! Boxes use inclusive bounds in image coordinates (rows grow downward, columns
//! rightward). Feature records and the property database speak in
//! `(x, y, width, height)`; [`AABB::to_xywh`] and [`AABB::from_xywh`] convert.

/// Axis-Aligned Bounding Box for 2D image regions.
///
/// # Examples
///
/// ```rust
/// use smart::image_proc::aabb::AABB;
///
/// let bbox = AABB::from_coords(100, 200, 104, 209);
/// assert_eq!(bbox.width(), 10);
/// assert_eq!(bbox.height(), 5);
/// assert_eq!(bbox.area(), 50);
/// assert_eq!(bbox.to_xywh(), (200, 100, 10, 5));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AABB {
    /// Minimum row (y) coordinate (inclusive)
    pub min_row: usize,
    /// Minimum column (x) coordinate (inclusive)
    pub min_col: usize,
    /// Maximum row (y) coordinate (inclusive)
    pub max_row: usize,
    /// Maximum column (x) coordinate (inclusive)
    pub max_col: usize,
}

impl AABB {
    /// Create a new empty AABB with invalid bounds.
    ///
    /// Grows into a valid box through [`AABB::expand_to_include`].
    pub fn new() -> Self {
        Self {
            min_row: usize::MAX,
            min_col: usize::MAX,
            max_row: 0,
            max_col: 0,
        }
    }

    /// Create an AABB from explicit inclusive bounds.
    pub fn from_coords(min_row: usize, min_col: usize, max_row: usize, max_col: usize) -> Self {
        Self {
            min_row,
            min_col,
            max_row,
            max_col,
        }
    }

    /// Create an AABB from `(x, y, width, height)`.
    ///
    /// # Panics
    /// If `width` or `height` is zero.
    pub fn from_xywh(x: usize, y: usize, width: usize, height: usize) -> Self {
        assert!(width > 0 && height > 0, "bounding box must not be empty");
        Self {
            min_row: y,
            min_col: x,
            max_row: y + height - 1,
            max_col: x + width - 1,
        }
    }

    /// Like [`AABB::from_xywh`], but `None` for an empty box or one whose far edge
    /// does not fit in `usize`.
    pub fn checked_from_xywh(x: usize, y: usize, width: usize, height: usize) -> Option<Self> {
        Some(Self {
            min_row: y,
            min_col: x,
            max_row: y.checked_add(height.checked_sub(1)?)?,
            max_col: x.checked_add(width.checked_sub(1)?)?,
        })
    }

    /// Convert to `(x, y, width, height)`.
    pub fn to_xywh(&self) -> (usize, usize, usize, usize) {
        (self.min_col, self.min_row, self.width(), self.height())
    }

    /// Expand the AABB to include a specific point.
    pub fn expand_to_include(&mut self, row: usize, col: usize) {
        self.min_row = self.min_row.min(row);
        self.min_col = self.min_col.min(col);
        self.max_row = self.max_row.max(row);
        self.max_col = self.max_col.max(col);
    }

    /// Width in pixels (column span).
    pub fn width(&self) -> usize {
        if self.is_valid() {
            self.max_col - self.min_col + 1
        } else {
            0
        }
    }

    /// Height in pixels (row span).
    pub fn height(&self) -> usize {
        if self.is_valid() {
            self.max_row - self.min_row + 1
        } else {
            0
        }
    }

    /// Area in pixels (width × height).
    pub fn area(&self) -> usize {
        self.width() * self.height()
    }

    /// Check whether the bounds describe at least one pixel.
    pub fn is_valid(&self) -> bool {
        self.min_row <= self.max_row && self.min_col <= self.max_col
    }

    /// Check if a point lies inside the box (inclusive).
    pub fn contains_point(&self, row: usize, col: usize) -> bool {
        row >= self.min_row && row <= self.max_row && col >= self.min_col && col <= self.max_col
    }

    /// Whether the box lies entirely within an image of the given `(rows, cols)`.
    pub fn fits_within(&self, shape: (usize, usize)) -> bool {
        self.is_valid() && self.max_row < shape.0 && self.max_col < shape.1
    }

    /// Slice ranges `(rows, cols)` covering the box, for `ndarray::s!`.
    pub fn ranges(&self) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
        (self.min_row..self.max_row + 1, self.min_col..self.max_col + 1)
    }
}

impl Default for AABB {
    fn default() -> Self {
        Self::new()
    }
}
