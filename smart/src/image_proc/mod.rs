//! Image processing primitives for magnetogram feature extraction
//!
//! This module provides the array-level building blocks shared by every pipeline
//! stage: structuring elements, separable filters, binary morphology, contour
//! tracing, bounding boxes and masked statistics.

pub mod aabb;
pub mod contours;
pub mod convolve2d;
pub mod kernels;
pub mod masked;
pub mod morphology;

// Re-export key functionality for easier access
pub use aabb::AABB;
pub use contours::{find_external_contours, BoundaryPolygon};
pub use convolve2d::{gaussian_blur, sobel_xy};
pub use kernels::{circular_mask, disk_element};
pub use masked::MaskedSample;
