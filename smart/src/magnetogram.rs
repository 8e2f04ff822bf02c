//! Full-disk magnetogram frames.
//!
//! A [`Magnetogram`] bundles the field array with everything the characterizer
//! needs to turn pixels into physical quantities: the disk geometry, the usable disk
//! mask, the capture time and per-pixel coordinate maps. Values outside the usable
//! disk are zeroed once at construction, so every later stage may assume they are 0.
//!
//! Coordinate maps normally come from a WCS-aware projection outside this crate.
//! [`CoordinateMaps::orthographic`] provides a geometric stand-in for synthetic data.

use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayView2, Zip};

use crate::config::SmartConfig;
use crate::error::{Result, SmartError};
use crate::image_proc::kernels::circular_mask;

/// Per-pixel viewing-angle cosine and heliographic coordinates (degrees).
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateMaps {
    cosine: Array2<f64>,
    longitude: Array2<f64>,
    latitude: Array2<f64>,
}

impl CoordinateMaps {
    /// Bundle externally computed maps.
    ///
    /// # Errors
    /// [`SmartError::ShapeMismatch`] unless all three maps share one shape.
    pub fn new(cosine: Array2<f64>, longitude: Array2<f64>, latitude: Array2<f64>) -> Result<Self> {
        for (what, map) in [("longitude map", &longitude), ("latitude map", &latitude)] {
            if map.dim() != cosine.dim() {
                return Err(SmartError::ShapeMismatch {
                    what,
                    expected: cosine.dim(),
                    found: map.dim(),
                });
            }
        }
        Ok(Self {
            cosine,
            longitude,
            latitude,
        })
    }

    /// Orthographic projection of a sphere seen face-on, with solar north up.
    ///
    /// Uses `B0 = 0` and `L0 = 0`: for normalized disk coordinates `(nx, ny)` the
    /// cosine is `sqrt(1 - nx² - ny²)`, the latitude `asin(ny)` and the longitude
    /// `atan2(nx, cosine)`. Pixels on or beyond the limb are 0 in every map.
    ///
    /// # Arguments
    /// * `shape` - `(rows, cols)`
    /// * `center` - Disk center as `(x, y)`
    /// * `solar_radius` - Solar radius in pixels
    pub fn orthographic(shape: (usize, usize), center: (f64, f64), solar_radius: f64) -> Self {
        let (cx, cy) = center;
        let mut cosine = Array2::zeros(shape);
        let mut longitude = Array2::zeros(shape);
        let mut latitude = Array2::zeros(shape);

        Zip::indexed(&mut cosine)
            .and(&mut longitude)
            .and(&mut latitude)
            .for_each(|(row, col), cos, lon, lat| {
                let nx = (col as f64 - cx) / solar_radius;
                let ny = (cy - row as f64) / solar_radius;
                let rho2 = nx * nx + ny * ny;
                if !(rho2 < 1.0) {
                    return;
                }
                let nz = (1.0 - rho2).sqrt();
                *cos = nz;
                *lat = ny.asin().to_degrees();
                *lon = nx.atan2(nz).to_degrees();
            });

        Self {
            cosine,
            longitude,
            latitude,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.cosine.dim()
    }

    pub fn cosine(&self) -> ArrayView2<'_, f64> {
        self.cosine.view()
    }

    pub fn longitude(&self) -> ArrayView2<'_, f64> {
        self.longitude.view()
    }

    pub fn latitude(&self) -> ArrayView2<'_, f64> {
        self.latitude.view()
    }

    fn mask_with(&mut self, disk_mask: &Array2<u8>) {
        for map in [&mut self.cosine, &mut self.longitude, &mut self.latitude] {
            Zip::from(map).and(disk_mask).for_each(|v, &m| {
                if m == 0 {
                    *v = 0.0;
                }
            });
        }
    }
}

/// One line-of-sight magnetogram with its disk geometry.
///
/// # Examples
///
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use ndarray::Array2;
/// use smart::config::SmartConfig;
/// use smart::magnetogram::{CoordinateMaps, Magnetogram};
///
/// let shape = (64, 64);
/// let maps = CoordinateMaps::orthographic(shape, (32.0, 32.0), 30.0);
/// let time = Utc.with_ymd_and_hms(2014, 1, 1, 0, 0, 0).unwrap();
/// let frame = Magnetogram::new(
///     Array2::from_elem(shape, 5.0),
///     (32.0, 32.0),
///     30.0,
///     time,
///     maps,
///     &SmartConfig::default(),
/// )
/// .unwrap();
///
/// // 0.95 * 30 = 28.5, floored
/// assert_eq!(frame.disk_radius(), 28.0);
/// assert_eq!(frame.data()[[0, 0]], 0.0);
/// assert_eq!(frame.data()[[32, 32]], 5.0);
/// ```
#[derive(Debug, Clone)]
pub struct Magnetogram {
    data: Array2<f64>,
    center: (f64, f64),
    solar_radius: f64,
    disk_radius: f64,
    disk_mask: Array2<u8>,
    time: DateTime<Utc>,
    maps: CoordinateMaps,
}

impl Magnetogram {
    /// Build a frame, zeroing non-finite values and everything off the usable disk.
    ///
    /// The usable disk radius is `floor(usable_disk_radius * solar_radius)`.
    ///
    /// # Arguments
    /// * `data` - Field array in Gauss
    /// * `center` - Disk center as `(x, y)` pixels
    /// * `solar_radius` - Solar radius in pixels
    /// * `time` - Capture time
    /// * `maps` - Coordinate maps of the same shape as `data`
    /// * `config` - Supplies the usable disk factor
    ///
    /// # Errors
    /// * [`SmartError::ShapeMismatch`] if the maps do not match `data`
    /// * [`SmartError::InputUnavailable`] for a non-positive or non-finite radius
    pub fn new(
        mut data: Array2<f64>,
        center: (f64, f64),
        solar_radius: f64,
        time: DateTime<Utc>,
        mut maps: CoordinateMaps,
        config: &SmartConfig,
    ) -> Result<Self> {
        if maps.shape() != data.dim() {
            return Err(SmartError::ShapeMismatch {
                what: "coordinate maps",
                expected: data.dim(),
                found: maps.shape(),
            });
        }
        if !(solar_radius > 0.0 && solar_radius.is_finite()) {
            return Err(SmartError::InputUnavailable(format!(
                "invalid solar radius {solar_radius} px"
            )));
        }

        let disk_radius = (config.usable_disk_radius * solar_radius).floor();
        let disk_mask = circular_mask(disk_radius, center, data.dim());

        Zip::from(&mut data).and(&disk_mask).for_each(|v, &m| {
            if m == 0 || !v.is_finite() {
                *v = 0.0;
            }
        });
        maps.mask_with(&disk_mask);

        Ok(Self {
            data,
            center,
            solar_radius,
            disk_radius,
            disk_mask,
            time,
            maps,
        })
    }

    pub fn data(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Disk center as `(x, y)`.
    pub fn center(&self) -> (f64, f64) {
        self.center
    }

    /// Full solar radius in pixels.
    pub fn solar_radius(&self) -> f64 {
        self.solar_radius
    }

    /// Usable disk radius in pixels.
    pub fn disk_radius(&self) -> f64 {
        self.disk_radius
    }

    pub fn disk_mask(&self) -> ArrayView2<'_, u8> {
        self.disk_mask.view()
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn maps(&self) -> &CoordinateMaps {
        &self.maps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2014, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_orthographic_center_and_limb() {
        let maps = CoordinateMaps::orthographic((41, 41), (20.0, 20.0), 20.0);
        assert_relative_eq!(maps.cosine()[[20, 20]], 1.0);
        assert_relative_eq!(maps.latitude()[[20, 20]], 0.0);
        assert_relative_eq!(maps.longitude()[[20, 20]], 0.0);

        // half a radius north of center
        assert_relative_eq!(maps.latitude()[[10, 20]], 30.0, epsilon = 1e-9);
        // half a radius west on the equator
        assert_relative_eq!(maps.longitude()[[20, 30]], 30.0, epsilon = 1e-9);
        assert_relative_eq!(maps.longitude()[[20, 10]], -30.0, epsilon = 1e-9);

        // on the limb
        assert_eq!(maps.cosine()[[20, 40]], 0.0);
        assert_eq!(maps.cosine()[[0, 0]], 0.0);
    }

    #[test]
    fn test_maps_must_share_shape() {
        let result = CoordinateMaps::new(
            Array2::zeros((4, 4)),
            Array2::zeros((4, 4)),
            Array2::zeros((4, 5)),
        );
        assert!(matches!(
            result,
            Err(SmartError::ShapeMismatch {
                what: "latitude map",
                ..
            })
        ));
    }

    #[test]
    fn test_frame_rejects_mismatched_maps() {
        let maps = CoordinateMaps::orthographic((10, 10), (5.0, 5.0), 4.0);
        let result = Magnetogram::new(
            Array2::zeros((10, 12)),
            (5.0, 5.0),
            4.0,
            epoch(),
            maps,
            &SmartConfig::default(),
        );
        assert!(matches!(result, Err(SmartError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_frame_rejects_bad_radius() {
        let maps = CoordinateMaps::orthographic((10, 10), (5.0, 5.0), 4.0);
        let result = Magnetogram::new(
            Array2::zeros((10, 10)),
            (5.0, 5.0),
            0.0,
            epoch(),
            maps,
            &SmartConfig::default(),
        );
        assert!(matches!(result, Err(SmartError::InputUnavailable(_))));
    }

    #[test]
    fn test_frame_cleans_data_and_maps() {
        let shape = (21, 21);
        let mut data = Array2::from_elem(shape, 100.0);
        data[[10, 10]] = f64::NAN;
        let maps = CoordinateMaps::orthographic(shape, (10.0, 10.0), 10.0);
        let frame = Magnetogram::new(
            data,
            (10.0, 10.0),
            10.0,
            epoch(),
            maps,
            &SmartConfig::default(),
        )
        .unwrap();

        assert_eq!(frame.disk_radius(), 9.0);
        assert_eq!(frame.data()[[10, 10]], 0.0);
        assert_eq!(frame.data()[[10, 11]], 100.0);
        // inside the solar disk but outside the usable one
        assert_eq!(frame.disk_mask()[[10, 19]], 0);
        assert_eq!(frame.data()[[10, 19]], 0.0);
        assert_eq!(frame.maps().cosine()[[10, 19]], 0.0);
        assert!(frame.maps().cosine()[[10, 18]] > 0.0);
    }
}
