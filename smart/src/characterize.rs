//! Physical and morphological properties of one detected feature.
//!
//! The characterizer works on the bounding box of a boundary polygon. The feature
//! footprint is the filled polygon intersected with the usable disk; every
//! aggregate is taken over footprint pixels only, through [`MaskedSample`].
//!
//! Units: field in Gauss, area in m², flux in Mx (`1 G = 1 Mx/cm²`, hence the
//! factor `10⁴` per m²), flux rate in Mx/s, gradients in G per pixel and, for the
//! strong-gradient test, G/Mm.

use std::sync::Arc;

use log::debug;
use ndarray::{s, Array2, ArrayView2, Zip};

use crate::config::SmartConfig;
use crate::error::{ConfigError, DegenerateFeature, Result, SmartError};
use crate::feature::{
    FeatureRecord, FieldStatistics, FluxProperties, HeliographicPosition, PslProperties,
};
use crate::image_proc::aabb::AABB;
use crate::image_proc::contours::BoundaryPolygon;
use crate::image_proc::convolve2d::{gaussian_blur, sobel_xy};
use crate::image_proc::kernels::disk_element;
use crate::image_proc::masked::MaskedSample;
use crate::image_proc::morphology::{and, count_nonzero, dilate, skeletonize};
use crate::magnetogram::Magnetogram;

/// Gauss·m² to Maxwell.
const MAXWELL_PER_GAUSS_M2: f64 = 1.0e4;

/// Previous field, rotated onto the current frame, and the time elapsed since.
#[derive(Debug, Clone, Copy)]
pub struct PreviousField<'a> {
    pub data: ArrayView2<'a, f64>,
    pub elapsed_seconds: f64,
}

/// Computes a [`FeatureRecord`] for each boundary polygon of a frame.
#[derive(Debug, Clone)]
pub struct FeatureCharacterizer {
    threshold: f64,
    area_per_pixel: f64,
    megameters_per_pixel: f64,
    sg_threshold: f64,
    psl_element: Arc<Array2<u8>>,
    r_star_blur_size: usize,
    r_star_blur_sigma: f64,
}

impl FeatureCharacterizer {
    /// Build a characterizer from a validated configuration.
    pub fn new(config: &SmartConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            threshold: config.static_background_threshold,
            area_per_pixel: config.area_per_pixel(),
            megameters_per_pixel: config.megameters_per_pixel(),
            sg_threshold: config.sg_threshold,
            psl_element: disk_element(config.psl_dilation_radius),
            r_star_blur_size: config.r_star_blur_kernel_size,
            r_star_blur_sigma: config.r_star_blur_sigma,
        })
    }

    /// Characterize one feature.
    ///
    /// # Arguments
    /// * `frame` - Frame the polygon was segmented from
    /// * `index` - Index of the feature within the frame
    /// * `polygon` - Outer boundary of the feature
    /// * `previous` - Rotated previous field; `None` or zero elapsed time gives a
    ///   zero flux rate
    ///
    /// # Errors
    /// * [`DegenerateFeature::EmptyFootprint`] if no footprint pixel is on the disk
    /// * [`DegenerateFeature::SkeletonDidNotConverge`] on malformed PSL zones
    /// * [`SmartError::ShapeMismatch`] if the polygon leaves the frame or the
    ///   previous field has another shape
    pub fn characterize(
        &self,
        frame: &Magnetogram,
        index: usize,
        polygon: &BoundaryPolygon,
        previous: Option<PreviousField<'_>>,
    ) -> Result<FeatureRecord> {
        let bbox = polygon
            .bounding_box()
            .ok_or(DegenerateFeature::EmptyFootprint)?;
        if !bbox.fits_within(frame.shape()) {
            return Err(SmartError::ShapeMismatch {
                what: "feature contour",
                expected: frame.shape(),
                found: (bbox.max_row + 1, bbox.max_col + 1),
            });
        }
        if let Some(prev) = &previous {
            if prev.data.dim() != frame.shape() {
                return Err(SmartError::ShapeMismatch {
                    what: "previous frame",
                    expected: frame.shape(),
                    found: prev.data.dim(),
                });
            }
        }

        let (x, y, width, height) = bbox.to_xywh();

        // footprint
        let filled = polygon.fill((height, width), (x, y));
        let footprint = and(&filled.view(), &crop(frame.disk_mask(), &bbox));
        if count_nonzero(&footprint.view()) == 0 {
            return Err(DegenerateFeature::EmptyFootprint.into());
        }

        // field, with the same noise floor the segmenter used
        let data = Zip::from(crop(frame.data(), &bbox))
            .and(&footprint)
            .map_collect(|&v, &m| {
                if m != 0 && v.abs() > self.threshold {
                    v
                } else {
                    0.0
                }
            });

        let area_map = Zip::from(&footprint)
            .and(crop(frame.maps().cosine(), &bbox))
            .map_collect(|&m, &cos| {
                if m != 0 && cos > 0.0 {
                    self.area_per_pixel / cos
                } else {
                    0.0
                }
            });
        let flux_map = Zip::from(&data)
            .and(&area_map)
            .map_collect(|&b, &a| b * MAXWELL_PER_GAUSS_M2 * a);

        let flux_rate = match previous {
            Some(prev) if prev.elapsed_seconds != 0.0 => Zip::from(&flux_map)
                .and(crop(prev.data, &bbox))
                .and(&area_map)
                // the previous term stays in G·m²
                .map_collect(|&phi, &b_prev, &a| {
                    (phi.abs() - (b_prev * a).abs()) / prev.elapsed_seconds
                }),
            _ => Array2::zeros((height, width)),
        };

        let field = MaskedSample::new(&data.view(), &footprint.view())?;
        let stats = FieldStatistics {
            max: field.max()?,
            min: field.min()?,
            sum: field.sum()?,
            abs_sum: field.abs_sum()?,
            mean: field.mean()?,
            variance: field.variance()?,
            skewness: field.skewness()?,
            kurtosis: field.kurtosis()?,
        };

        let flux_sample = MaskedSample::new(&flux_map.view(), &footprint.view())?;
        let phi_pos = flux_sample.sum_where(|v| v > 0.0)?;
        let phi_neg = flux_sample.sum_where(|v| v < 0.0)?;
        let phi_abs = flux_sample.abs_sum()?;
        let phi_imb = (phi_abs != 0.0).then(|| (phi_pos - phi_neg.abs()).abs() / phi_abs);
        let flux = FluxProperties {
            area: MaskedSample::new(&area_map.view(), &footprint.view())?.sum()?,
            phi_pos,
            phi_neg,
            phi_abs,
            phi_imb,
            phi_net_emrg: MaskedSample::new(&flux_rate.view(), &footprint.view())?.sum()?,
        };

        let position = position(
            &data,
            &footprint,
            crop(frame.maps().longitude(), &bbox),
            crop(frame.maps().latitude(), &bbox),
        )?;
        let psl = self.polarity_separation(&data)?;

        debug!(
            "feature {index}: {}x{} at ({x}, {y}), {} px, phi_abs {:.3e} Mx, PSL {} px",
            width,
            height,
            field.count(),
            flux.phi_abs,
            psl.psl_len
        );

        Ok(FeatureRecord {
            id: None,
            index,
            time: frame.time(),
            bbox,
            contour: polygon.clone(),
            mask: footprint,
            position,
            stats,
            flux,
            psl,
        })
    }

    /// PSL zone, its skeleton and the gradient measures along it.
    fn polarity_separation(&self, data: &Array2<f64>) -> Result<PslProperties> {
        let element = self.psl_element.view();
        let positive = data.mapv(|v| u8::from(v > 0.0));
        let negative = data.mapv(|v| u8::from(v < 0.0));
        let zone = and(
            &dilate(&positive.view(), &element).view(),
            &dilate(&negative.view(), &element).view(),
        );
        let skeleton = skeletonize(&zone.view())?;

        let gradient = sobel_xy(&data.view());
        let mut sg_len = 0u64;
        let mut wl_sg_star = 0.0;
        Zip::from(&skeleton).and(&gradient).for_each(|&on, &g| {
            if on != 0 {
                wl_sg_star += g;
                if g / self.megameters_per_pixel > self.sg_threshold {
                    sg_len += 1;
                }
            }
        });

        let smoothed_zone = gaussian_blur(
            &zone.mapv(f64::from).view(),
            self.r_star_blur_size,
            self.r_star_blur_sigma,
        );
        let r_star = data
            .iter()
            .zip(smoothed_zone.iter())
            .map(|(&b, &w)| b * w)
            .sum();

        Ok(PslProperties {
            psl_len: count_nonzero(&skeleton.view()) as u64,
            sg_len,
            r_star,
            wl_sg_star,
        })
    }
}

fn crop<'a, T>(view: ArrayView2<'a, T>, bbox: &AABB) -> ArrayView2<'a, T> {
    let (rows, cols) = bbox.ranges();
    view.slice_move(s![rows, cols])
}

/// Field-magnitude weighted heliographic position, `None` without field.
fn position(
    data: &Array2<f64>,
    footprint: &Array2<u8>,
    longitude: ArrayView2<'_, f64>,
    latitude: ArrayView2<'_, f64>,
) -> Result<Option<HeliographicPosition>> {
    let magnitude = data.mapv(f64::abs);
    let weights = MaskedSample::new(&magnitude.view(), &footprint.view())?;
    let longitude = weights.weighted_mean_of(&longitude)?;
    let latitude = weights.weighted_mean_of(&latitude)?;
    Ok(match (longitude, latitude) {
        (Some(longitude), Some(latitude)) => Some(HeliographicPosition {
            longitude,
            latitude,
        }),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::magnetogram::CoordinateMaps;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use chrono::{TimeZone, Utc};

    const SHAPE: (usize, usize) = (41, 41);

    fn config() -> SmartConfig {
        SmartConfig {
            psl_dilation_radius: 3,
            ..Default::default()
        }
    }

    fn frame(data: Array2<f64>) -> Magnetogram {
        let maps = CoordinateMaps::orthographic(SHAPE, (20.0, 20.0), 20.0);
        Magnetogram::new(
            data,
            (20.0, 20.0),
            20.0,
            Utc.with_ymd_and_hms(2014, 1, 1, 0, 0, 0).unwrap(),
            maps,
            &config(),
        )
        .unwrap()
    }

    fn rectangle(x0: usize, y0: usize, x1: usize, y1: usize) -> BoundaryPolygon {
        BoundaryPolygon::new(vec![[x0, y0], [x0, y1], [x1, y1], [x1, y0]])
    }

    #[test]
    fn test_single_pixel_blob() {
        let mut data = Array2::zeros(SHAPE);
        data[[20, 20]] = 200.0;
        let frame = frame(data);
        let characterizer = FeatureCharacterizer::new(&config()).unwrap();

        let polygon = BoundaryPolygon::new(vec![[20, 20]]);
        let feature = characterizer.characterize(&frame, 0, &polygon, None).unwrap();

        let area = config().area_per_pixel();
        assert_eq!(feature.shape(), (20, 20, 1, 1));
        assert_relative_eq!(feature.flux.area, area);
        assert_relative_eq!(feature.flux.phi_pos, 200.0 * 1e4 * area);
        assert_eq!(feature.flux.phi_neg, 0.0);
        assert_eq!(feature.flux.phi_imb, Some(1.0));
        assert_eq!(feature.flux.phi_net_emrg, 0.0);
        assert_eq!(feature.stats.max, 200.0);
        assert_eq!(feature.stats.skewness, 0.0);
        assert_eq!(feature.stats.kurtosis, -3.0);
        assert_eq!(feature.psl.psl_len, 0);

        let position = feature.position.unwrap();
        assert_abs_diff_eq!(position.longitude, 0.0);
        assert_abs_diff_eq!(position.latitude, 0.0);
    }

    #[test]
    fn test_antisymmetric_blob() {
        let mut data = Array2::zeros(SHAPE);
        data.slice_mut(s![16..25, 10..20]).fill(200.0);
        data.slice_mut(s![16..25, 21..31]).fill(-200.0);
        let frame = frame(data);
        let characterizer = FeatureCharacterizer::new(&config()).unwrap();

        let feature = characterizer
            .characterize(&frame, 4, &rectangle(10, 16, 30, 24), None)
            .unwrap();

        assert_eq!(feature.index, 4);
        assert_abs_diff_eq!(feature.flux.phi_imb.unwrap(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(feature.flux.phi_pos, -feature.flux.phi_neg, max_relative = 1e-9);
        assert!(feature.psl.psl_len > 0);
        assert_abs_diff_eq!(feature.stats.sum, 0.0);
        // symmetric about the central meridian
        assert_abs_diff_eq!(feature.position.unwrap().longitude, 0.0, epsilon = 1e-9);
        assert_eq!(feature.classification().code(), "MSE");
    }

    #[test]
    fn test_footprint_is_clipped_to_disk() {
        let data = Array2::from_elem(SHAPE, 300.0);
        let frame = frame(data);
        let characterizer = FeatureCharacterizer::new(&config()).unwrap();

        // box over the whole frame, only the usable disk counts
        let feature = characterizer
            .characterize(&frame, 0, &rectangle(0, 0, 40, 40), None)
            .unwrap();
        assert_eq!(feature.mask.dim(), (41, 41));
        assert_eq!(feature.mask[[0, 0]], 0);
        assert_eq!(feature.mask[[20, 20]], 1);
        assert_eq!(
            count_nonzero(&feature.mask.view()),
            count_nonzero(&frame.disk_mask())
        );
    }

    #[test]
    fn test_feature_off_disk_is_degenerate() {
        let frame = frame(Array2::from_elem(SHAPE, 300.0));
        let characterizer = FeatureCharacterizer::new(&config()).unwrap();
        let result = characterizer.characterize(&frame, 0, &rectangle(0, 0, 3, 3), None);
        assert_eq!(
            result.unwrap_err(),
            SmartError::Degenerate(DegenerateFeature::EmptyFootprint)
        );
    }

    #[test]
    fn test_polygon_outside_frame() {
        let frame = frame(Array2::zeros(SHAPE));
        let characterizer = FeatureCharacterizer::new(&config()).unwrap();
        let result = characterizer.characterize(&frame, 0, &rectangle(30, 30, 45, 35), None);
        assert!(matches!(result, Err(SmartError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_quiet_region_has_undefined_balance_and_position() {
        let mut data = Array2::zeros(SHAPE);
        data.slice_mut(s![18..23, 18..23]).fill(50.0);
        let frame = frame(data);
        let characterizer = FeatureCharacterizer::new(&config()).unwrap();

        let feature = characterizer
            .characterize(&frame, 0, &rectangle(18, 18, 22, 22), None)
            .unwrap();
        assert_eq!(feature.flux.phi_abs, 0.0);
        assert_eq!(feature.flux.phi_imb, None);
        assert_eq!(feature.position, None);
        assert_eq!(feature.stats.max, 0.0);
        assert_eq!(feature.classification().code(), "MSE");
    }

    #[test]
    fn test_flux_rate_against_previous_field() {
        let mut data = Array2::zeros(SHAPE);
        data.slice_mut(s![18..23, 18..23]).fill(-400.0);
        let frame = frame(data);
        let characterizer = FeatureCharacterizer::new(&config()).unwrap();
        let polygon = rectangle(18, 18, 22, 22);

        let unchanged = characterizer
            .characterize(
                &frame,
                0,
                &polygon,
                Some(PreviousField {
                    data: frame.data(),
                    elapsed_seconds: 720.0,
                }),
            )
            .unwrap();
        // only the current term is converted to Mx
        assert_relative_eq!(
            unchanged.flux.phi_net_emrg,
            unchanged.flux.phi_abs * (1.0 - 1e-4) / 720.0,
            max_relative = 1e-12
        );

        let blank = Array2::zeros(SHAPE);
        let emerged = characterizer
            .characterize(
                &frame,
                0,
                &polygon,
                Some(PreviousField {
                    data: blank.view(),
                    elapsed_seconds: 720.0,
                }),
            )
            .unwrap();
        assert_relative_eq!(
            emerged.flux.phi_net_emrg,
            emerged.flux.phi_abs / 720.0,
            max_relative = 1e-12
        );
        assert_eq!(emerged.classification().code(), "USE");

        let simultaneous = characterizer
            .characterize(
                &frame,
                0,
                &polygon,
                Some(PreviousField {
                    data: blank.view(),
                    elapsed_seconds: 0.0,
                }),
            )
            .unwrap();
        assert_eq!(simultaneous.flux.phi_net_emrg, 0.0);
    }

    #[test]
    fn test_previous_field_shape_is_checked() {
        let frame = frame(Array2::zeros(SHAPE));
        let characterizer = FeatureCharacterizer::new(&config()).unwrap();
        let small = Array2::zeros((10, 10));
        let result = characterizer.characterize(
            &frame,
            0,
            &rectangle(18, 18, 22, 22),
            Some(PreviousField {
                data: small.view(),
                elapsed_seconds: 1.0,
            }),
        );
        assert!(matches!(
            result,
            Err(SmartError::ShapeMismatch {
                what: "previous frame",
                ..
            })
        ));
    }

    #[test]
    fn test_straight_psl_has_no_mixed_gradient() {
        let mut data = Array2::zeros(SHAPE);
        data.slice_mut(s![14..26, 12..20]).fill(900.0);
        data.slice_mut(s![14..26, 20..28]).fill(-900.0);
        let frame = frame(data);
        let characterizer = FeatureCharacterizer::new(&config()).unwrap();

        let feature = characterizer
            .characterize(&frame, 0, &rectangle(12, 14, 27, 25), None)
            .unwrap();
        assert!(feature.psl.psl_len > 0);
        assert_eq!(feature.psl.sg_len, 0);
        assert_eq!(feature.psl.wl_sg_star, 0.0);
        assert_abs_diff_eq!(feature.psl.r_star, 0.0, epsilon = 1e-6);
    }

    /// Four quadrants meeting at the center of a 12×12 box, the top-left one stronger.
    fn quadrant_frame() -> Magnetogram {
        let mut data = Array2::zeros(SHAPE);
        data.slice_mut(s![14..20, 14..20]).fill(1200.0);
        data.slice_mut(s![14..20, 20..26]).fill(-900.0);
        data.slice_mut(s![20..26, 14..20]).fill(-900.0);
        data.slice_mut(s![20..26, 20..26]).fill(900.0);
        frame(data)
    }

    #[test]
    fn test_psl_gradient_measures_at_quadrant_corner() {
        let config = SmartConfig {
            r_star_blur_kernel_size: 1,
            ..config()
        };
        let characterizer = FeatureCharacterizer::new(&config).unwrap();
        let feature = characterizer
            .characterize(&quadrant_frame(), 0, &rectangle(14, 14, 25, 25), None)
            .unwrap();

        // the zone is a 4-wide cross through the box center
        assert_eq!(feature.psl.psl_len, 28);
        // only the four center pixels see a sign change along both axes:
        // 1200 + 900 + 900 + 900 each
        assert_eq!(feature.psl.sg_len, 4);
        assert_relative_eq!(feature.psl.wl_sg_star, 4.0 * 3900.0);
        // unblurred zone: 20 pixels per quadrant
        assert_relative_eq!(feature.psl.r_star, 20.0 * (1200.0 - 900.0 - 900.0 + 900.0));
    }

    #[test]
    fn test_strong_gradient_threshold_is_strict() {
        let frame = quadrant_frame();
        let polygon = rectangle(14, 14, 25, 25);
        let corner = 3900.0 / config().megameters_per_pixel();

        let sg_len = |sg_threshold: f64| {
            let config = SmartConfig {
                sg_threshold,
                ..config()
            };
            let feature = FeatureCharacterizer::new(&config)
                .unwrap()
                .characterize(&frame, 0, &polygon, None)
                .unwrap();
            assert_eq!(feature.psl.psl_len, 28);
            feature.psl.sg_len
        };
        assert_eq!(sg_len(0.0), 4);
        assert_eq!(sg_len(corner - 1.0), 4);
        assert_eq!(sg_len(corner), 0);
    }
}
