//! Feature records and their wire representation.
//!
//! A [`FeatureRecord`] owns copies of its contour and footprint mask, so the frame
//! it was measured on may be dropped as soon as characterization finishes. Records
//! travel to the property database as [`FeatureWire`], a flat JSON object.

use std::fmt;

use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SmartError};
use crate::image_proc::aabb::AABB;
use crate::image_proc::contours::BoundaryPolygon;

/// Imbalance above which a feature counts as unipolar.
pub const UNIPOLAR_IMBALANCE: f64 = 0.9;

/// Absolute flux (Mx) above which a feature counts as large.
pub const LARGE_FLUX_MX: f64 = 1.0e21;

/// Largest footprint, in pixels, accepted from the wire. Bigger than any full-disk frame.
pub const MAX_WIRE_PIXELS: usize = 8192 * 8192;

/// Flux-weighted heliographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeliographicPosition {
    pub longitude: f64,
    pub latitude: f64,
}

/// Moments of the field (Gauss) over the footprint.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FieldStatistics {
    pub max: f64,
    pub min: f64,
    pub sum: f64,
    pub abs_sum: f64,
    pub mean: f64,
    pub variance: f64,
    pub skewness: f64,
    pub kurtosis: f64,
}

/// Area (m²) and flux (Mx) quantities over the footprint.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FluxProperties {
    pub area: f64,
    pub phi_pos: f64,
    pub phi_neg: f64,
    pub phi_abs: f64,
    /// `None` when the absolute flux is zero and the imbalance is undefined
    pub phi_imb: Option<f64>,
    /// Net flux change rate (Mx/s)
    pub phi_net_emrg: f64,
}

/// Polarity separation line measures.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PslProperties {
    /// Skeleton length in pixels
    pub psl_len: u64,
    /// Skeleton pixels with a strong gradient
    pub sg_len: u64,
    pub r_star: f64,
    pub wl_sg_star: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolarityBalance {
    Unipolar,
    Multipolar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureSize {
    Large,
    Small,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Growth {
    Emerging,
    Decaying,
}

/// Three-way feature classification.
///
/// Displays as the concatenated first letters, e.g. `"ULE"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub balance: PolarityBalance,
    pub size: FeatureSize,
    pub growth: Growth,
}

impl Classification {
    /// Classify from imbalance, absolute flux and net emergence.
    ///
    /// An undefined imbalance classifies as multipolar.
    pub fn from_fluxes(phi_imb: Option<f64>, phi_abs: f64, phi_net_emrg: f64) -> Self {
        let balance = match phi_imb {
            Some(imb) if imb > UNIPOLAR_IMBALANCE => PolarityBalance::Unipolar,
            _ => PolarityBalance::Multipolar,
        };
        let size = if phi_abs > LARGE_FLUX_MX {
            FeatureSize::Large
        } else {
            FeatureSize::Small
        };
        let growth = if phi_net_emrg >= 0.0 {
            Growth::Emerging
        } else {
            Growth::Decaying
        };
        Self {
            balance,
            size,
            growth,
        }
    }

    /// Three-letter code.
    pub fn code(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let balance = match self.balance {
            PolarityBalance::Unipolar => 'U',
            PolarityBalance::Multipolar => 'M',
        };
        let size = match self.size {
            FeatureSize::Large => 'L',
            FeatureSize::Small => 'S',
        };
        let growth = match self.growth {
            Growth::Emerging => 'E',
            Growth::Decaying => 'D',
        };
        write!(f, "{balance}{size}{growth}")
    }
}

/// One characterized feature.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    /// Database id, assigned by the property store
    pub id: Option<i64>,
    /// Position in the frame's feature list
    pub index: usize,
    pub time: DateTime<Utc>,
    pub bbox: AABB,
    pub contour: BoundaryPolygon,
    /// `height × width` footprint, 1 inside the feature and the usable disk
    pub mask: Array2<u8>,
    /// `None` when the feature carries no absolute field
    pub position: Option<HeliographicPosition>,
    pub stats: FieldStatistics,
    pub flux: FluxProperties,
    pub psl: PslProperties,
}

impl FeatureRecord {
    /// Classification computed from the current field values.
    pub fn classification(&self) -> Classification {
        Classification::from_fluxes(self.flux.phi_imb, self.flux.phi_abs, self.flux.phi_net_emrg)
    }

    /// `(x, y, width, height)` of the bounding box.
    pub fn shape(&self) -> (usize, usize, usize, usize) {
        self.bbox.to_xywh()
    }

    /// Flatten into the property database representation.
    pub fn to_wire(&self) -> FeatureWire {
        let (pos_x, pos_y, width, height) = self.shape();
        FeatureWire {
            fc_id: self.id,
            time_start: self.time,
            lat_hg: self.position.map(|p| p.latitude),
            long_hg: self.position.map(|p| p.longitude),
            nar: 0,
            index: self.index,
            contour: self.contour.clone(),
            pos_x,
            pos_y,
            width,
            height,
            max: self.stats.max,
            min: self.stats.min,
            sum: self.stats.sum,
            abs_sum: self.stats.abs_sum,
            mean: self.stats.mean,
            variance: self.stats.variance,
            skewness: self.stats.skewness,
            kurtosis: self.stats.kurtosis,
            area: self.flux.area,
            phi_pos: self.flux.phi_pos,
            phi_neg: self.flux.phi_neg,
            phi_abs: self.flux.phi_abs,
            phi_imb: self.flux.phi_imb,
            phi_net_emrg: self.flux.phi_net_emrg,
            psl_len: self.psl.psl_len,
            sg_len: self.psl.sg_len,
            r_star: self.psl.r_star,
            wl_sg_star: self.psl.wl_sg_star,
            class: self.classification().code(),
        }
    }

    /// Rebuild a record from its wire form.
    ///
    /// The footprint is recovered by filling the contour; the disk mask is not part
    /// of the wire format. The stored class is ignored and recomputed on demand.
    ///
    /// # Errors
    /// [`SmartError::InvalidWire`] for an empty, overflowing or oversized box, an
    /// empty contour, or when only one of the two position coordinates is present.
    pub fn from_wire(wire: FeatureWire) -> Result<Self> {
        let bbox = AABB::checked_from_xywh(wire.pos_x, wire.pos_y, wire.width, wire.height)
            .ok_or_else(|| {
                SmartError::InvalidWire(format!(
                    "bounding box {}x{} at ({}, {}) is empty or out of range",
                    wire.width, wire.height, wire.pos_x, wire.pos_y
                ))
            })?;
        if wire
            .width
            .checked_mul(wire.height)
            .map_or(true, |area| area > MAX_WIRE_PIXELS)
        {
            return Err(SmartError::InvalidWire(format!(
                "bounding box {}x{} exceeds {MAX_WIRE_PIXELS} pixels",
                wire.width, wire.height
            )));
        }
        if wire.contour.is_empty() {
            return Err(SmartError::InvalidWire("empty contour".to_string()));
        }
        let position = match (wire.long_hg, wire.lat_hg) {
            (Some(longitude), Some(latitude)) => Some(HeliographicPosition {
                longitude,
                latitude,
            }),
            (None, None) => None,
            _ => {
                return Err(SmartError::InvalidWire(
                    "lat_hg and long_hg must both be present or both be null".to_string(),
                ))
            }
        };

        let mask = wire
            .contour
            .fill((wire.height, wire.width), (wire.pos_x, wire.pos_y));

        Ok(Self {
            id: wire.fc_id,
            index: wire.index,
            time: wire.time_start,
            bbox,
            contour: wire.contour,
            mask,
            position,
            stats: FieldStatistics {
                max: wire.max,
                min: wire.min,
                sum: wire.sum,
                abs_sum: wire.abs_sum,
                mean: wire.mean,
                variance: wire.variance,
                skewness: wire.skewness,
                kurtosis: wire.kurtosis,
            },
            flux: FluxProperties {
                area: wire.area,
                phi_pos: wire.phi_pos,
                phi_neg: wire.phi_neg,
                phi_abs: wire.phi_abs,
                phi_imb: wire.phi_imb,
                phi_net_emrg: wire.phi_net_emrg,
            },
            psl: PslProperties {
                psl_len: wire.psl_len,
                sg_len: wire.sg_len,
                r_star: wire.r_star,
                wl_sg_star: wire.wl_sg_star,
            },
        })
    }
}

/// Flat key/value form of a [`FeatureRecord`] accepted by the property database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fc_id: Option<i64>,
    pub time_start: DateTime<Utc>,
    pub lat_hg: Option<f64>,
    pub long_hg: Option<f64>,
    pub nar: u32,
    pub index: usize,
    pub contour: BoundaryPolygon,
    pub pos_x: usize,
    pub pos_y: usize,
    pub width: usize,
    pub height: usize,
    pub max: f64,
    pub min: f64,
    pub sum: f64,
    pub abs_sum: f64,
    pub mean: f64,
    pub variance: f64,
    pub skewness: f64,
    pub kurtosis: f64,
    pub area: f64,
    pub phi_pos: f64,
    pub phi_neg: f64,
    pub phi_abs: f64,
    pub phi_imb: Option<f64>,
    pub phi_net_emrg: f64,
    #[serde(rename = "PSL_len")]
    pub psl_len: u64,
    #[serde(rename = "SG_len")]
    pub sg_len: u64,
    #[serde(rename = "R_star")]
    pub r_star: f64,
    #[serde(rename = "WL_sg_star")]
    pub wl_sg_star: f64,
    #[serde(default)]
    pub class: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(phi_imb: Option<f64>, phi_abs: f64, phi_net_emrg: f64) -> FeatureRecord {
        let contour = BoundaryPolygon::new(vec![[10, 20], [10, 23], [13, 23], [13, 20]]);
        let bbox = contour.bounding_box().unwrap();
        FeatureRecord {
            id: None,
            index: 3,
            time: Utc.with_ymd_and_hms(2014, 1, 1, 0, 12, 0).unwrap(),
            bbox,
            mask: contour.fill((bbox.height(), bbox.width()), (10, 20)),
            contour,
            position: Some(HeliographicPosition {
                longitude: -12.25,
                latitude: 0.1 + 0.2,
            }),
            stats: FieldStatistics {
                max: 812.5,
                min: -640.125,
                sum: 1.0 / 3.0,
                abs_sum: 9876.54321,
                mean: 0.020833333333333332,
                variance: 123456.789,
                skewness: -0.3333333333333333,
                kurtosis: 2.718281828459045,
            },
            flux: FluxProperties {
                area: 2.2458e15,
                phi_pos: 7.1e20,
                phi_neg: -6.9e20,
                phi_abs,
                phi_imb,
                phi_net_emrg,
            },
            psl: PslProperties {
                psl_len: 17,
                sg_len: 4,
                r_star: 3.14159e3,
                wl_sg_star: -42.0,
            },
        }
    }

    #[test]
    fn test_all_eight_classes() {
        let mut codes = std::collections::HashSet::new();
        for imb in [0.95, 0.5] {
            for abs in [2.0e21, 1.0e20] {
                for emrg in [1.0, -1.0] {
                    codes.insert(Classification::from_fluxes(Some(imb), abs, emrg).code());
                }
            }
        }
        let mut codes: Vec<_> = codes.into_iter().collect();
        codes.sort();
        assert_eq!(
            codes,
            ["MLD", "MLE", "MSD", "MSE", "ULD", "ULE", "USD", "USE"]
        );
    }

    #[test]
    fn test_classification_thresholds() {
        assert_eq!(record(Some(0.95), 2.0e21, 1.0).classification().code(), "ULE");
        // boundaries: imbalance and size are strict, growth is not
        assert_eq!(record(Some(0.9), 1.0e21, 0.0).classification().code(), "MSE");
        assert_eq!(record(Some(0.91), 1.0e21, -1e-9).classification().code(), "USD");
    }

    #[test]
    fn test_undefined_imbalance_is_multipolar() {
        assert_eq!(record(None, 0.0, 0.0).classification().code(), "MSE");
    }

    #[test]
    fn test_classification_follows_current_fields() {
        let mut feature = record(Some(0.95), 2.0e21, 1.0);
        assert_eq!(feature.classification().to_string(), "ULE");
        feature.flux.phi_net_emrg = -5.0;
        assert_eq!(feature.classification().to_string(), "ULD");
    }

    #[test]
    fn test_wire_keys() {
        let wire = record(Some(0.5), 1.0e20, 2.0).to_wire();
        let value = serde_json::to_value(&wire).unwrap();
        let object = value.as_object().unwrap();

        for key in [
            "time_start", "lat_hg", "long_hg", "nar", "index", "contour", "pos_x", "pos_y",
            "width", "height", "max", "min", "sum", "abs_sum", "mean", "variance", "skewness",
            "kurtosis", "area", "phi_pos", "phi_neg", "phi_abs", "phi_imb", "phi_net_emrg",
            "PSL_len", "SG_len", "R_star", "WL_sg_star", "class",
        ] {
            assert!(object.contains_key(key), "missing key {key}");
        }
        assert!(!object.contains_key("fc_id"));
        assert_eq!(object["time_start"], "2014-01-01T00:12:00Z");
        assert_eq!(object["class"], "MSE");
        assert_eq!(object["contour"][1], serde_json::json!([10, 23]));
        assert_eq!(object["pos_x"], 10);
        assert_eq!(object["height"], 4);
    }

    #[test]
    fn test_undefined_fields_serialize_as_null() {
        let mut feature = record(None, 0.0, 0.0);
        feature.position = None;
        let value = serde_json::to_value(feature.to_wire()).unwrap();
        assert!(value["phi_imb"].is_null());
        assert!(value["lat_hg"].is_null());
        assert!(value["long_hg"].is_null());

        let back: FeatureWire = serde_json::from_value(value).unwrap();
        let rebuilt = FeatureRecord::from_wire(back).unwrap();
        assert_eq!(rebuilt.flux.phi_imb, None);
        assert_eq!(rebuilt.position, None);
    }

    #[test]
    fn test_json_round_trip_is_exact() {
        let mut original = record(Some(0.1 + 0.7), 1.0e21 / 3.0, -7.0e15 / 11.0);
        original.id = Some(991);

        let text = serde_json::to_string(&original.to_wire()).unwrap();
        let wire: FeatureWire = serde_json::from_str(&text).unwrap();
        let rebuilt = FeatureRecord::from_wire(wire).unwrap();

        assert_eq!(rebuilt, original);
        assert_eq!(rebuilt.contour.points(), original.contour.points());
    }

    #[test]
    fn test_from_wire_rejects_empty_box() {
        let mut wire = record(Some(0.5), 1.0, 1.0).to_wire();
        wire.width = 0;
        assert!(matches!(
            FeatureRecord::from_wire(wire),
            Err(SmartError::InvalidWire(_))
        ));
    }

    #[test]
    fn test_from_wire_rejects_out_of_range_box() {
        let wire = record(Some(0.5), 1.0, 1.0).to_wire();

        let mut overflowing = wire.clone();
        overflowing.pos_x = usize::MAX;
        let mut tall = wire.clone();
        tall.pos_y = usize::MAX - 1;
        let mut huge = wire;
        huge.width = 1 << 20;
        huge.height = 1 << 20;

        for bad in [overflowing, tall, huge] {
            assert!(matches!(
                FeatureRecord::from_wire(bad),
                Err(SmartError::InvalidWire(_))
            ));
        }
    }

    #[test]
    fn test_from_wire_rejects_half_position() {
        let mut wire = record(Some(0.5), 1.0, 1.0).to_wire();
        wire.lat_hg = None;
        assert!(matches!(
            FeatureRecord::from_wire(wire),
            Err(SmartError::InvalidWire(_))
        ));
    }

    #[test]
    fn test_from_wire_ignores_stored_class() {
        let mut wire = record(Some(0.95), 2.0e21, 1.0).to_wire();
        wire.class = "MSD".to_string();
        let rebuilt = FeatureRecord::from_wire(wire).unwrap();
        assert_eq!(rebuilt.classification().code(), "ULE");
    }
}
