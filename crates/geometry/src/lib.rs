//! Polygon handling for grazing sections and paddock boundaries.
//!
//! Sections arrive as untrusted GeoJSON from the generative capability and
//! must be validated before anything is persisted. This crate owns the
//! parsing, well-formedness checks, and the geometric predicates the engine
//! needs: area, centroid, containment, overlap, and boundary clipping.

use geo::{BooleanOps, Centroid, Coord, GeodesicArea, LineString, MultiPolygon, Polygon};
use geojson::{GeoJson, Value as GeoJsonValue};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use thiserror::Error;

const SQUARE_METERS_PER_HECTARE: f64 = 10_000.0;

/// Geometry validation errors
#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("geometry is not valid GeoJSON: {0}")]
    Parse(String),

    #[error("expected a Polygon geometry, got {0}")]
    NotAPolygon(String),

    #[error("polygon ring has {0} distinct vertices, need at least 3")]
    TooFewVertices(usize),

    #[error("polygon contains a non-finite coordinate")]
    NonFiniteCoordinate,

    #[error("polygon has no exterior ring")]
    EmptyPolygon,
}

pub type Result<T> = std::result::Result<T, GeometryError>;

/// A validated polygon in lng/lat order, ring layout preserved exactly as
/// submitted so persisted geometry reads back bit-for-bit.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionPolygon {
    rings: Vec<Vec<[f64; 2]>>,
}

impl SectionPolygon {
    /// Parse and validate a polygon from a GeoJSON value. Accepts a bare
    /// `Geometry` or a `Feature` wrapping one. An unclosed exterior ring
    /// with at least 3 distinct vertices is closed automatically; anything
    /// less is rejected.
    pub fn from_json_value(value: &JsonValue) -> Result<Self> {
        let geojson = GeoJson::from_json_value(value.clone())
            .map_err(|e| GeometryError::Parse(e.to_string()))?;

        let geometry = match geojson {
            GeoJson::Geometry(g) => g,
            GeoJson::Feature(f) => f
                .geometry
                .ok_or_else(|| GeometryError::Parse("feature has no geometry".to_string()))?,
            GeoJson::FeatureCollection(_) => {
                return Err(GeometryError::NotAPolygon("FeatureCollection".to_string()))
            }
        };

        let raw_rings = match geometry.value {
            GeoJsonValue::Polygon(rings) => rings,
            other => return Err(GeometryError::NotAPolygon(other.type_name().to_string())),
        };

        Self::from_rings(
            raw_rings
                .into_iter()
                .map(|ring| {
                    ring.into_iter()
                        .map(|pos| {
                            let lng = pos.first().copied().unwrap_or(f64::NAN);
                            let lat = pos.get(1).copied().unwrap_or(f64::NAN);
                            [lng, lat]
                        })
                        .collect()
                })
                .collect(),
        )
    }

    /// Build from raw rings (exterior first), applying the same validation
    /// as [`Self::from_json_value`].
    pub fn from_rings(rings: Vec<Vec<[f64; 2]>>) -> Result<Self> {
        let mut validated = Vec::with_capacity(rings.len());
        for mut ring in rings {
            for pos in &ring {
                if !pos[0].is_finite() || !pos[1].is_finite() {
                    return Err(GeometryError::NonFiniteCoordinate);
                }
            }

            let closed = ring.len() >= 2 && ring.first() == ring.last();
            let distinct = if closed { ring.len() - 1 } else { ring.len() };
            if distinct < 3 {
                return Err(GeometryError::TooFewVertices(distinct));
            }
            if !closed {
                let first = ring[0];
                ring.push(first);
            }
            validated.push(ring);
        }

        if validated.is_empty() {
            return Err(GeometryError::EmptyPolygon);
        }

        Ok(Self { rings: validated })
    }

    /// The validated rings, exterior first, each closed.
    pub fn rings(&self) -> &[Vec<[f64; 2]>] {
        &self.rings
    }

    /// Render back to a GeoJSON geometry value.
    pub fn to_json_value(&self) -> JsonValue {
        let rings: Vec<Vec<Vec<f64>>> = self
            .rings
            .iter()
            .map(|ring| ring.iter().map(|pos| vec![pos[0], pos[1]]).collect())
            .collect();
        let geometry = geojson::Geometry::new(GeoJsonValue::Polygon(rings));
        JsonValue::Object(geojson::JsonObject::from(&geometry))
    }

    /// Geodesic area in hectares.
    pub fn area_hectares(&self) -> f64 {
        self.to_geo().geodesic_area_unsigned() / SQUARE_METERS_PER_HECTARE
    }

    /// Centroid as a [lng, lat] pair.
    pub fn centroid_lnglat(&self) -> [f64; 2] {
        match self.to_geo().centroid() {
            Some(point) => [point.x(), point.y()],
            // Degenerate ring; fall back to the first vertex.
            None => self.rings[0][0],
        }
    }

    /// Fraction of this polygon's area that lies inside `boundary`, in 0..=1.
    /// 1.0 means fully contained, 0.0 means fully outside.
    pub fn containment_fraction(&self, boundary: &SectionPolygon) -> f64 {
        let own_area = self.to_geo().geodesic_area_unsigned();
        if own_area <= 0.0 {
            return 0.0;
        }
        let intersection = self.to_geo().intersection(&boundary.to_geo());
        multi_area(&intersection) / own_area
    }

    /// Fraction of this polygon's area shared with `other`, in 0..=1.
    pub fn overlap_fraction(&self, other: &SectionPolygon) -> f64 {
        self.containment_fraction(other)
    }

    /// Clip this polygon to `boundary`, keeping the largest piece of the
    /// intersection. Returns `None` when the two do not intersect at all.
    pub fn clip_to(&self, boundary: &SectionPolygon) -> Option<SectionPolygon> {
        let intersection = self.to_geo().intersection(&boundary.to_geo());
        let largest = intersection
            .into_iter()
            .max_by(|a, b| {
                a.geodesic_area_unsigned()
                    .total_cmp(&b.geodesic_area_unsigned())
            })?;
        if largest.geodesic_area_unsigned() <= 0.0 {
            return None;
        }
        Some(Self::from_geo(&largest))
    }

    fn to_geo(&self) -> Polygon<f64> {
        let mut rings = self.rings.iter().map(|ring| {
            LineString::from(
                ring.iter()
                    .map(|pos| Coord {
                        x: pos[0],
                        y: pos[1],
                    })
                    .collect::<Vec<_>>(),
            )
        });
        let exterior = rings.next().unwrap_or_else(|| LineString::new(Vec::new()));
        Polygon::new(exterior, rings.collect())
    }

    fn from_geo(polygon: &Polygon<f64>) -> Self {
        let ring_to_positions = |ring: &LineString<f64>| {
            ring.coords().map(|c| [c.x, c.y]).collect::<Vec<[f64; 2]>>()
        };
        let mut rings = vec![ring_to_positions(polygon.exterior())];
        rings.extend(polygon.interiors().iter().map(ring_to_positions));
        Self { rings }
    }
}

fn multi_area(multi: &MultiPolygon<f64>) -> f64 {
    multi.iter().map(|p| p.geodesic_area_unsigned()).sum()
}

impl Serialize for SectionPolygon {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SectionPolygon {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        SectionPolygon::from_json_value(&value).map_err(D::Error::custom)
    }
}
