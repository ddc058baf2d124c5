//! GeoJSON geometries.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;

/// A GeoJSON position: longitude, latitude and an optional altitude.
pub type Position = Vec<f64>;

/// The shape attached to a record.
///
/// Serialized in GeoJSON form, tagged by `type`. Shapes without a typed
/// variant, such as `GeometryCollection`, are kept as raw JSON and written
/// back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    /// A single position.
    Point {
        /// The position.
        coordinates: Position,
    },
    /// Several unconnected positions.
    MultiPoint {
        /// The positions.
        coordinates: Vec<Position>,
    },
    /// A connected line.
    LineString {
        /// The line's vertices.
        coordinates: Vec<Position>,
    },
    /// Several lines.
    MultiLineString {
        /// The lines.
        coordinates: Vec<Vec<Position>>,
    },
    /// A polygon: an exterior ring followed by holes.
    Polygon {
        /// The rings.
        coordinates: Vec<Vec<Position>>,
    },
    /// Several polygons.
    MultiPolygon {
        /// The polygons.
        coordinates: Vec<Vec<Vec<Position>>>,
    },
    /// Any other geometry, as received.
    #[serde(untagged)]
    Other(Value),
}

impl Geometry {
    /// Creates a point from a longitude and latitude.
    pub fn point(lon: f64, lat: f64) -> Self {
        Geometry::Point {
            coordinates: vec![lon, lat],
        }
    }

    /// Returns the GeoJSON type name.
    pub fn type_name(&self) -> &str {
        match self {
            Geometry::Point { .. } => "Point",
            Geometry::MultiPoint { .. } => "MultiPoint",
            Geometry::LineString { .. } => "LineString",
            Geometry::MultiLineString { .. } => "MultiLineString",
            Geometry::Polygon { .. } => "Polygon",
            Geometry::MultiPolygon { .. } => "MultiPolygon",
            Geometry::Other(value) => value.get("type").and_then(Value::as_str).unwrap_or(""),
        }
    }

    /// Renders the geometry as well-known text, e.g. `POINT (-75.16 39.95)`.
    pub fn to_wkt(&self) -> String {
        let mut out = String::new();
        match self {
            Geometry::Point { coordinates } => {
                out.push_str("POINT (");
                write_position(&mut out, coordinates);
                out.push(')');
            }
            Geometry::MultiPoint { coordinates } => {
                out.push_str("MULTIPOINT ");
                write_ring(&mut out, coordinates);
            }
            Geometry::LineString { coordinates } => {
                out.push_str("LINESTRING ");
                write_ring(&mut out, coordinates);
            }
            Geometry::MultiLineString { coordinates } => {
                out.push_str("MULTILINESTRING ");
                write_rings(&mut out, coordinates);
            }
            Geometry::Polygon { coordinates } => {
                out.push_str("POLYGON ");
                write_rings(&mut out, coordinates);
            }
            Geometry::MultiPolygon { coordinates } => {
                out.push_str("MULTIPOLYGON (");
                for (i, polygon) in coordinates.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    write_rings(&mut out, polygon);
                }
                out.push(')');
            }
            Geometry::Other(value) => write_collection(&mut out, value),
        }
        out
    }
}

/// Renders a `GeometryCollection`; other unknown shapes render as nothing.
fn write_collection(out: &mut String, value: &Value) {
    if value.get("type").and_then(Value::as_str) != Some("GeometryCollection") {
        return;
    }
    let members: Vec<String> = value
        .get("geometries")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value::<Geometry>(item.clone()).ok())
                .map(|geometry| geometry.to_wkt())
                .filter(|wkt| !wkt.is_empty())
                .collect()
        })
        .unwrap_or_default();
    if members.is_empty() {
        out.push_str("GEOMETRYCOLLECTION EMPTY");
    } else {
        let _ = write!(out, "GEOMETRYCOLLECTION ({})", members.join(", "));
    }
}

fn write_position(out: &mut String, position: &[f64]) {
    for (i, value) in position.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{}", value);
    }
}

fn write_ring(out: &mut String, ring: &[Position]) {
    out.push('(');
    for (i, position) in ring.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_position(out, position);
    }
    out.push(')');
}

fn write_rings(out: &mut String, rings: &[Vec<Position>]) {
    out.push('(');
    for (i, ring) in rings.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_ring(out, ring);
    }
    out.push(')');
}
