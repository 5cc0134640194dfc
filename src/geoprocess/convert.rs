//! Conversion between shapefile shapes and `geo` geometries.

use anyhow::{anyhow, Result};
use geo::{Geometry, LineString, MultiLineString, MultiPolygon, Polygon};
use shapefile::{Multipoint, Point, PolygonRing, Polyline, Shape};

/// Converts a shape to a `geo` geometry. Null shapes have no geometry.
pub fn to_geometry(shape: &Shape) -> Result<Option<Geometry<f64>>> {
    if matches!(shape, Shape::NullShape) {
        return Ok(None);
    }

    Geometry::<f64>::try_from(clone_shape(shape))
        .map(Some)
        .map_err(|e| anyhow!("Unsupported shape: {}", e))
}

/// Deep copy of a shape. `Shape` itself is not `Clone`, its records are.
pub fn clone_shape(shape: &Shape) -> Shape {
    match shape {
        Shape::NullShape => Shape::NullShape,
        Shape::Point(s) => Shape::Point(*s),
        Shape::PointM(s) => Shape::PointM(*s),
        Shape::PointZ(s) => Shape::PointZ(*s),
        Shape::Polyline(s) => Shape::Polyline(s.clone()),
        Shape::PolylineM(s) => Shape::PolylineM(s.clone()),
        Shape::PolylineZ(s) => Shape::PolylineZ(s.clone()),
        Shape::Polygon(s) => Shape::Polygon(s.clone()),
        Shape::PolygonM(s) => Shape::PolygonM(s.clone()),
        Shape::PolygonZ(s) => Shape::PolygonZ(s.clone()),
        Shape::Multipoint(s) => Shape::Multipoint(s.clone()),
        Shape::MultipointM(s) => Shape::MultipointM(s.clone()),
        Shape::MultipointZ(s) => Shape::MultipointZ(s.clone()),
        Shape::Multipatch(s) => Shape::Multipatch(s.clone()),
    }
}

/// Converts a 2D geometry back to a shape. Empty geometries give `None`.
pub fn to_shape(geometry: &Geometry<f64>) -> Option<Shape> {
    match geometry {
        Geometry::Point(p) => Some(Shape::Point(Point::new(p.x(), p.y()))),
        Geometry::MultiPoint(mp) => {
            let points: Vec<Point> = mp.iter().map(|p| Point::new(p.x(), p.y())).collect();
            (!points.is_empty()).then(|| Shape::Multipoint(Multipoint::new(points)))
        }
        Geometry::LineString(ls) => polyline(std::slice::from_ref(ls)),
        Geometry::MultiLineString(mls) => polyline(&mls.0),
        Geometry::Polygon(p) => polygon(std::slice::from_ref(p)),
        Geometry::MultiPolygon(mp) => polygon(&mp.0),
        _ => None,
    }
}

/// Polygonal part of a geometry, if it has one.
pub fn as_multi_polygon(geometry: &Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p.clone()])),
        Geometry::MultiPolygon(mp) => Some(mp.clone()),
        _ => None,
    }
}

/// Linear part of a geometry, if it has one.
pub fn as_multi_line_string(geometry: &Geometry<f64>) -> Option<MultiLineString<f64>> {
    match geometry {
        Geometry::LineString(ls) => Some(MultiLineString::new(vec![ls.clone()])),
        Geometry::MultiLineString(mls) => Some(mls.clone()),
        _ => None,
    }
}

fn points(line: &LineString<f64>) -> Vec<Point> {
    line.coords().map(|c| Point::new(c.x, c.y)).collect()
}

fn polyline(lines: &[LineString<f64>]) -> Option<Shape> {
    let parts: Vec<Vec<Point>> = lines
        .iter()
        .map(points)
        .filter(|part| part.len() >= 2)
        .collect();

    (!parts.is_empty()).then(|| Shape::Polyline(Polyline::with_parts(parts)))
}

fn polygon(polygons: &[Polygon<f64>]) -> Option<Shape> {
    let mut rings = Vec::new();
    for p in polygons {
        let outer = points(p.exterior());
        if outer.len() < 4 {
            continue;
        }
        rings.push(PolygonRing::Outer(outer));
        rings.extend(
            p.interiors()
                .iter()
                .map(points)
                .filter(|ring| ring.len() >= 4)
                .map(PolygonRing::Inner),
        );
    }

    (!rings.is_empty()).then(|| Shape::Polygon(shapefile::Polygon::with_rings(rings)))
}

// -- Tests -------------------------------------------------------------------
