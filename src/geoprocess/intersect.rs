//! Spatial join of input features against county polygons.

use std::path::Path;

use anyhow::{bail, Context, Result};
use geo::{BooleanOps, BoundingRect, Geometry, Intersects, MultiPoint, MultiPolygon, Rect};
use rstar::{RTree, RTreeObject, AABB};
use shapefile::dbase::{FieldValue, Record};
use tracing::{info, warn};

use crate::layer::{FeatureLayer, FieldDef, FieldKind};

use super::convert::{as_multi_line_string, as_multi_polygon, to_geometry, to_shape};

/// The intersected layer and the names of the fields the later steps key on.
pub struct Intersection {
    pub layer: FeatureLayer,
    /// Holds the FID of the source feature, e.g. `FID_parcel`.
    pub source_id_field: String,
    /// Holds the county FIPS code.
    pub fips_field: String,
}

struct CountyEntry {
    ordinal: usize,
    fips: FieldValue,
    polygon: MultiPolygon<f64>,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for CountyEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Name of the field that carries the source FID through the intersection.
///
/// Uses the first six characters of the file stem so the name fits a dbf
/// column.
pub fn source_id_field(input_path: &Path) -> String {
    let stem = input_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let short: String = stem.chars().filter(|c| c.is_ascii()).take(6).collect();

    format!("FID_{}", short)
}

/// Intersects every input feature with every county it overlaps.
///
/// Each overlapping pair yields one output feature whose geometry is the
/// clipped piece and whose attributes are the source FID, the source
/// attributes and the county FIPS code.
pub fn intersect(
    input: &FeatureLayer,
    input_path: &Path,
    counties: &FeatureLayer,
    county_fips_field: &str,
) -> Result<Intersection> {
    let fips_def = counties
        .field(county_fips_field)
        .with_context(|| format!("Counties layer has no `{}` field", county_fips_field))?
        .clone();

    let source_id_field = source_id_field(input_path);
    if input.has_field(&source_id_field) {
        bail!("Input already has a `{}` field", source_id_field);
    }

    let fips_field = if input.has_field(&fips_def.name) {
        format!("{}_1", fips_def.name)
    } else {
        fips_def.name.clone()
    };

    let mut fields = vec![FieldDef::new(&source_id_field, FieldKind::ID)];
    fields.extend(input.fields().iter().cloned());
    fields.push(FieldDef::new(&fips_field, fips_def.kind));
    let mut layer = FeatureLayer::new(fields);

    let index = build_index(counties, county_fips_field)?;

    for (fid, feature) in input.features().iter().enumerate() {
        let Some(geometry) = to_geometry(&feature.shape)? else {
            continue;
        };
        let Some(envelope) = envelope(&geometry) else {
            continue;
        };

        let mut candidates: Vec<&CountyEntry> =
            index.locate_in_envelope_intersecting(&envelope).collect();
        candidates.sort_by_key(|c| c.ordinal);

        for county in candidates {
            let Some(piece) = clip(&geometry, &county.polygon) else {
                continue;
            };
            let Some(shape) = to_shape(&piece) else {
                continue;
            };

            let mut record: Record = feature.record.clone();
            record.insert(source_id_field.clone(), FieldValue::Numeric(Some(fid as f64)));
            record.insert(fips_field.clone(), county.fips.clone());
            layer.push(shape, record);
        }
    }

    info!(
        features = input.len(),
        counties = index.size(),
        pieces = layer.len(),
        "Intersected features with counties"
    );

    Ok(Intersection {
        layer,
        source_id_field,
        fips_field,
    })
}

fn build_index(counties: &FeatureLayer, fips_field: &str) -> Result<RTree<CountyEntry>> {
    let mut entries = Vec::new();

    for (ordinal, feature) in counties.features().iter().enumerate() {
        let Some(fips) = feature.record.get(fips_field) else {
            continue;
        };
        let Some(polygon) = to_geometry(&feature.shape)?.as_ref().and_then(as_multi_polygon) else {
            warn!(ordinal, "County feature is not a polygon");
            continue;
        };
        let Some(rect) = polygon.bounding_rect() else {
            continue;
        };

        entries.push(CountyEntry {
            ordinal,
            fips: fips.clone(),
            polygon,
            envelope: to_aabb(rect),
        });
    }

    Ok(RTree::bulk_load(entries))
}

fn envelope(geometry: &Geometry<f64>) -> Option<AABB<[f64; 2]>> {
    geometry.bounding_rect().map(to_aabb)
}

fn to_aabb(rect: Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

/// The part of `geometry` inside `county`, or `None` when they do not meet.
fn clip(geometry: &Geometry<f64>, county: &MultiPolygon<f64>) -> Option<Geometry<f64>> {
    match geometry {
        Geometry::Point(p) => county.intersects(p).then_some(Geometry::Point(*p)),
        Geometry::MultiPoint(mp) => {
            let kept: Vec<_> = mp.iter().filter(|p| county.intersects(*p)).copied().collect();
            (!kept.is_empty()).then(|| Geometry::MultiPoint(MultiPoint::new(kept)))
        }
        Geometry::LineString(_) | Geometry::MultiLineString(_) => {
            let lines = as_multi_line_string(geometry)?;
            let clipped = county.clip(&lines, false);
            (!clipped.0.is_empty()).then_some(Geometry::MultiLineString(clipped))
        }
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) => {
            let polygons = as_multi_polygon(geometry)?;
            let clipped = polygons.intersection(county);
            (!clipped.0.is_empty()).then_some(Geometry::MultiPolygon(clipped))
        }
        _ => None,
    }
}

// -- Tests -------------------------------------------------------------------
