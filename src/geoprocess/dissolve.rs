//! Dissolve features by a key, aggregating numeric attributes.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use geo::{BooleanOps, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point};
use shapefile::dbase::{FieldValue, Record};
use tracing::{debug, warn};

use crate::layer::{value_as_f64, Feature, FeatureLayer, FieldDef, FieldKind};

use super::convert::{to_geometry, to_shape};

/// Aggregate applied to a field when dissolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statistic {
    Mean,
    Max,
    Min,
}

impl Statistic {
    fn prefix(&self) -> &'static str {
        match self {
            Statistic::Mean => "MEAN",
            Statistic::Max => "MAX",
            Statistic::Min => "MIN",
        }
    }

    /// Applies the statistic to the non-null values. `None` when there are none.
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }

        let result = match self {
            Statistic::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Statistic::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Statistic::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        };

        Some(result)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatField {
    pub field: String,
    pub statistic: Statistic,
}

impl StatField {
    pub fn new(field: &str, statistic: Statistic) -> Self {
        StatField {
            field: field.to_string(),
            statistic,
        }
    }

    /// Output column name, e.g. `MEAN_AvgPr` for the mean of `AvgPrecip`.
    pub fn output_name(&self) -> String {
        format!("{}_{}", self.statistic.prefix(), self.field)
            .chars()
            .take(10)
            .collect()
    }
}

/// A key value usable for grouping and ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupKey {
    Number(i64),
    Text(String),
}

impl GroupKey {
    pub fn from_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Character(Some(s)) => Some(GroupKey::Text(s.trim().to_string())),
            FieldValue::Integer(i) => Some(GroupKey::Number(i64::from(*i))),
            other => value_as_f64(other).map(|v| GroupKey::Number(v.round() as i64)),
        }
    }
}

/// Merges features sharing `key` into one feature per key value.
///
/// The output has the key field followed by one column per statistic, in
/// ascending key order. The geometry is the union of the group's pieces.
pub fn dissolve(layer: &FeatureLayer, key: &str, stats: &[StatField]) -> Result<FeatureLayer> {
    let key_def = layer
        .field(key)
        .with_context(|| format!("Cannot dissolve on missing field `{}`", key))?
        .clone();
    for stat in stats {
        layer
            .field(&stat.field)
            .with_context(|| format!("Cannot summarise missing field `{}`", stat.field))?;
    }

    let mut groups: BTreeMap<GroupKey, (FieldValue, Vec<&Feature>)> = BTreeMap::new();
    let mut unkeyed = 0;
    for feature in layer.features() {
        let value = feature.record.get(key);
        match value.and_then(GroupKey::from_value) {
            Some(group) => groups
                .entry(group)
                .or_insert_with(|| (value.cloned().unwrap_or(key_def.kind.null_value()), Vec::new()))
                .1
                .push(feature),
            None => unkeyed += 1,
        }
    }
    if unkeyed > 0 {
        warn!(key, unkeyed, "Features without a dissolve key were left out");
    }

    let mut fields = vec![key_def.clone()];
    fields.extend(stats.iter().map(|s| {
        FieldDef::new(
            &s.output_name(),
            FieldKind::Numeric {
                length: 19,
                decimals: 11,
            },
        )
    }));
    let mut dissolved = FeatureLayer::new(fields);

    for (key_value, members) in groups.into_values() {
        let Some(shape) = merge_geometry(&members)?.as_ref().and_then(to_shape) else {
            continue;
        };

        let mut record = Record::default();
        record.insert(key_def.name.clone(), key_value);
        for stat in stats {
            let values: Vec<f64> = members
                .iter()
                .filter_map(|f| f.record.get(&stat.field))
                .filter_map(value_as_f64)
                .collect();
            record.insert(stat.output_name(), FieldValue::Numeric(stat.statistic.apply(&values)));
        }
        dissolved.push(shape, record);
    }

    debug!(key, groups = dissolved.len(), "Dissolved layer");

    Ok(dissolved)
}

/// Unions the geometries of one group. Mixed families keep the first one seen.
fn merge_geometry(members: &[&Feature]) -> Result<Option<Geometry<f64>>> {
    let mut points: Vec<Point<f64>> = Vec::new();
    let mut lines: Vec<LineString<f64>> = Vec::new();
    let mut area: Option<MultiPolygon<f64>> = None;

    for feature in members {
        match to_geometry(&feature.shape)? {
            Some(Geometry::Point(p)) => points.push(p),
            Some(Geometry::MultiPoint(mp)) => points.extend(mp.0),
            Some(Geometry::LineString(ls)) => lines.push(ls),
            Some(Geometry::MultiLineString(mls)) => lines.extend(mls.0),
            Some(Geometry::Polygon(p)) => area = Some(merge_area(area, MultiPolygon::new(vec![p]))),
            Some(Geometry::MultiPolygon(mp)) => area = Some(merge_area(area, mp)),
            _ => {}
        }
    }

    let merged = if let Some(area) = area {
        Some(Geometry::MultiPolygon(area))
    } else if !lines.is_empty() {
        Some(Geometry::MultiLineString(MultiLineString::new(lines)))
    } else if !points.is_empty() {
        Some(Geometry::MultiPoint(MultiPoint::new(points)))
    } else {
        None
    };

    Ok(merged)
}

fn merge_area(acc: Option<MultiPolygon<f64>>, next: MultiPolygon<f64>) -> MultiPolygon<f64> {
    match acc {
        Some(acc) => acc.union(&next),
        None => next,
    }
}

// -- Tests -------------------------------------------------------------------
