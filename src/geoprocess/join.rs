//! Attribute join by key.

use std::collections::HashMap;

use anyhow::{Context, Result};
use tracing::debug;

use crate::layer::FeatureLayer;

use super::dissolve::GroupKey;

/// Copies `fields` from `source` onto the `target` rows whose FID (row
/// position) equals the `source_key` value.
///
/// Target rows with no match keep the fields unset. When several source rows
/// share a key the first one wins. Returns the number of matched rows.
pub fn join_field(
    target: &mut FeatureLayer,
    source: &FeatureLayer,
    source_key: &str,
    fields: &[String],
) -> Result<usize> {
    let mut defs = Vec::with_capacity(fields.len());
    for name in fields {
        let def = source
            .field(name)
            .with_context(|| format!("Join source has no `{}` field", name))?;
        defs.push(def.clone());
    }
    source
        .field(source_key)
        .with_context(|| format!("Join source has no `{}` field", source_key))?;

    let mut lookup = HashMap::new();
    for feature in source.features() {
        if let Some(key) = feature.record.get(source_key).and_then(GroupKey::from_value) {
            lookup.entry(key).or_insert(&feature.record);
        }
    }

    for def in defs {
        target.add_field(def)?;
    }

    let mut fid = 0_i64;
    let mut matched = 0;
    target.update_rows(|record| {
        let key = GroupKey::Number(fid);
        fid += 1;

        if let Some(source_record) = lookup.get(&key) {
            for name in fields {
                if let Some(value) = source_record.get(name) {
                    record.insert(name.clone(), value.clone());
                }
            }
            matched += 1;
        }

        Ok(())
    })?;

    debug!(matched, fields = fields.len(), "Joined fields");

    Ok(matched)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use shapefile::{
        dbase::{FieldValue, Record},
        Point, Shape,
    };

    use super::*;
    use crate::layer::{FieldDef, FieldKind};

    fn target_fixture() -> FeatureLayer {
        let mut layer = FeatureLayer::new(vec![FieldDef::new(
            "NAME",
            FieldKind::Character { length: 8 },
        )]);
        for name in ["north", "south", "east"] {
            let mut record = Record::default();
            record.insert("NAME".to_string(), FieldValue::Character(Some(name.to_string())));
            layer.push(Shape::Point(Point::new(0.0, 0.0)), record);
        }

        layer
    }

    fn source_fixture() -> FeatureLayer {
        let mut layer = FeatureLayer::new(vec![
            FieldDef::new("FID_sites", FieldKind::ID),
            FieldDef::new("MEAN_AvgPr", FieldKind::Numeric { length: 19, decimals: 11 }),
        ]);
        for (fid, value) in [(2.0, 7.5), (0.0, 1.25)] {
            let mut record = Record::default();
            record.insert("FID_sites".to_string(), FieldValue::Numeric(Some(fid)));
            record.insert("MEAN_AvgPr".to_string(), FieldValue::Numeric(Some(value)));
            layer.push(Shape::Point(Point::new(0.0, 0.0)), record);
        }

        layer
    }

    #[test]
    fn should_join_on_fid() {
        let mut target = target_fixture();
        let fields = vec!["MEAN_AvgPr".to_string()];
        let matched = join_field(&mut target, &source_fixture(), "FID_sites", &fields).unwrap();

        assert_eq!(matched, 2);
        let values: Vec<&FieldValue> = target.values("MEAN_AvgPr").unwrap().collect();
        assert_eq!(
            values,
            vec![
                &FieldValue::Numeric(Some(1.25)),
                &FieldValue::Numeric(None),
                &FieldValue::Numeric(Some(7.5)),
            ]
        );
    }

    #[test]
    fn should_match_integral_float_keys() {
        let mut target = target_fixture();
        let mut source = source_fixture();
        let mut record = Record::default();
        record.insert("FID_sites".to_string(), FieldValue::Numeric(Some(1.0000000001)));
        record.insert("MEAN_AvgPr".to_string(), FieldValue::Numeric(Some(3.0)));
        source.push(Shape::Point(Point::new(0.0, 0.0)), record);

        let fields = vec!["MEAN_AvgPr".to_string()];
        let matched = join_field(&mut target, &source, "FID_sites", &fields).unwrap();

        assert_eq!(matched, 3);
        assert_eq!(
            target.features()[1].record.get("MEAN_AvgPr"),
            Some(&FieldValue::Numeric(Some(3.0)))
        );
    }

    #[test]
    fn should_fail_on_missing_source_field() {
        let mut target = target_fixture();
        let fields = vec!["MAX_MaxTem".to_string()];

        assert!(join_field(&mut target, &source_fixture(), "FID_sites", &fields).is_err());
    }
}
