//! Writes county summaries onto feature rows.

use anyhow::Result;
use shapefile::dbase::FieldValue;
use tracing::info;

use crate::{
    fips::FipsCode,
    geoprocess::{StatField, Statistic},
    layer::{FeatureLayer, FieldDef, FieldKind},
    weather::{CountySummary, SummaryTable},
};

pub const AVG_PRECIP: &str = "AvgPrecip";
pub const MAX_TEMP: &str = "MaxTemp";
pub const MIN_TEMP: &str = "MinTemp";
pub const AVG_SNOW: &str = "AvgSnow";

const SUMMARY_KIND: FieldKind = FieldKind::Float {
    length: 19,
    decimals: 8,
};

/// Field names paired with the summary value they hold.
fn columns(summary: &CountySummary) -> [(&'static str, Option<f64>); 4] {
    [
        (AVG_PRECIP, summary.avg_precip),
        (MAX_TEMP, summary.max_temp),
        (MIN_TEMP, summary.min_temp),
        (AVG_SNOW, summary.avg_snow),
    ]
}

/// How each summary field rolls up when pieces are dissolved back onto
/// their source feature.
pub fn dissolve_stats() -> Vec<StatField> {
    vec![
        StatField::new(AVG_PRECIP, Statistic::Mean),
        StatField::new(MAX_TEMP, Statistic::Max),
        StatField::new(MIN_TEMP, Statistic::Min),
        StatField::new(AVG_SNOW, Statistic::Mean),
    ]
}

/// Adds the summary fields if absent and overwrites them on every row whose
/// FIPS code has a summary. Rows without one, and metrics without data, are
/// left as they are. Returns the number of rows updated.
pub fn write_summaries(layer: &mut FeatureLayer, fips_field: &str, table: &SummaryTable) -> Result<usize> {
    for name in [AVG_PRECIP, MAX_TEMP, MIN_TEMP, AVG_SNOW] {
        layer.add_field(FieldDef::new(name, SUMMARY_KIND))?;
    }

    let mut updated = 0;
    layer.update_rows(|record| {
        let summary = record
            .get(fips_field)
            .and_then(FipsCode::from_value)
            .and_then(|code| table.get(&code));

        if let Some(summary) = summary {
            for (name, value) in columns(summary) {
                if let Some(value) = value {
                    record.insert(name.to_string(), FieldValue::Float(Some(value as f32)));
                }
            }
            updated += 1;
        }

        Ok(())
    })?;

    info!(updated, total = layer.len(), "Wrote weather summaries");

    Ok(updated)
}

// -- Tests -------------------------------------------------------------------
