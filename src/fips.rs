//! County FIPS codes.

use std::{collections::BTreeSet, fmt};

use anyhow::Result;
use shapefile::dbase::FieldValue;
use tracing::warn;

use crate::layer::FeatureLayer;

/// A five digit county FIPS code, e.g. `37183`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FipsCode(String);

impl FipsCode {
    /// Normalises a stored code. Surrounding whitespace is dropped and short
    /// numeric codes are zero padded, so `" 1001"` and `"01001"` are equal.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() || s.len() > 5 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        Some(FipsCode(format!("{:0>5}", s)))
    }

    /// Reads a code from a text or numeric attribute.
    pub fn from_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Character(Some(s)) => Self::parse(s),
            FieldValue::Numeric(Some(n)) if n.fract() == 0.0 && *n >= 0.0 => {
                Self::parse(&format!("{}", *n as u64))
            }
            FieldValue::Integer(n) if *n >= 0 => Self::parse(&n.to_string()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FipsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique FIPS codes of a layer, ascending.
pub fn unique_codes(layer: &FeatureLayer, field: &str) -> Result<Vec<FipsCode>> {
    let mut codes = BTreeSet::new();
    let mut invalid = 0;

    for value in layer.values(field)? {
        match FipsCode::from_value(value) {
            Some(code) => {
                codes.insert(code);
            }
            None => invalid += 1,
        }
    }

    if invalid > 0 {
        warn!(field, invalid, "Rows without a usable FIPS code were skipped");
    }

    Ok(codes.into_iter().collect())
}

// -- Tests -------------------------------------------------------------------
