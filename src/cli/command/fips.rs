use anyhow::Result;

use crate::{
    cli::{create_spinner, FipsArgs},
    fips::{unique_codes, FipsCode},
    geoprocess::intersect,
    layer::FeatureLayer,
};

/// Lists the counties the input falls in. Makes no network calls.
pub fn fips(args: &FipsArgs) -> Result<Vec<FipsCode>> {
    let bar = create_spinner("Obtaining FIPS codes...".to_string());
    let input = FeatureLayer::open(&args.input)?;
    let counties = FeatureLayer::open(&args.county.counties)?;
    let intersection = intersect(&input, &args.input, &counties, &args.county.fips_field)?;
    let codes = unique_codes(&intersection.layer, &intersection.fips_field)?;
    bar.finish_and_clear();

    Ok(codes)
}

// -- Tests -------------------------------------------------------------------
