pub mod enrich;
pub mod fips;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Datelike, Local};

pub use enrich::enrich;
pub use fips::fips;

pub fn make_output_file_name(input: &Path) -> Result<PathBuf> {
    let today = Local::now();
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "features".to_string());
    let file_name = format!(
        "county-weather-{}-{}-{:02}-{:02}.shp",
        stem,
        today.year(),
        today.month(),
        today.day()
    );

    let home = dirs::home_dir().context("Could not locate home directory")?;

    Ok(home.join(file_name))
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn should_make_output_file_name() {
        let path = make_output_file_name(Path::new("/data/parcels.shp")).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();

        assert!(name.starts_with("county-weather-parcels-"));
        assert!(name.ends_with(".shp"));
    }
}
