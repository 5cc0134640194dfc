//! Command line interface.

pub mod command;

use std::{path::PathBuf, time::Duration};

use chrono::NaiveDate;
use clap::{command, Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::{dates, pipeline::DissolveMode, weather::noaa::DEFAULT_BASE_URL};

#[derive(Parser)]
#[command(version, about, long_about = None)]
/// Contains the commands
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add county weather summaries to a shapefile
    Enrich(EnrichArgs),
    /// List the county FIPS codes a shapefile falls in
    Fips(FipsArgs),
}

/// Where the counties come from.
#[derive(Args, Debug, Clone)]
pub struct CountyArgs {
    /// US counties shapefile
    #[arg(long, default_value = "data/UScounties.shp")]
    pub counties: PathBuf,

    /// County field holding the FIPS code
    #[arg(long, default_value = "FIPS")]
    pub fips_field: String,
}

#[derive(Args, Debug, Clone)]
pub struct EnrichArgs {
    /// Shapefile to enrich
    pub input: PathBuf,

    /// First day of the range, M/D/YYYY
    #[arg(value_parser = dates::parse_arg)]
    pub start: NaiveDate,

    /// Last day of the range, M/D/YYYY
    #[arg(value_parser = dates::parse_arg)]
    pub end: NaiveDate,

    #[command(flatten)]
    pub county: CountyArgs,

    /// Output shapefile [default: ~/county-weather-<input>-<today>.shp]
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Keep scratch layers in this directory instead of a temporary one
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,

    /// Roll statistics back up to the input features
    #[arg(long, value_enum, default_value_t = DissolveMode::Auto)]
    pub dissolve: DissolveMode,

    /// CDO web services token
    #[arg(long, env = "NOAA_TOKEN", hide_env_values = true)]
    pub token: String,

    /// CDO data endpoint
    #[arg(long, env = "NOAA_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Minimum milliseconds between requests
    #[arg(long, default_value_t = 200)]
    pub delay_ms: u64,

    /// Requests in flight at once
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub concurrency: u16,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,
}

#[derive(Args, Debug, Clone)]
pub struct FipsArgs {
    /// Shapefile to look up
    pub input: PathBuf,

    #[command(flatten)]
    pub county: CountyArgs,
}

/// Creates a spinner.
pub fn create_spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner().with_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));

    bar
}

/// Creates a progress bar.
pub fn create_progress_bar(size: u64, message: String) -> ProgressBar {
    ProgressBar::new(size).with_message(message).with_style(
        ProgressStyle::with_template("[{eta_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .expect("progress template is valid")
            .progress_chars("##-"),
    )
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn should_validate_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn should_parse_enrich_arguments() {
        let cli = Cli::try_parse_from([
            "county-weather",
            "enrich",
            "parcels.shp",
            "3/4/2020",
            "12/25/2020",
            "--token",
            "abc",
            "--dissolve",
            "never",
        ])
        .unwrap();

        let Commands::Enrich(args) = cli.command else {
            panic!("expected enrich");
        };
        assert_eq!(args.input, PathBuf::from("parcels.shp"));
        assert_eq!(args.start, NaiveDate::from_ymd_opt(2020, 3, 4).unwrap());
        assert_eq!(args.end, NaiveDate::from_ymd_opt(2020, 12, 25).unwrap());
        assert_eq!(args.dissolve, DissolveMode::Never);
        assert_eq!(args.county.fips_field, "FIPS");
        assert_eq!(args.delay_ms, 200);
        assert_eq!(args.concurrency, 1);
    }

    #[test]
    fn should_reject_bad_dates() {
        let result = Cli::try_parse_from([
            "county-weather",
            "enrich",
            "parcels.shp",
            "March 4",
            "12/25/2020",
            "--token",
            "abc",
        ]);

        assert!(result.is_err());
    }

    #[test]
    fn should_parse_fips_arguments() {
        let cli = Cli::try_parse_from([
            "county-weather",
            "fips",
            "roads.shp",
            "--counties",
            "/gis/counties.shp",
        ])
        .unwrap();

        let Commands::Fips(args) = cli.command else {
            panic!("expected fips");
        };
        assert_eq!(args.county.counties, PathBuf::from("/gis/counties.shp"));
    }
}
