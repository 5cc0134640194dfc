use std::time::Duration;

use anyhow::Result;

use crate::{
    cli::EnrichArgs,
    dates::DateRange,
    pipeline::{Pipeline, PipelineConfig, Workspace},
    weather::{ApiConfig, FetchOptions, NoaaClient},
};

use super::make_output_file_name;

pub async fn enrich(args: &EnrichArgs) -> Result<String> {
    let config = pipeline_config(args)?;
    let client = NoaaClient::new(api_config(args))?;

    let workspace = match &args.scratch_dir {
        Some(dir) => Workspace::persistent(dir)?,
        None => Workspace::temporary()?,
    };

    let report = Pipeline::new(&config, &workspace, client).run().await?;

    if !report.failures.is_empty() {
        println!(
            "No data for {} of {} counties",
            report.counties_requested - report.counties_summarised,
            report.counties_requested
        );
    }
    if args.scratch_dir.is_some() {
        println!("Scratch layers kept in `{}`", workspace.root().display());
    }

    Ok(report.output.to_string_lossy().to_string())
}

fn pipeline_config(args: &EnrichArgs) -> Result<PipelineConfig> {
    let output = match &args.output {
        Some(path) => path.clone(),
        None => make_output_file_name(&args.input)?,
    };

    Ok(PipelineConfig {
        input: args.input.clone(),
        counties: args.county.counties.clone(),
        fips_field: args.county.fips_field.clone(),
        output,
        range: DateRange::new(args.start, args.end)?,
        fetch: FetchOptions {
            delay: Duration::from_millis(args.delay_ms),
            concurrency: usize::from(args.concurrency),
        },
        dissolve: args.dissolve,
    })
}

fn api_config(args: &EnrichArgs) -> ApiConfig {
    ApiConfig {
        base_url: args.base_url.clone(),
        timeout: Duration::from_secs(args.timeout_secs),
        ..ApiConfig::new(&args.token)
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use clap::Parser;

    use super::*;
    use crate::cli::{Cli, Commands};

    fn args(extra: &[&str]) -> EnrichArgs {
        let mut argv = vec!["county-weather", "enrich", "roads.shp", "1/1/2019", "1/31/2019", "--token", "t0k"];
        argv.extend_from_slice(extra);

        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Enrich(args) => args,
            Commands::Fips(_) => panic!("expected enrich"),
        }
    }

    #[test]
    fn should_build_pipeline_config() {
        let config = pipeline_config(&args(&["--output", "out.shp", "--concurrency", "4"])).unwrap();

        assert_eq!(config.output.to_string_lossy(), "out.shp");
        assert_eq!(config.range.to_string(), "2019-01-01 to 2019-01-31");
        assert_eq!(config.fetch.concurrency, 4);
        assert_eq!(config.fetch.delay, Duration::from_millis(200));
    }

    #[test]
    fn should_reject_inverted_dates() {
        let mut args = args(&[]);
        std::mem::swap(&mut args.start, &mut args.end);

        assert!(pipeline_config(&args).is_err());
    }

    #[test]
    fn should_build_api_config() {
        let config = api_config(&args(&["--base-url", "http://localhost:9000/data", "--timeout-secs", "5"]));

        assert_eq!(config.base_url, "http://localhost:9000/data");
        assert_eq!(config.token, "t0k");
        assert_eq!(config.dataset, "GHCND");
        assert_eq!(config.limit, 1000);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}
