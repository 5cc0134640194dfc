//! The enrichment pipeline: intersect, fetch, write back, dissolve.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::ValueEnum;
use tempfile::TempDir;
use tracing::{info, warn};

use crate::{
    cli::{create_progress_bar, create_spinner},
    dates::DateRange,
    enrich::{dissolve_stats, write_summaries},
    fips::unique_codes,
    geoprocess::{dissolve, intersect, join_field},
    layer::{FeatureLayer, GeometryKind},
    weather::{collect, FetchOptions, ObservationSource, SummaryTable},
};

/// When to roll piece statistics back up to the source features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DissolveMode {
    /// Dissolve line and polygon inputs, leave points as they are
    Auto,
    Always,
    Never,
}

impl DissolveMode {
    fn applies_to(&self, kind: Option<GeometryKind>) -> bool {
        match self {
            DissolveMode::Auto => matches!(kind, Some(GeometryKind::Line | GeometryKind::Polygon)),
            DissolveMode::Always => true,
            DissolveMode::Never => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input: PathBuf,
    pub counties: PathBuf,
    pub fips_field: String,
    pub output: PathBuf,
    pub range: DateRange,
    pub fetch: FetchOptions,
    pub dissolve: DissolveMode,
}

/// Directory holding the scratch layers of one run.
///
/// A temporary workspace is deleted when dropped; a persistent one is kept
/// for inspection.
pub struct Workspace {
    root: PathBuf,
    _temp: Option<TempDir>,
}

impl Workspace {
    pub fn temporary() -> Result<Self> {
        let temp = TempDir::new().context("Failed to create scratch directory")?;

        Ok(Workspace {
            root: temp.path().to_path_buf(),
            _temp: Some(temp),
        })
    }

    pub fn persistent(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create scratch directory {}", dir.display()))?;

        Ok(Workspace {
            root: dir.to_path_buf(),
            _temp: None,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Input features intersected with counties, carrying the summaries.
    pub fn with_fips_path(&self) -> PathBuf {
        self.root.join("ShapeWithFips.shp")
    }

    /// Summaries dissolved back to one row per input feature.
    pub fn dissolved_path(&self) -> PathBuf {
        self.root.join("FipsDissolved.shp")
    }
}

/// What a run did.
#[derive(Debug, Default)]
pub struct RunReport {
    pub features: usize,
    pub pieces: usize,
    pub counties_requested: usize,
    pub counties_summarised: usize,
    pub failures: BTreeMap<&'static str, usize>,
    pub dissolved: bool,
    pub output: PathBuf,
}

pub struct Pipeline<'a, S> {
    config: &'a PipelineConfig,
    workspace: &'a Workspace,
    source: S,
}

impl<'a, S: ObservationSource> Pipeline<'a, S> {
    pub fn new(config: &'a PipelineConfig, workspace: &'a Workspace, source: S) -> Self {
        Pipeline {
            config,
            workspace,
            source,
        }
    }

    pub async fn run(&self) -> Result<RunReport> {
        let config = self.config;
        let mut report = RunReport::default();

        let bar = create_spinner("Obtaining FIPS codes...".to_string());
        let input = FeatureLayer::open(&config.input)?;
        let counties = FeatureLayer::open(&config.counties)?;
        let mut intersection = intersect(&input, &config.input, &counties, &config.fips_field)?;
        bar.finish_with_message("FIPS codes obtained");
        if intersection.layer.is_empty() {
            warn!(input = %config.input.display(), "No input features fall within the counties layer");
        }
        report.features = input.len();
        report.pieces = intersection.layer.len();

        let codes = unique_codes(&intersection.layer, &intersection.fips_field)?;
        report.counties_requested = codes.len();
        info!(counties = codes.len(), range = %config.range, "Fetching weather data from NOAA");

        let bar = create_progress_bar(codes.len() as u64, "Fetching weather data...".to_string());
        let outcomes = collect(&self.source, &codes, &config.range, config.fetch, &bar).await;
        bar.finish_with_message("Weather data fetched");

        let mut table = SummaryTable::new();
        for (fips, outcome) in outcomes {
            match outcome {
                Ok(summary) => {
                    table.insert(fips, summary);
                }
                Err(e) => {
                    warn!(%fips, reason = e.kind(), "Failed to obtain data: {}", e);
                    *report.failures.entry(e.kind()).or_default() += 1;
                }
            }
        }
        report.counties_summarised = table.len();

        write_summaries(&mut intersection.layer, &intersection.fips_field, &table)?;
        intersection.layer.save(&self.workspace.with_fips_path())?;

        report.dissolved = config.dissolve.applies_to(input.geometry_kind());
        if report.dissolved {
            let bar = create_spinner("Adding fields...".to_string());
            let stats = dissolve_stats();
            let dissolved = dissolve(&intersection.layer, &intersection.source_id_field, &stats)?;
            dissolved.save(&self.workspace.dissolved_path())?;

            let fields: Vec<String> = stats.iter().map(|s| s.output_name()).collect();
            let mut output = input;
            join_field(&mut output, &dissolved, &intersection.source_id_field, &fields)?;
            output.save(&config.output)?;
            bar.finish_with_message("Fields added");
        } else {
            intersection.layer.save(&config.output)?;
        }

        report.output = config.output.clone();
        info!(
            output = %report.output.display(),
            summarised = report.counties_summarised,
            requested = report.counties_requested,
            "Enrichment complete"
        );

        Ok(report)
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use std::time::Duration;

    use geo::polygon;
    use shapefile::{
        dbase::{FieldValue, Record},
        Point, Shape,
    };

    use super::*;
    use crate::{
        geoprocess::{convert::to_shape, intersect::test::counties_fixture},
        layer::{FieldDef, FieldKind},
        weather::{collect::test::range, collect::test::FakeSource, Element},
    };

    fn config(dir: &Path, input: &str, dissolve: DissolveMode) -> PipelineConfig {
        PipelineConfig {
            input: dir.join(input),
            counties: dir.join("UScounties.shp"),
            fips_field: "FIPS".to_string(),
            output: dir.join("WeatherData.shp"),
            range: range(),
            fetch: FetchOptions {
                delay: Duration::ZERO,
                concurrency: 1,
            },
            dissolve,
        }
    }

    fn write_points(path: &Path, coords: &[(f64, f64)]) {
        let mut layer = FeatureLayer::new(vec![FieldDef::new(
            "NAME",
            FieldKind::Character { length: 10 },
        )]);
        for (i, (x, y)) in coords.iter().enumerate() {
            let mut record = Record::default();
            record.insert("NAME".to_string(), FieldValue::Character(Some(format!("site{}", i))));
            layer.push(Shape::Point(Point::new(*x, *y)), record);
        }
        layer.save(path).unwrap();
    }

    fn scenario_source() -> FakeSource {
        FakeSource::default()
            .with("12345", Element::Prcp, &[10.0, 20.0])
            .with("12345", Element::Tmax, &[250.0, 300.0])
            .with("12345", Element::Tmin, &[-10.0, 5.0])
            .with("12345", Element::Snow, &[0.0, 0.0])
    }

    fn float(layer: &FeatureLayer, row: usize, field: &str) -> Option<f64> {
        crate::layer::value_as_f64(layer.features()[row].record.get(field)?)
    }

    #[tokio::test]
    async fn should_enrich_points_in_one_county() {
        let dir = TempDir::new().unwrap();
        counties_fixture().save(&dir.path().join("UScounties.shp")).unwrap();
        write_points(&dir.path().join("sites.shp"), &[(2.0, 2.0), (7.0, 3.0)]);

        let config = config(dir.path(), "sites.shp", DissolveMode::Auto);
        let workspace = Workspace::persistent(&dir.path().join("scratch")).unwrap();
        let source = scenario_source();
        let pipeline = Pipeline::new(&config, &workspace, source);

        let report = pipeline.run().await.unwrap();

        assert_eq!(pipeline.source.calls(), 1);
        assert_eq!(report.features, 2);
        assert_eq!(report.counties_requested, 1);
        assert_eq!(report.counties_summarised, 1);
        assert!(!report.dissolved);
        assert!(workspace.with_fips_path().exists());

        let output = FeatureLayer::open(&config.output).unwrap();
        assert_eq!(output.len(), 2);
        for row in 0..2 {
            assert_eq!(float(&output, row, "AvgPrecip"), Some(15.0));
            assert_eq!(float(&output, row, "MaxTemp"), Some(300.0));
            assert_eq!(float(&output, row, "MinTemp"), Some(-10.0));
            assert_eq!(float(&output, row, "AvgSnow"), Some(0.0));
        }
    }

    #[tokio::test]
    async fn should_request_each_county_once_and_skip_failures() {
        let dir = TempDir::new().unwrap();
        counties_fixture().save(&dir.path().join("UScounties.shp")).unwrap();
        write_points(
            &dir.path().join("sites.shp"),
            &[(1.0, 1.0), (2.0, 2.0), (3.0, 3.0), (12.0, 1.0), (13.0, 2.0)],
        );

        let config = config(dir.path(), "sites.shp", DissolveMode::Never);
        let workspace = Workspace::temporary().unwrap();
        let pipeline = Pipeline::new(&config, &workspace, scenario_source());

        let report = pipeline.run().await.unwrap();

        assert_eq!(pipeline.source.calls(), 2);
        assert_eq!(report.counties_summarised, 1);
        assert_eq!(report.failures.get("no-observations"), Some(&1));

        let output = FeatureLayer::open(&config.output).unwrap();
        assert_eq!(float(&output, 0, "AvgPrecip"), Some(15.0));
        assert_eq!(float(&output, 3, "AvgPrecip"), None);
        assert_eq!(float(&output, 4, "MaxTemp"), None);
    }

    #[tokio::test]
    async fn should_dissolve_polygons_onto_source_features() {
        let dir = TempDir::new().unwrap();
        counties_fixture().save(&dir.path().join("UScounties.shp")).unwrap();

        let straddling = polygon![(x: 5.0, y: 2.0), (x: 5.0, y: 4.0), (x: 15.0, y: 4.0), (x: 15.0, y: 2.0)];
        let inside = polygon![(x: 1.0, y: 1.0), (x: 1.0, y: 2.0), (x: 2.0, y: 2.0), (x: 2.0, y: 1.0)];
        let mut parcels = FeatureLayer::new(vec![FieldDef::new("ID", FieldKind::Numeric { length: 4, decimals: 0 })]);
        for (id, polygon) in [(7.0, straddling), (8.0, inside)] {
            let mut record = Record::default();
            record.insert("ID".to_string(), FieldValue::Numeric(Some(id)));
            parcels.push(to_shape(&geo::Geometry::Polygon(polygon)).unwrap(), record);
        }
        parcels.save(&dir.path().join("parcels.shp")).unwrap();

        let source = scenario_source().with("12347", Element::Prcp, &[5.0]);
        let config = config(dir.path(), "parcels.shp", DissolveMode::Auto);
        let workspace = Workspace::temporary().unwrap();
        let pipeline = Pipeline::new(&config, &workspace, source);

        let report = pipeline.run().await.unwrap();

        assert!(report.dissolved);
        assert_eq!(report.pieces, 3);
        assert!(workspace.dissolved_path().exists());

        let output = FeatureLayer::open(&config.output).unwrap();
        assert_eq!(output.len(), 2);
        assert_eq!(
            output.features()[0].record.get("ID"),
            Some(&FieldValue::Numeric(Some(7.0)))
        );
        assert_eq!(float(&output, 0, "MEAN_AvgPr"), Some(10.0));
        assert_eq!(float(&output, 0, "MAX_MaxTem"), Some(300.0));
        assert_eq!(float(&output, 0, "MIN_MinTem"), Some(-10.0));
        assert_eq!(float(&output, 1, "MEAN_AvgPr"), Some(15.0));
        assert_eq!(float(&output, 1, "MEAN_AvgSn"), Some(0.0));
    }

    #[test]
    fn should_choose_dissolve_by_geometry() {
        assert!(!DissolveMode::Auto.applies_to(Some(GeometryKind::Point)));
        assert!(DissolveMode::Auto.applies_to(Some(GeometryKind::Line)));
        assert!(DissolveMode::Auto.applies_to(Some(GeometryKind::Polygon)));
        assert!(DissolveMode::Always.applies_to(Some(GeometryKind::Point)));
        assert!(!DissolveMode::Never.applies_to(Some(GeometryKind::Polygon)));
    }

    #[test]
    fn should_remove_temporary_workspace_on_drop() {
        let workspace = Workspace::temporary().unwrap();
        let root = workspace.root().to_path_buf();
        assert!(root.exists());

        drop(workspace);
        assert!(!root.exists());
    }
}
