//! Read performance comparison of GeoPackage, FlatGeobuf and GeoParquet.
//!
//! Every query runs through the `duckdb` command line client with the
//! spatial extension. The run measures, per file:
//!
//! 1. size on disk, relative to the first file
//! 2. `count(*)` over the whole file
//! 3. a full CSV export with WKT geometry
//! 4. `min/max(height)` and `avg(height)`
//! 5. `ST_Intersects` filters over random boxes inside the first file's extent
//!
//! Zipped files are only measured for size. Missing files are reported and
//! skipped, and a query failing on one file does not stop the others.

mod error;
mod format;
mod report;
mod scenario;
pub mod sql;

pub use error::{BenchError, BenchResult};
pub use format::FileFormat;
pub use report::{
    megabytes, percent_smaller, BboxTiming, BenchReport, ExportTiming, QueryTiming, SizeRow,
};
pub use scenario::{generate as generate_scenarios, Extent, Scenario, TimingStats};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::command::CommandRunner;
use crate::config::BenchmarkConfig;
use sql::{
    avg_sql, bbox_count_sql, columns_from_rows, count_sql, csv_export_sql, describe_sql,
    extent_sql, field_f64, geometry_column, min_max_sql, DuckDb, Row,
};

/// Attribute read by the attribute access test.
pub const ATTRIBUTE_COLUMN: &str = "height";

/// Name of the temporary CSV export.
const EXPORT_FILE_NAME: &str = "benchmark.csv";

/// A file that DuckDB can query.
#[derive(Debug, Clone)]
struct Target {
    name: String,
    path: PathBuf,
    source: String,
    geometry: Option<String>,
}

/// Runs the benchmark over the configured files.
pub struct Benchmark<'a> {
    db: DuckDb<'a>,
    config: &'a BenchmarkConfig,
}

impl<'a> Benchmark<'a> {
    pub fn new(runner: &'a dyn CommandRunner, duckdb: &'a str, config: &'a BenchmarkConfig) -> Self {
        Self {
            db: DuckDb::new(runner, duckdb),
            config,
        }
    }

    /// Run every test and collect the results.
    pub fn run(&self) -> BenchReport {
        let mut report = BenchReport {
            sizes: size_rows(&self.config.files),
            ..Default::default()
        };

        let mut targets = self.targets(&mut report);
        if targets.is_empty() {
            report.bbox_skipped = Some("Reference file missing".to_string());
            return report;
        }

        // Installing is not part of any measured query.
        if let Err(e) = self.db.install_spatial() {
            report.errors.push(("duckdb".to_string(), e.to_string()));
            return report;
        }

        info!("Counting all rows...");
        for t in &targets {
            match self.timed(&count_sql(&t.source)) {
                Ok((elapsed, _)) => report.counts.push(QueryTiming {
                    name: t.name.clone(),
                    elapsed,
                }),
                Err(e) => report.errors.push((t.name.clone(), e.to_string())),
            }
        }

        for t in targets.iter_mut() {
            match self.geometry_of(&t.path, &t.source) {
                Ok(column) => t.geometry = Some(column),
                Err(e) => report.errors.push((t.name.clone(), e.to_string())),
            }
        }

        info!("Exporting every file as CSV...");
        for t in &targets {
            let Some(geometry) = &t.geometry else { continue };
            match self.export_csv(&t.source, geometry) {
                Ok((elapsed, bytes)) => report.exports.push(ExportTiming {
                    name: t.name.clone(),
                    elapsed,
                    csv_mb: megabytes(bytes),
                }),
                Err(e) => report.errors.push((t.name.clone(), e.to_string())),
            }
        }

        info!("Reading the {} attribute...", ATTRIBUTE_COLUMN);
        for t in &targets {
            match self.timed(&min_max_sql(&t.source, ATTRIBUTE_COLUMN)) {
                Ok((elapsed, _)) => report.min_max.push(QueryTiming {
                    name: t.name.clone(),
                    elapsed,
                }),
                Err(e) => report.errors.push((t.name.clone(), e.to_string())),
            }
        }
        for t in &targets {
            match self.timed(&avg_sql(&t.source, ATTRIBUTE_COLUMN)) {
                Ok((elapsed, _)) => report.averages.push(QueryTiming {
                    name: t.name.clone(),
                    elapsed,
                }),
                Err(e) => report.errors.push((t.name.clone(), e.to_string())),
            }
        }

        info!("Filtering by bounding box...");
        self.bbox_tests(&targets, &mut report);
        report
    }

    /// Existing, queryable files; the rest are noted in the report.
    fn targets(&self, report: &mut BenchReport) -> Vec<Target> {
        let mut targets = Vec::new();
        for (name, path) in &self.config.files {
            if !path.exists() {
                continue;
            }
            let format = match FileFormat::from_path(path) {
                Ok(format) => format,
                Err(e) => {
                    report.errors.push((name.clone(), e.to_string()));
                    continue;
                }
            };
            if let Some(source) = format.source_expr(path) {
                targets.push(Target {
                    name: name.clone(),
                    path: path.clone(),
                    source,
                    geometry: None,
                });
            }
        }
        targets
    }

    fn timed(&self, sql: &str) -> BenchResult<(Duration, Vec<Row>)> {
        let start = Instant::now();
        let rows = self.db.query(sql)?;
        Ok((start.elapsed(), rows))
    }

    fn geometry_of(&self, path: &Path, source: &str) -> BenchResult<String> {
        let rows = self.db.query(&describe_sql(source))?;
        geometry_column(&columns_from_rows(&rows), path)
    }

    /// Time the export, then delete the CSV once its size is known.
    fn export_csv(&self, source: &str, geometry: &str) -> BenchResult<(Duration, u64)> {
        let output = self.config.export_dir.join(EXPORT_FILE_NAME);
        let start = Instant::now();
        self.db.execute(&csv_export_sql(source, geometry, &output))?;
        let elapsed = start.elapsed();

        let bytes = fs::metadata(&output)
            .map(|m| m.len())
            .map_err(|e| BenchError::Io {
                path: output.clone(),
                source: e,
            })?;
        if let Err(e) = fs::remove_file(&output) {
            warn!(path = %output.display(), error = %e, "failed to remove CSV export");
        }
        Ok((elapsed, bytes))
    }

    fn bbox_tests(&self, targets: &[Target], report: &mut BenchReport) {
        let reference = self
            .config
            .files
            .first()
            .and_then(|(_, path)| targets.iter().find(|t| &t.path == path));
        let Some(reference) = reference else {
            report.bbox_skipped = Some("Reference file missing".to_string());
            return;
        };
        let Some(geometry) = &reference.geometry else {
            report.bbox_skipped = Some(format!("Reference file {} has no geometry column", reference.name));
            return;
        };

        let extent = match self.extent(&reference.source, geometry) {
            Ok(extent) => extent,
            Err(e) => {
                report.bbox_skipped = Some(format!("Could not read the reference extent: {}", e));
                return;
            }
        };

        let seed = self.config.seed.unwrap_or_else(rand::random);
        let scenarios = scenario::generate(extent, &self.config.bbox_sizes, self.config.iterations, seed);
        report.scenario_count = scenarios.iter().map(|s| s.boxes.len()).sum();
        info!(seed, scenarios = report.scenario_count, "Generated test scenarios.");

        for t in targets {
            let Some(geometry) = &t.geometry else { continue };
            for scenario in &scenarios {
                match self.time_boxes(&t.source, geometry, scenario) {
                    Ok(Some(stats)) => report.bbox.push(BboxTiming {
                        name: t.name.clone(),
                        size: scenario.size,
                        stats,
                    }),
                    Ok(None) => {}
                    Err(e) => {
                        report.errors.push((t.name.clone(), e.to_string()));
                        break;
                    }
                }
            }
        }
    }

    fn extent(&self, source: &str, geometry: &str) -> BenchResult<Extent> {
        let sql = extent_sql(source, geometry);
        let rows = self.db.query(&sql)?;
        let value = |key: &str| field_f64(&rows, key).ok_or_else(|| BenchError::EmptyResult(sql.clone()));
        Ok(Extent::new(value("minx")?, value("miny")?, value("maxx")?, value("maxy")?))
    }

    fn time_boxes(&self, source: &str, geometry: &str, scenario: &Scenario) -> BenchResult<Option<TimingStats>> {
        let mut samples = Vec::with_capacity(scenario.boxes.len());
        for bbox in &scenario.boxes {
            let (elapsed, _) = self.timed(&bbox_count_sql(source, geometry, bbox.as_array()))?;
            samples.push(elapsed);
        }
        Ok(TimingStats::from_samples(&samples))
    }
}

/// Size of every file relative to the first one.
pub fn size_rows(files: &[(String, PathBuf)]) -> Vec<SizeRow> {
    let sizes: Vec<Option<f64>> = files
        .iter()
        .map(|(_, path)| fs::metadata(path).ok().map(|m| megabytes(m.len())))
        .collect();
    let baseline = sizes.first().copied().flatten();

    files
        .iter()
        .zip(&sizes)
        .enumerate()
        .map(|(i, ((name, _), size))| SizeRow {
            name: name.clone(),
            size_mb: *size,
            percent_smaller: match (i, baseline, size) {
                (0, _, _) => None,
                (_, Some(base), Some(size)) => percent_smaller(base, *size),
                _ => None,
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::RecordingRunner;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_bytes(path: &Path, len: usize) {
        let mut file = fs::File::create(path).unwrap();
        file.write_all(&vec![0u8; len]).unwrap();
    }

    #[test]
    fn test_size_rows_relative_to_first_entry() {
        let temp = TempDir::new().unwrap();
        let gpkg = temp.path().join("a.gpkg");
        let parquet = temp.path().join("a.parquet");
        write_bytes(&gpkg, 1000);
        write_bytes(&parquet, 400);

        let rows = size_rows(&[
            ("gpkg".to_string(), gpkg),
            ("parquet".to_string(), parquet),
            ("missing".to_string(), temp.path().join("nope.fgb")),
        ]);

        assert_eq!(rows[0].percent_smaller, None);
        assert_eq!(rows[1].percent_smaller, Some(60.0));
        assert_eq!(rows[2].size_mb, None);
    }

    #[test]
    fn test_missing_reference_skips_bbox() {
        let temp = TempDir::new().unwrap();
        let parquet = temp.path().join("a.parquet");
        write_bytes(&parquet, 10);

        let config = BenchmarkConfig {
            files: vec![
                ("gpkg".to_string(), temp.path().join("missing.gpkg")),
                ("parquet".to_string(), parquet),
            ],
            export_dir: temp.path().to_path_buf(),
            ..Default::default()
        };
        let runner = RecordingRunner::new()
            .with_stdout(r#"[{"column_name":"geometry","column_type":"GEOMETRY","count_star()":3}]"#);

        let report = Benchmark::new(&runner, "duckdb", &config).run();

        assert_eq!(report.bbox_skipped.as_deref(), Some("Reference file missing"));
        assert_eq!(report.counts.len(), 1);
        assert_eq!(report.min_max.len(), 1);
        assert_eq!(report.averages.len(), 1);
        // The recording runner writes no CSV, so the export is reported as an error.
        assert!(report.exports.is_empty());
        assert_eq!(report.errors.len(), 1);
        assert!(runner.recorded().iter().all(|c| c.program() == "duckdb"));
    }

    #[test]
    fn test_spatial_is_installed_once_before_timed_queries() {
        let temp = TempDir::new().unwrap();
        let parquet = temp.path().join("a.parquet");
        write_bytes(&parquet, 10);

        let config = BenchmarkConfig {
            files: vec![("parquet".to_string(), parquet)],
            export_dir: temp.path().to_path_buf(),
            ..Default::default()
        };
        let runner = RecordingRunner::new()
            .with_stdout(r#"[{"column_name":"geometry","column_type":"GEOMETRY"}]"#);

        Benchmark::new(&runner, "duckdb", &config).run();

        let commands: Vec<String> = runner.recorded().iter().map(|c| c.to_string()).collect();
        assert!(commands[0].contains("INSTALL spatial;"));
        assert_eq!(commands.iter().filter(|c| c.contains("INSTALL")).count(), 1);
        assert!(commands[1..].iter().all(|c| c.contains("LOAD spatial;")));
    }

    #[test]
    fn test_failed_install_stops_the_run() {
        let temp = TempDir::new().unwrap();
        let parquet = temp.path().join("a.parquet");
        write_bytes(&parquet, 10);

        let config = BenchmarkConfig {
            files: vec![("parquet".to_string(), parquet)],
            export_dir: temp.path().to_path_buf(),
            ..Default::default()
        };
        let runner = RecordingRunner::new().failing("duckdb");

        let report = Benchmark::new(&runner, "duckdb", &config).run();

        assert_eq!(runner.count(), 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].0, "duckdb");
        assert!(report.counts.is_empty());
    }

    #[test]
    fn test_zip_is_size_only() {
        let temp = TempDir::new().unwrap();
        let zip = temp.path().join("a.zip");
        write_bytes(&zip, 10);

        let config = BenchmarkConfig {
            files: vec![("zipped".to_string(), zip)],
            export_dir: temp.path().to_path_buf(),
            ..Default::default()
        };
        let runner = RecordingRunner::new();

        let report = Benchmark::new(&runner, "duckdb", &config).run();

        assert_eq!(runner.count(), 0);
        assert!(report.sizes[0].size_mb.is_some());
        assert_eq!(report.bbox_skipped.as_deref(), Some("Reference file missing"));
    }

    #[test]
    fn test_bbox_runs_same_boxes_against_every_file() {
        let temp = TempDir::new().unwrap();
        let gpkg = temp.path().join("a.gpkg");
        let parquet = temp.path().join("a.parquet");
        write_bytes(&gpkg, 10);
        write_bytes(&parquet, 10);

        let config = BenchmarkConfig {
            files: vec![("gpkg".to_string(), gpkg), ("parquet".to_string(), parquet)],
            bbox_sizes: vec![500.0, 5000.0],
            iterations: 3,
            seed: Some(42),
            export_dir: temp.path().to_path_buf(),
        };
        let runner = RecordingRunner::new().with_stdout(
            r#"[{"column_name":"geom","column_type":"GEOMETRY","minx":0,"miny":0,"maxx":100000,"maxy":100000}]"#,
        );

        let report = Benchmark::new(&runner, "duckdb", &config).run();

        assert!(report.bbox_skipped.is_none());
        assert_eq!(report.scenario_count, 6);
        assert_eq!(report.bbox.len(), 4);

        let envelopes: Vec<String> = runner
            .recorded()
            .iter()
            .map(|c| c.to_string())
            .filter(|s| s.contains("ST_MakeEnvelope"))
            .map(|s| s[s.find("ST_MakeEnvelope").unwrap()..].to_string())
            .collect();
        assert_eq!(envelopes.len(), 12);
        assert_eq!(envelopes[..6], envelopes[6..]);
    }
}
