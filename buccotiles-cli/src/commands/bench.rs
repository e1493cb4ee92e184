//! Format benchmark and GeoParquet conversion commands.

use std::path::{Path, PathBuf};

use buccotiles::bench::Benchmark;
use buccotiles::command::ShellRunner;
use buccotiles::config::{parse_named_file, BenchmarkConfig};
use buccotiles::convert::gpkg_to_geoparquet;
use buccotiles::country::bare_stem;

use crate::context::CliContext;
use crate::error::CliError;

/// Arguments for the bench command.
pub struct BenchArgs {
    /// `name=path` entries replacing the configured file list.
    pub files: Vec<String>,
    pub bbox_sizes: Vec<f64>,
    pub iterations: Option<usize>,
    pub seed: Option<u64>,
}

impl BenchArgs {
    /// Benchmark settings from config.ini with these arguments applied.
    pub fn resolve(&self, base: &BenchmarkConfig) -> Result<BenchmarkConfig, CliError> {
        let mut config = base.clone();
        if !self.files.is_empty() {
            config.files = self
                .files
                .iter()
                .map(|entry| parse_named_file(entry))
                .collect::<Result<_, _>>()?;
        }
        if !self.bbox_sizes.is_empty() {
            config.bbox_sizes = self.bbox_sizes.clone();
        }
        if let Some(iterations) = self.iterations {
            config.iterations = iterations.max(1);
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if config.files.is_empty() {
            return Err(CliError::Config("no files to benchmark".to_string()));
        }
        Ok(config)
    }
}

/// Run the benchmark and print its report.
pub fn run(ctx: &CliContext, args: BenchArgs) -> Result<(), CliError> {
    ctx.log_startup("bench");
    let config = args.resolve(&ctx.config().benchmark)?;
    let runner = ShellRunner::new();

    let report = Benchmark::new(&runner, &ctx.config().tools.duckdb, &config).run();
    println!("{}", report);

    if report.errors.is_empty() {
        Ok(())
    } else {
        Err(CliError::Incomplete(format!(
            "{} benchmark step(s) failed",
            report.errors.len()
        )))
    }
}

/// Default output: `<dir>/<stem>.parquet` next to the input.
pub fn default_parquet_path(input: &Path) -> PathBuf {
    let name = format!("{}.parquet", bare_stem(input));
    match input.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

/// Convert a GeoPackage (plain or zipped) to GeoParquet.
pub fn to_parquet(ctx: &CliContext, input: PathBuf, output: Option<PathBuf>) -> Result<(), CliError> {
    ctx.log_startup("to-parquet");
    if !input.exists() {
        return Err(CliError::Config(format!("input {} does not exist", input.display())));
    }
    let output = output.unwrap_or_else(|| default_parquet_path(&input));
    let runner = ShellRunner::new();

    gpkg_to_geoparquet(
        &runner,
        &ctx.config().tools.duckdb,
        &input,
        &output,
        ctx.config().pipeline.overwrite,
    )?;

    println!("Wrote {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(files: &[&str]) -> BenchArgs {
        BenchArgs {
            files: files.iter().map(|s| s.to_string()).collect(),
            bbox_sizes: Vec::new(),
            iterations: None,
            seed: None,
        }
    }

    #[test]
    fn test_resolve_replaces_files_and_keeps_rest() {
        let base = BenchmarkConfig::default();
        let mut a = args(&["gpkg=a.gpkg", "fgb=a.fgb"]);
        a.seed = Some(7);
        a.iterations = Some(0);

        let config = a.resolve(&base).unwrap();

        assert_eq!(config.files[0], ("gpkg".to_string(), PathBuf::from("a.gpkg")));
        assert_eq!(config.files.len(), 2);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.iterations, 1);
        assert_eq!(config.bbox_sizes, base.bbox_sizes);
    }

    #[test]
    fn test_resolve_rejects_bad_entry() {
        let base = BenchmarkConfig::default();
        assert!(matches!(args(&["a.gpkg"]).resolve(&base), Err(CliError::Config(_))));
    }

    #[test]
    fn test_default_parquet_path() {
        assert_eq!(
            default_parquet_path(Path::new("/data/v0_1-CYP.gpkg.zip")),
            PathBuf::from("/data/v0_1-CYP.parquet")
        );
        assert_eq!(default_parquet_path(Path::new("x.gpkg")), PathBuf::from("x.parquet"));
    }
}
