//! Per-layer tile generation with tippecanoe.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use crate::command::{CommandRunner, ToolCommand};
use crate::country::{bare_stem, AdminLevel, Country, StageOutput, BUILDINGS_LAYER};
use crate::pool::run_ordered;
use crate::stage::{prepare_output_dir, should_skip, StageResult, StageTally};
use crate::zoom::{allocate_for_country, MaxZoom, ZoomRange};

/// A layer of a country's tile set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileLayer {
    Admin(AdminLevel),
    Buildings,
}

impl fmt::Display for TileLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileLayer::Admin(level) => write!(f, "{}", level),
            TileLayer::Buildings => f.write_str(BUILDINGS_LAYER),
        }
    }
}

/// One tippecanoe invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileJob {
    /// Index of the country in the stage's input.
    pub country: usize,
    pub layer: TileLayer,
    pub input: PathBuf,
    pub range: ZoomRange,
}

/// `<dir>/CYP-ADM1.pmtiles` for `CYP-ADM1.geojson`.
pub fn tiles_path(input: &Path, output_dir: &Path) -> PathBuf {
    output_dir.join(format!("{}.pmtiles", bare_stem(input)))
}

/// `tippecanoe -Z{min} -z{max} -o <out> -l <layer> --coalesce-densest-as-needed <in>`.
pub fn tippecanoe_command(
    program: &str,
    input: &Path,
    output: &Path,
    layer: TileLayer,
    range: ZoomRange,
) -> ToolCommand {
    let mut command = ToolCommand::new(program)
        .arg(format!("-Z{}", range.min))
        .arg(format!("-z{}", range.max))
        .arg("-o")
        .arg(output)
        .arg("-l")
        .arg(layer.to_string())
        .arg("--coalesce-densest-as-needed")
        .arg(input);
    if range.max == MaxZoom::Guess {
        command = command.arg("--extend-zooms-if-still-dropping");
    }
    command
}

/// Generate one layer's tiles.
pub fn generate_one(
    runner: &dyn CommandRunner,
    program: &str,
    input: &Path,
    range: ZoomRange,
    output_dir: &Path,
    layer: TileLayer,
    overwrite: bool,
) -> StageOutput {
    let save_path = tiles_path(input, output_dir);
    if should_skip(&save_path, overwrite) {
        return StageOutput::Succeeded(save_path);
    }

    match runner.run(&tippecanoe_command(program, input, &save_path, layer, range)) {
        Ok(()) => StageOutput::Succeeded(save_path),
        Err(e) => {
            let name = input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            error!("{} → {}", name, e);
            StageOutput::Failed(e.to_string())
        }
    }
}

/// Jobs for every layer of every country.
///
/// Admin layers follow each country's zoom plan. The building layer needs a
/// FlatGeobuf file; countries without one get no building job.
pub fn plan_jobs(countries: &[Country], buildings_max: MaxZoom) -> Vec<TileJob> {
    let mut jobs = Vec::new();
    for (index, country) in countries.iter().enumerate() {
        let plan = allocate_for_country(country, buildings_max);
        debug!(country = %country.code, ?plan, "zoom plan");

        for (level, range) in plan.admin {
            let Some(info) = country.admin.get(&level) else {
                continue;
            };
            jobs.push(TileJob {
                country: index,
                layer: TileLayer::Admin(level),
                input: info.geojson_path.clone(),
                range,
            });
        }

        let fgb = country
            .buildings
            .as_ref()
            .and_then(|b| b.flatgeobuf.path());
        if let Some(fgb) = fgb {
            jobs.push(TileJob {
                country: index,
                layer: TileLayer::Buildings,
                input: fgb.to_path_buf(),
                range: plan.buildings,
            });
        }
    }
    jobs
}

/// Generate every layer's tiles on a worker pool and record the paths.
#[allow(clippy::too_many_arguments)]
pub fn generate_tiles(
    countries: Vec<Country>,
    output_dir: &Path,
    workers: usize,
    overwrite: bool,
    buildings_max: MaxZoom,
    runner: &dyn CommandRunner,
    program: &str,
) -> StageResult<(Vec<Country>, StageTally)> {
    info!("Converting all layers to PMTiles...");
    prepare_output_dir(output_dir)?;

    let jobs = plan_jobs(&countries, buildings_max);
    let outputs = run_ordered(jobs.clone(), workers, |job| {
        generate_one(runner, program, &job.input, job.range, output_dir, job.layer, overwrite)
    });

    let mut countries = countries;
    let mut tally = StageTally::new("tiles");
    for (job, output) in jobs.iter().zip(outputs) {
        tally.record(&job.input, &output);
        let country = &mut countries[job.country];
        match job.layer {
            TileLayer::Admin(level) => {
                if let Some(info) = country.admin.get_mut(&level) {
                    info.tiles = output;
                }
            }
            TileLayer::Buildings => {
                if let Some(buildings) = country.buildings.as_mut() {
                    buildings.tiles = output;
                }
            }
        }
    }
    tally.log();

    info!("Done converting all layers to PMTiles.");
    Ok((countries, tally))
}
