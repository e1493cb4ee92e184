//! End-to-end batch run.
//!
//! ```text
//! listing ─► select countries ─► download admin ─┐
//!                                download buildings ┴► convert ─► tiles ─► join per country ─► join all ─► upload
//! ```
//!
//! Network stages run on a Tokio runtime owned by the run; subprocess stages
//! run on the worker pool from the calling thread. Every stage consumes the
//! country records and hands back updated ones, so a failure only leaves the
//! affected fields unset and later stages skip them.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use thiserror::Error;
use tokio::runtime::Runtime;
use tracing::{error, info, warn};

use crate::area;
use crate::command::CommandRunner;
use crate::config::ConfigFile;
use crate::convert::convert_to_flatgeobufs;
use crate::country::{AdminInfo, AdminLevel, BuildingsInfo, Country, StageOutput};
use crate::download::{
    download_admin, download_buildings, fetch_building_links, DownloadError, ProgressReporter,
};
use crate::pool::worker_count;
use crate::stage::{StageError, StageTally};
use crate::tiles::{country_tiles_path, generate_tiles, join_all_countries, join_per_country, tiles_path};
use crate::upload::{UploadResult, Uploader};

/// Result type for pipeline runs.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that stop a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to create Tokio runtime: {0}")]
    RuntimeCreation(String),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("failed to scan {}: {source}", path.display())]
    Scan {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no countries left to process after filtering")]
    NoCountries,
}

/// What happened to the final archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Upload was turned off.
    Disabled,
    /// There was no final archive to send.
    Skipped,
    Uploaded { key: String, bytes: u64 },
    Failed(String),
}

/// Record of one complete run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub countries: Vec<String>,
    /// One tally per stage, in run order.
    pub tallies: Vec<StageTally>,
    pub final_output: StageOutput,
    pub upload: UploadOutcome,
}

impl RunSummary {
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// Whether every stage and the upload went through without failures.
    pub fn is_clean(&self) -> bool {
        self.tallies.iter().all(StageTally::all_succeeded)
            && self.final_output.is_succeeded()
            && !matches!(self.upload, UploadOutcome::Failed(_))
    }
}

/// Codes to process: everything available minus `exclude`, restricted to
/// `only` when it is non-empty. Sorted and deduplicated.
pub fn select_countries<'a, I>(available: I, exclude: &[String], only: &[String]) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let available: Vec<&String> = available.into_iter().collect();
    for code in only {
        if !available.contains(&code) {
            warn!(country = %code, "requested country has no building dataset");
        }
    }

    let mut codes: Vec<String> = available
        .into_iter()
        .filter(|code| !exclude.contains(code))
        .filter(|code| only.is_empty() || only.contains(code))
        .cloned()
        .collect();
    codes.sort();
    codes.dedup();
    codes
}

/// Combine per-stage download results into country records.
pub fn assemble_countries(
    codes: &[String],
    mut admin: BTreeMap<String, BTreeMap<AdminLevel, AdminInfo>>,
    mut buildings: BTreeMap<String, BuildingsInfo>,
) -> Vec<Country> {
    codes
        .iter()
        .map(|code| {
            let mut country = Country::new(code.clone()).with_admin(admin.remove(code).unwrap_or_default());
            country.buildings = buildings.remove(code);
            country
        })
        .collect()
}

/// Rebuild country records from files already on disk.
///
/// Boundary files are measured again; every output that exists is taken as
/// produced. Used to run a single stage without repeating the earlier ones.
pub fn discover_countries(config: &ConfigFile) -> PipelineResult<Vec<Country>> {
    let layout = &config.layout;
    let mut countries: BTreeMap<String, Country> = BTreeMap::new();

    for (name, path) in list_dir(&layout.admin_dir())? {
        let Some((code, level)) = name
            .strip_suffix(".geojson")
            .and_then(|stem| stem.rsplit_once('-'))
        else {
            continue;
        };
        let Ok(level) = level.parse::<AdminLevel>() else {
            continue;
        };
        match area::mean_area(&path) {
            Ok(mean_area) => {
                countries
                    .entry(code.to_string())
                    .or_insert_with(|| Country::new(code))
                    .admin
                    .insert(level, AdminInfo::new(path, mean_area));
            }
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable boundary file"),
        }
    }

    for (name, path) in list_dir(&layout.buildings_gpkg_dir())? {
        if let Some(code) = name.strip_suffix(".gpkg.zip") {
            countries
                .entry(code.to_string())
                .or_insert_with(|| Country::new(code))
                .buildings = Some(BuildingsInfo::new(path));
        }
    }

    let fgb_dir = layout.buildings_flatgeobuf_dir();
    let layer_dir = layout.layer_tiles_dir();
    let country_dir = layout.country_tiles_dir();
    for country in countries.values_mut() {
        for info in country.admin.values_mut() {
            info.tiles = existing(tiles_path(&info.geojson_path, &layer_dir));
        }
        if let Some(buildings) = country.buildings.as_mut() {
            let fgb = fgb_dir.join(format!("{}.fgb", country.code));
            buildings.flatgeobuf = existing(fgb.clone());
            buildings.tiles = existing(tiles_path(&fgb, &layer_dir));
        }
        country.merged = existing(country_tiles_path(&country_dir, &country.code));
    }

    let exclude = &config.pipeline.exclude;
    let only = &config.pipeline.countries;
    Ok(countries
        .into_values()
        .filter(|c| !exclude.contains(&c.code))
        .filter(|c| only.is_empty() || only.contains(&c.code))
        .collect())
}

fn existing(path: PathBuf) -> StageOutput {
    if path.exists() {
        StageOutput::Succeeded(path)
    } else {
        StageOutput::NotStarted
    }
}

/// File names and paths in `dir`, sorted; a missing directory is empty.
fn list_dir(dir: &Path) -> PipelineResult<Vec<(String, PathBuf)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let scan_error = |e| PipelineError::Scan {
        path: dir.to_path_buf(),
        source: e,
    };
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(scan_error)? {
        let entry = entry.map_err(scan_error)?;
        let path = entry.path();
        if path.is_file() {
            entries.push((entry.file_name().to_string_lossy().into_owned(), path));
        }
    }
    entries.sort();
    Ok(entries)
}

/// One configured pipeline.
pub struct Pipeline<'a> {
    config: &'a ConfigFile,
    runner: &'a dyn CommandRunner,
    progress: &'a dyn ProgressReporter,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a ConfigFile, runner: &'a dyn CommandRunner, progress: &'a dyn ProgressReporter) -> Self {
        Self {
            config,
            runner,
            progress,
        }
    }

    fn workers(&self) -> usize {
        worker_count(self.config.pipeline.workers)
    }

    /// Run every stage, creating a runtime for the network stages.
    pub fn run(&self) -> PipelineResult<RunSummary> {
        let started_at = Local::now();
        let runtime = Runtime::new().map_err(|e| PipelineError::RuntimeCreation(e.to_string()))?;

        let countries = runtime.block_on(self.download())?;
        let codes: Vec<String> = countries.iter().map(|c| c.code.clone()).collect();

        let (countries, mut tallies) = self.process(countries)?;
        let final_output = self.join_all(&countries)?;
        let mut join_all_tally = StageTally::new("join all");
        join_all_tally.record(&self.config.layout.merged_tiles_path(), &final_output);
        tallies.push(join_all_tally);

        let upload = if !self.config.pipeline.upload {
            UploadOutcome::Disabled
        } else {
            match final_output.path() {
                Some(path) => runtime.block_on(self.upload(path)),
                None => {
                    warn!("No final archive, nothing to upload.");
                    UploadOutcome::Skipped
                }
            }
        };

        let summary = RunSummary {
            started_at,
            finished_at: Local::now(),
            countries: codes,
            tallies,
            final_output,
            upload,
        };
        info!(
            countries = summary.countries.len(),
            elapsed_secs = summary.elapsed().num_seconds(),
            clean = summary.is_clean(),
            "Pipeline finished."
        );
        Ok(summary)
    }

    /// Fetch the listing, pick countries and download both datasets.
    pub async fn download(&self) -> PipelineResult<Vec<Country>> {
        let sources = &self.config.sources;
        let layout = &self.config.layout;
        let overwrite = self.config.pipeline.overwrite;

        let links = fetch_building_links(sources).await?;
        let codes = select_countries(
            links.keys(),
            &self.config.pipeline.exclude,
            &self.config.pipeline.countries,
        );
        if codes.is_empty() {
            return Err(PipelineError::NoCountries);
        }
        info!(countries = codes.len(), "Selected countries.");

        let admin = download_admin(&codes, &layout.admin_dir(), overwrite, sources, self.progress).await?;
        let buildings = download_buildings(
            &links,
            &codes,
            &layout.buildings_gpkg_dir(),
            overwrite,
            sources,
            self.progress,
        )
        .await?;

        Ok(assemble_countries(&codes, admin, buildings))
    }

    /// Convert, tile and join per country.
    pub fn process(&self, countries: Vec<Country>) -> PipelineResult<(Vec<Country>, Vec<StageTally>)> {
        let (countries, converted) = self.convert(countries)?;
        let (countries, tiled) = self.tile(countries)?;
        let (countries, joined) = self.join_countries(countries)?;
        Ok((countries, vec![converted, tiled, joined]))
    }

    pub fn convert(&self, countries: Vec<Country>) -> PipelineResult<(Vec<Country>, StageTally)> {
        Ok(convert_to_flatgeobufs(
            countries,
            &self.config.layout.buildings_flatgeobuf_dir(),
            self.workers(),
            self.config.pipeline.overwrite,
            self.runner,
            &self.config.tools.ogr2ogr,
        )?)
    }

    pub fn tile(&self, countries: Vec<Country>) -> PipelineResult<(Vec<Country>, StageTally)> {
        Ok(generate_tiles(
            countries,
            &self.config.layout.layer_tiles_dir(),
            self.workers(),
            self.config.pipeline.overwrite,
            self.config.pipeline.buildings_max_zoom,
            self.runner,
            &self.config.tools.tippecanoe,
        )?)
    }

    pub fn join_countries(&self, countries: Vec<Country>) -> PipelineResult<(Vec<Country>, StageTally)> {
        Ok(join_per_country(
            countries,
            &self.config.layout.country_tiles_dir(),
            self.workers(),
            self.config.pipeline.overwrite,
            self.runner,
            &self.config.tools.tile_join,
        )?)
    }

    pub fn join_all(&self, countries: &[Country]) -> PipelineResult<StageOutput> {
        Ok(join_all_countries(
            countries,
            &self.config.layout.merged_tiles_path(),
            self.config.pipeline.overwrite,
            self.runner,
            &self.config.tools.tile_join,
        )?)
    }

    /// Send the final archive; failures are reported, not raised.
    pub async fn upload(&self, path: &Path) -> UploadOutcome {
        let key = &self.config.pipeline.upload_key;
        match self.push(path, key).await {
            Ok(bytes) => UploadOutcome::Uploaded {
                key: key.clone(),
                bytes,
            },
            Err(e) => {
                error!(error = %e, "upload failed");
                UploadOutcome::Failed(e.to_string())
            }
        }
    }

    async fn push(&self, path: &Path, key: &str) -> UploadResult<u64> {
        let uploader = Uploader::connect(&self.config.storage)?;
        uploader.upload_file(path, key, self.progress).await
    }
}
