//! Merging tile archives with tile-join.

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::command::{CommandRunner, ToolCommand};
use crate::country::{safe_name, Country, StageOutput};
use crate::pool::run_ordered;
use crate::stage::{prepare_output_dir, should_skip, StageResult, StageTally};

/// `tile-join -o <out> <inputs...>`.
pub fn tile_join_command(program: &str, output: &Path, inputs: &[PathBuf]) -> ToolCommand {
    ToolCommand::new(program).arg("-o").arg(output).args(inputs)
}

/// `<dir>/CYP.pmtiles`.
pub fn country_tiles_path(output_dir: &Path, country_code: &str) -> PathBuf {
    output_dir.join(format!("{}.pmtiles", safe_name(country_code)))
}

/// Join `inputs` into `save_path`.
///
/// Nothing to join leaves the output [`StageOutput::NotStarted`].
pub fn join_one(
    runner: &dyn CommandRunner,
    program: &str,
    inputs: &[PathBuf],
    save_path: &Path,
    overwrite: bool,
) -> StageOutput {
    if inputs.is_empty() {
        warn!(output = %save_path.display(), "no tiles to join");
        return StageOutput::NotStarted;
    }
    if should_skip(save_path, overwrite) {
        return StageOutput::Succeeded(save_path.to_path_buf());
    }

    match runner.run(&tile_join_command(program, save_path, inputs)) {
        Ok(()) => StageOutput::Succeeded(save_path.to_path_buf()),
        Err(e) => {
            let name = save_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            error!("Creating {} → {}", name, e);
            StageOutput::Failed(e.to_string())
        }
    }
}

/// Join each country's layers into one archive per country.
///
/// Only layers whose tiles were produced are joined.
pub fn join_per_country(
    countries: Vec<Country>,
    output_dir: &Path,
    workers: usize,
    overwrite: bool,
    runner: &dyn CommandRunner,
    program: &str,
) -> StageResult<(Vec<Country>, StageTally)> {
    info!("Joining all PMTiles per country...");
    prepare_output_dir(output_dir)?;

    let joined = run_ordered(countries, workers, |mut country| {
        let save_path = country_tiles_path(output_dir, &country.code);
        country.merged = join_one(runner, program, &country.tile_inputs(), &save_path, overwrite);
        country
    });

    let mut tally = StageTally::new("join per country");
    for country in &joined {
        tally.record(&country_tiles_path(output_dir, &country.code), &country.merged);
    }
    tally.log();

    info!("Done joining all PMTiles per country.");
    Ok((joined, tally))
}

/// Join every country archive into `save_path`.
///
/// Countries whose own join did not succeed are left out.
pub fn join_all_countries(
    countries: &[Country],
    save_path: &Path,
    overwrite: bool,
    runner: &dyn CommandRunner,
    program: &str,
) -> StageResult<StageOutput> {
    info!("Joining the PMTiles of all countries together...");
    if let Some(dir) = save_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        prepare_output_dir(dir)?;
    }

    let inputs: Vec<PathBuf> = countries
        .iter()
        .filter_map(|c| c.merged.path().map(Path::to_path_buf))
        .collect();
    let skipped = countries.len() - inputs.len();
    if skipped > 0 {
        warn!(skipped, "countries without a merged archive are left out");
    }

    let output = join_one(runner, program, &inputs, save_path, overwrite);
    info!("Done joining the PMTiles of all countries together.");
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::RecordingRunner;
    use crate::country::{AdminInfo, AdminLevel, BuildingsInfo};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn tiled_country(code: &str, admin_tiles: &[(AdminLevel, StageOutput)]) -> Country {
        let admin: BTreeMap<AdminLevel, AdminInfo> = admin_tiles
            .iter()
            .map(|(level, tiles)| {
                let mut info = AdminInfo::new(PathBuf::from(format!("{}-{}.geojson", code, level)), 1.0);
                info.tiles = tiles.clone();
                (*level, info)
            })
            .collect();
        let mut buildings = BuildingsInfo::new(PathBuf::from(format!("{}.gpkg.zip", code)));
        buildings.tiles = StageOutput::Succeeded(PathBuf::from(format!("{}.pmtiles", code)));
        Country::new(code).with_admin(admin).with_buildings(buildings)
    }

    #[test]
    fn test_tile_join_command() {
        let cmd = tile_join_command(
            "tile-join",
            Path::new("country/CYP.pmtiles"),
            &[PathBuf::from("CYP.pmtiles"), PathBuf::from("CYP-ADM0.pmtiles")],
        );
        assert_eq!(
            cmd.to_string(),
            "tile-join -o country/CYP.pmtiles CYP.pmtiles CYP-ADM0.pmtiles"
        );
    }

    #[test]
    fn test_missing_admin_tile_is_left_out() {
        let temp = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        let country = tiled_country(
            "CYP",
            &[
                (AdminLevel::Adm0, StageOutput::Succeeded(PathBuf::from("CYP-ADM0.pmtiles"))),
                (AdminLevel::Adm1, StageOutput::NotStarted),
                (AdminLevel::Adm2, StageOutput::Failed("boom".to_string())),
            ],
        );

        let (joined, tally) =
            join_per_country(vec![country], temp.path(), 2, false, &runner, "tile-join").unwrap();

        assert_eq!(joined[0].merged, StageOutput::Succeeded(temp.path().join("CYP.pmtiles")));
        assert!(tally.all_succeeded());
        let args = runner.recorded()[0].args_lossy();
        assert_eq!(&args[2..], &["CYP.pmtiles", "CYP-ADM0.pmtiles"]);
    }

    #[test]
    fn test_country_without_tiles_is_not_started() {
        let temp = TempDir::new().unwrap();
        let runner = RecordingRunner::new();

        let (joined, tally) =
            join_per_country(vec![Country::new("CYP")], temp.path(), 1, false, &runner, "tile-join").unwrap();

        assert_eq!(runner.count(), 0);
        assert_eq!(joined[0].merged, StageOutput::NotStarted);
        assert_eq!(tally.not_started, 1);
    }

    #[test]
    fn test_join_all_uses_only_merged_countries() {
        let temp = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        let mut cyp = Country::new("CYP");
        cyp.merged = StageOutput::Succeeded(PathBuf::from("country/CYP.pmtiles"));
        let mut mlt = Country::new("MLT");
        mlt.merged = StageOutput::Failed("boom".to_string());
        let mut lux = Country::new("LUX");
        lux.merged = StageOutput::Succeeded(PathBuf::from("country/LUX.pmtiles"));

        let save_path = temp.path().join("pmtiles").join("all_countries.pmtiles");
        let output = join_all_countries(&[cyp, mlt, lux], &save_path, false, &runner, "tile-join").unwrap();

        assert_eq!(output, StageOutput::Succeeded(save_path.clone()));
        assert!(save_path.exists());
        let args = runner.recorded()[0].args_lossy();
        assert_eq!(&args[2..], &["country/CYP.pmtiles", "country/LUX.pmtiles"]);
    }

    #[test]
    fn test_join_all_failure_is_reported() {
        let temp = TempDir::new().unwrap();
        let runner = RecordingRunner::new().failing("tile-join");
        let mut cyp = Country::new("CYP");
        cyp.merged = StageOutput::Succeeded(PathBuf::from("country/CYP.pmtiles"));

        let output =
            join_all_countries(&[cyp], &temp.path().join("all.pmtiles"), false, &runner, "tile-join").unwrap();

        assert!(output.is_failed());
    }
}
