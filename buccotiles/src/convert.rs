//! Format conversion of building footprints.
//!
//! - GeoPackage archives → FlatGeobuf with `ogr2ogr`, reprojected to WGS84,
//!   as input for the tiler.
//! - GeoPackage → GeoParquet with DuckDB, for the format benchmarks.
//!
//! Tool failures are logged and recorded as [`StageOutput::Failed`] so a
//! batch keeps going and reports a tally at the end.

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::bench::sql::quote_literal;
use crate::command::{CommandResult, CommandRunner, ToolCommand};
use crate::country::{bare_stem, Country, StageOutput};
use crate::pool::run_ordered;
use crate::stage::{prepare_output_dir, should_skip, StageResult, StageTally};

/// Target CRS of the FlatGeobuf files.
pub const TARGET_SRS: &str = "EPSG:4326";

/// `<dir>/CYP.fgb` for `CYP.gpkg.zip`.
pub fn flatgeobuf_path(input: &Path, output_dir: &Path) -> PathBuf {
    output_dir.join(format!("{}.fgb", bare_stem(input)))
}

/// `ogr2ogr -progress -f FlatGeoBuf <out> <in> -t_srs EPSG:4326`.
pub fn flatgeobuf_command(program: &str, input: &Path, output: &Path) -> ToolCommand {
    ToolCommand::new(program)
        .args(["-progress", "-f", "FlatGeoBuf"])
        .arg(output)
        .arg(input)
        .args(["-t_srs", TARGET_SRS])
}

/// Convert one GeoPackage archive to FlatGeobuf.
pub fn convert_one_to_flatgeobuf(
    runner: &dyn CommandRunner,
    program: &str,
    input: &Path,
    output_dir: &Path,
    overwrite: bool,
) -> StageOutput {
    let save_path = flatgeobuf_path(input, output_dir);
    if should_skip(&save_path, overwrite) {
        return StageOutput::Succeeded(save_path);
    }

    match runner.run(&flatgeobuf_command(program, input, &save_path)) {
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

/// Convert every country's building archive to FlatGeobuf on a worker pool.
///
/// Countries without downloaded buildings pass through unchanged.
pub fn convert_to_flatgeobufs(
    countries: Vec<Country>,
    output_dir: &Path,
    workers: usize,
    overwrite: bool,
    runner: &dyn CommandRunner,
    program: &str,
) -> StageResult<(Vec<Country>, StageTally)> {
    info!("Converting all GeoPackage to FlatGeoBuf...");
    prepare_output_dir(output_dir)?;

    let converted = run_ordered(countries, workers, |mut country| {
        if let Some(buildings) = country.buildings.as_mut() {
            buildings.flatgeobuf = convert_one_to_flatgeobuf(
                runner,
                program,
                &buildings.gpkg_zip_path,
                output_dir,
                overwrite,
            );
        } else {
            warn!(country = %country.code, "no buildings downloaded, nothing to convert");
        }
        country
    });

    let mut tally = StageTally::new("flatgeobuf");
    for country in &converted {
        match &country.buildings {
            Some(b) => tally.record(&b.gpkg_zip_path, &b.flatgeobuf),
            None => tally.record(Path::new(&country.code), &StageOutput::NotStarted),
        }
    }
    tally.log();

    info!("Done converting all GeoPackage to FlatGeoBuf.");
    Ok((converted, tally))
}

/// DuckDB statement rewriting a GeoPackage as zstd GeoParquet.
///
/// The GeoPackage geometry column `geom` is renamed `geometry`.
pub fn geoparquet_sql(input: &Path, output: &Path) -> String {
    format!(
        "COPY(\
            SELECT * EXCLUDE(geom), geom AS geometry \
            FROM st_read({}, allowed_drivers=['GPKG'])\
        ) TO {} \
        (FORMAT parquet, COMPRESSION zstd, COMPRESSION_LEVEL 15, ROW_GROUP_SIZE 100_000);",
        quote_literal(&input.to_string_lossy()),
        quote_literal(&output.to_string_lossy()),
    )
}

/// Convert a GeoPackage (plain or zipped) to GeoParquet with DuckDB.
pub fn gpkg_to_geoparquet(
    runner: &dyn CommandRunner,
    duckdb: &str,
    input: &Path,
    output: &Path,
    overwrite: bool,
) -> CommandResult<StageOutput> {
    if should_skip(output, overwrite) {
        return Ok(StageOutput::Succeeded(output.to_path_buf()));
    }
    let input = gdal_path(input);
    let db = crate::bench::sql::DuckDb::new(runner, duckdb);
    db.install_spatial()?;
    db.execute(&geoparquet_sql(&input, output))?;
    Ok(StageOutput::Succeeded(output.to_path_buf()))
}

/// Zipped inputs are read through GDAL's `/vsizip/` virtual filesystem.
fn gdal_path(input: &Path) -> PathBuf {
    let is_zip = input
        .extension()
        .map(|e| e.eq_ignore_ascii_case("zip"))
        .unwrap_or(false);
    if is_zip {
        PathBuf::from(format!("/vsizip/{}", input.display()))
    } else {
        input.to_path_buf()
    }
}
