//! Pipeline commands: the full run and each stage on its own.
//!
//! A single stage picks up from whatever the earlier stages left on disk, so
//! `convert`, `tiles` and `join` can be repeated after fixing a failure
//! without downloading again.

use buccotiles::command::{check_tool_available, CommandError, ShellRunner};
use buccotiles::country::Country;
use buccotiles::pipeline::{discover_countries, Pipeline};
use buccotiles::stage::StageTally;

use super::output::{print_country_stages, print_final_output, print_run_summary, print_tallies};
use crate::context::CliContext;
use crate::error::CliError;

/// Arguments for the run command.
pub struct RunArgs {
    pub no_upload: bool,
}

/// Run every stage, from download to upload.
pub fn run(ctx: &CliContext, args: RunArgs) -> Result<(), CliError> {
    ctx.log_startup("run");
    let mut config = ctx.config().clone();
    if args.no_upload {
        config.pipeline.upload = false;
    }

    let runner = ShellRunner::new();
    check_tools(&runner, &[&config.tools.ogr2ogr, &config.tools.tippecanoe, &config.tools.tile_join])?;

    let pipeline = Pipeline::new(&config, &runner, ctx.progress());
    let summary = pipeline.run()?;
    print_run_summary(&summary);

    if summary.is_clean() {
        Ok(())
    } else {
        Err(CliError::Incomplete("see the summary above".to_string()))
    }
}

/// Download boundaries and building footprints only.
pub fn download(ctx: &CliContext) -> Result<(), CliError> {
    ctx.log_startup("download");
    let runner = ShellRunner::new();
    let pipeline = Pipeline::new(ctx.config(), &runner, ctx.progress());

    let countries = ctx.runtime()?.block_on(pipeline.download())?;

    println!("Downloaded {} countries.", countries.len());
    print_country_stages(&countries);
    Ok(())
}

/// Convert downloaded footprints to FlatGeobuf.
pub fn convert(ctx: &CliContext) -> Result<(), CliError> {
    ctx.log_startup("convert");
    let runner = ShellRunner::new();
    check_tools(&runner, &[&ctx.config().tools.ogr2ogr])?;
    let pipeline = Pipeline::new(ctx.config(), &runner, ctx.progress());

    let (_, tally) = pipeline.convert(known_countries(ctx)?)?;
    finish(&[tally])
}

/// Generate a tile archive per layer.
pub fn tiles(ctx: &CliContext) -> Result<(), CliError> {
    ctx.log_startup("tiles");
    let runner = ShellRunner::new();
    check_tools(&runner, &[&ctx.config().tools.tippecanoe])?;
    let pipeline = Pipeline::new(ctx.config(), &runner, ctx.progress());

    let (_, tally) = pipeline.tile(known_countries(ctx)?)?;
    finish(&[tally])
}

/// Join layers per country, then every country into the final archive.
pub fn join(ctx: &CliContext) -> Result<(), CliError> {
    ctx.log_startup("join");
    let runner = ShellRunner::new();
    check_tools(&runner, &[&ctx.config().tools.tile_join])?;
    let pipeline = Pipeline::new(ctx.config(), &runner, ctx.progress());

    let (countries, tally) = pipeline.join_countries(known_countries(ctx)?)?;
    let final_output = pipeline.join_all(&countries)?;
    let mut join_all = StageTally::new("join all");
    join_all.record(&ctx.config().layout.merged_tiles_path(), &final_output);

    print_final_output(&final_output);
    finish(&[tally, join_all])
}

/// Show how far every country on disk has got.
pub fn status(ctx: &CliContext) -> Result<(), CliError> {
    let countries = discover_countries(ctx.config())?;
    if countries.is_empty() {
        println!("Nothing downloaded yet under {}", ctx.config().layout.data_dir.display());
        return Ok(());
    }
    print_country_stages(&countries);
    Ok(())
}

fn known_countries(ctx: &CliContext) -> Result<Vec<Country>, CliError> {
    let countries = discover_countries(ctx.config())?;
    if countries.is_empty() {
        return Err(CliError::Config(format!(
            "no downloaded countries under {}. Run 'buccotiles download' first.",
            ctx.config().layout.data_dir.display()
        )));
    }
    Ok(countries)
}

fn finish(tallies: &[StageTally]) -> Result<(), CliError> {
    print_tallies(tallies);
    let failed: usize = tallies.iter().map(|t| t.failed.len()).sum();
    if failed == 0 {
        Ok(())
    } else {
        Err(CliError::Incomplete(format!("{} item(s) failed", failed)))
    }
}

/// Fail early when a tool is not installed, instead of once per country.
///
/// Only a failed start counts; some tools exit non-zero on `--version`.
fn check_tools(runner: &ShellRunner, programs: &[&str]) -> Result<(), CliError> {
    for program in programs {
        if let Err(e @ CommandError::Spawn { .. }) = check_tool_available(runner, program, &["--version"]) {
            return Err(CliError::Tool(e));
        }
    }
    Ok(())
}
