//! Object storage commands.

use std::path::PathBuf;

use buccotiles::config::format_size;
use buccotiles::upload::{UploadError, Uploader};
use clap::Subcommand;
use console::style;

use crate::context::CliContext;
use crate::error::CliError;

/// Storage subcommands.
#[derive(Debug, Subcommand)]
pub enum StorageAction {
    /// Upload a file, by default the merged archive
    Upload {
        /// File to upload (default: the merged archive under the data directory)
        #[arg(long)]
        file: Option<PathBuf>,

        /// Object key (default: upload_key from config.ini)
        #[arg(long)]
        key: Option<String>,
    },

    /// Check that the endpoint answers and the keys can list the bucket
    Check,
}

/// Run a storage subcommand.
pub fn run(ctx: &CliContext, action: StorageAction) -> Result<(), CliError> {
    match action {
        StorageAction::Upload { file, key } => run_upload(ctx, file, key),
        StorageAction::Check => run_check(ctx),
    }
}

fn run_upload(ctx: &CliContext, file: Option<PathBuf>, key: Option<String>) -> Result<(), CliError> {
    ctx.log_startup("storage upload");
    let config = ctx.config();
    let file = file.unwrap_or_else(|| config.layout.merged_tiles_path());
    let key = key.unwrap_or_else(|| config.pipeline.upload_key.clone());

    let uploader = Uploader::connect(&config.storage)?;
    let bytes = ctx
        .runtime()?
        .block_on(uploader.upload_file(&file, &key, ctx.progress()))?;

    println!(
        "Uploaded {} to s3://{}/{} ({})",
        file.display(),
        uploader.bucket(),
        key,
        format_size(bytes)
    );
    Ok(())
}

fn run_check(ctx: &CliContext) -> Result<(), CliError> {
    ctx.log_startup("storage check");
    let storage = &ctx.config().storage;
    println!("Endpoint: {}", storage.endpoint);
    println!("Bucket:   {}", storage.bucket);

    let uploader = Uploader::connect(storage)?;
    match ctx.runtime()?.block_on(uploader.check()) {
        Ok(entries) => {
            println!("Status:   {} ({} top-level entries)", style("reachable").green(), entries);
            Ok(())
        }
        Err(e) => {
            let status = match &e {
                UploadError::Unreachable { .. } => "unreachable",
                UploadError::AccessDenied { .. } => "access denied",
                _ => "error",
            };
            println!("Status:   {}", style(status).red());
            Err(CliError::Upload(e))
        }
    }
}
