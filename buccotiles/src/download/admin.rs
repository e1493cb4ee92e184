//! Administrative boundary downloads.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use futures::future::try_join_all;
use tracing::info;

use super::error::{DownloadError, DownloadResult};
use super::http::{ensure_dir, HttpFetcher};
use super::metadata::AdminMetadata;
use super::progress::ProgressReporter;
use crate::area;
use crate::config::SourcesConfig;
use crate::country::{AdminInfo, AdminLevel};
use crate::stage::should_skip;

/// `CYP-ADM1.geojson`.
pub fn admin_file_name(country_code: &str, level: AdminLevel) -> String {
    format!("{}-{}.geojson", country_code, level)
}

/// Download one country's boundaries at one level and measure them.
///
/// An existing file is reused unless `overwrite` is set; the mean area is
/// computed either way.
pub async fn download_admin_level(
    fetcher: &HttpFetcher,
    api_url: &str,
    country_code: &str,
    level: AdminLevel,
    output_dir: &Path,
    overwrite: bool,
    progress: &dyn ProgressReporter,
) -> DownloadResult<AdminInfo> {
    ensure_dir(output_dir).await?;
    let save_path = output_dir.join(admin_file_name(country_code, level));

    if !should_skip(&save_path, overwrite) {
        let meta_url = format!("{}/{}/{}", api_url.trim_end_matches('/'), country_code, level);

        let meta: AdminMetadata =
            fetcher
                .get_json(&meta_url)
                .await
                .map_err(|e| DownloadError::AdminMetadata {
                    country: country_code.to_string(),
                    level: level.to_string(),
                    url: meta_url.clone(),
                    reason: e.to_string(),
                })?;

        let geojson_url = meta.geojson_url.ok_or_else(|| DownloadError::MissingUrl {
            country: country_code.to_string(),
            level: level.to_string(),
        })?;

        let label = format!("{}-{}", country_code, level);
        fetcher
            .download_to(&geojson_url, &save_path, &label, progress)
            .await?;
    }

    let mean_area = measure(save_path.clone(), country_code, level).await?;
    Ok(AdminInfo::new(save_path, mean_area))
}

async fn measure(path: PathBuf, country_code: &str, level: AdminLevel) -> DownloadResult<f64> {
    tokio::task::spawn_blocking(move || area::mean_area(&path))
        .await
        .map_err(|e| DownloadError::Task(e.to_string()))?
        .map_err(|e| DownloadError::Area {
            country: country_code.to_string(),
            level: level.to_string(),
            source: e,
        })
}

/// Download every level for every country concurrently on one session.
pub async fn download_admin(
    country_codes: &[String],
    output_dir: &Path,
    overwrite: bool,
    sources: &SourcesConfig,
    progress: &dyn ProgressReporter,
) -> DownloadResult<BTreeMap<String, BTreeMap<AdminLevel, AdminInfo>>> {
    info!("Downloading the administrative boundaries...");
    let fetcher = HttpFetcher::for_downloads(sources)?;

    let jobs = country_codes.iter().flat_map(|code| {
        let fetcher = &fetcher;
        AdminLevel::ALL.into_iter().map(move |level| async move {
            let info = download_admin_level(
                fetcher,
                &sources.admin_api_url,
                code,
                level,
                output_dir,
                overwrite,
                progress,
            )
            .await?;
            Ok::<_, DownloadError>((code.clone(), level, info))
        })
    });

    let mut by_country: BTreeMap<String, BTreeMap<AdminLevel, AdminInfo>> = BTreeMap::new();
    for (code, level, info) in try_join_all(jobs).await? {
        by_country.entry(code).or_default().insert(level, info);
    }

    info!("Done downloading the administrative boundaries.");
    Ok(by_country)
}
