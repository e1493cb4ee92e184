//! Building footprint downloads.

use std::collections::BTreeMap;
use std::path::Path;

use futures::future::try_join_all;
use tracing::{info, warn};

use super::error::{DownloadError, DownloadResult};
use super::http::{ensure_dir, HttpFetcher};
use super::metadata::{building_links, CountryDataset};
use super::progress::ProgressReporter;
use crate::config::SourcesConfig;
use crate::country::{safe_name, BuildingsInfo};
use crate::stage::should_skip;

/// `CYP.gpkg.zip`, with the code made filesystem-safe.
pub fn buildings_file_name(country_code: &str) -> String {
    format!("{}.gpkg.zip", safe_name(country_code))
}

/// Fetch the dataset listing and map country codes to download links.
pub async fn fetch_building_links(sources: &SourcesConfig) -> DownloadResult<BTreeMap<String, String>> {
    info!("Finding all buildings country codes and download links...");
    let fetcher = HttpFetcher::for_metadata(sources.listing_timeout)?;

    let listing: Vec<CountryDataset> = fetcher
        .get_json(&sources.buildings_api_url)
        .await
        .map_err(|e| DownloadError::Listing {
            url: sources.buildings_api_url.clone(),
            reason: e.to_string(),
        })?;

    let links = building_links(&listing);
    info!(countries = links.len(), "Done finding all buildings country codes and download links.");
    Ok(links)
}

/// Download one country's footprints.
pub async fn download_buildings_one(
    fetcher: &HttpFetcher,
    country_code: &str,
    data_url: &str,
    output_dir: &Path,
    overwrite: bool,
    progress: &dyn ProgressReporter,
) -> DownloadResult<BuildingsInfo> {
    ensure_dir(output_dir).await?;
    let save_path = output_dir.join(buildings_file_name(country_code));

    if !should_skip(&save_path, overwrite) {
        fetcher
            .download_to(data_url, &save_path, &safe_name(country_code), progress)
            .await?;
    }

    Ok(BuildingsInfo::new(save_path))
}

/// Download footprints for every requested country that has a link.
///
/// Codes missing from `links` are logged and left out of the result.
pub async fn download_buildings(
    links: &BTreeMap<String, String>,
    country_codes: &[String],
    output_dir: &Path,
    overwrite: bool,
    sources: &SourcesConfig,
    progress: &dyn ProgressReporter,
) -> DownloadResult<BTreeMap<String, BuildingsInfo>> {
    info!("Downloading the buildings...");
    let fetcher = HttpFetcher::for_downloads(sources)?;

    let wanted: Vec<(&String, &String)> = country_codes
        .iter()
        .filter_map(|code| match links.get(code) {
            Some(url) => Some((code, url)),
            None => {
                warn!(country = %code, "no building dataset available, skipping");
                None
            }
        })
        .collect();

    let jobs = wanted.into_iter().map(|(code, url)| {
        let fetcher = &fetcher;
        async move {
            let info =
                download_buildings_one(fetcher, code, url, output_dir, overwrite, progress).await?;
            Ok::<_, DownloadError>((code.clone(), info))
        }
    });

    let results: BTreeMap<String, BuildingsInfo> = try_join_all(jobs).await?.into_iter().collect();

    info!("Done downloading the buildings.");
    Ok(results)
}
