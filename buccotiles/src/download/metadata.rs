//! Metadata API responses.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Dataset names carrying this marker are not openly licensed and are skipped.
pub const RESTRICTED_LICENSE_MARKER: &str = "OTHER-LICENSE";

/// geoBoundaries response for one country and level.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminMetadata {
    #[serde(rename = "gjDownloadURL")]
    pub geojson_url: Option<String>,
}

/// One entry of the EUBUCCO country listing.
#[derive(Debug, Clone, Deserialize)]
pub struct CountryDataset {
    #[serde(default)]
    pub gpkg: Option<DatasetFile>,
}

/// A downloadable file of a dataset entry.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetFile {
    pub name: String,
    pub download_link: String,
}

/// The country code embedded in a dataset name (`v0_1-FRA.gpkg.zip` → `FRA`).
///
/// The code ends at the next `-` or `.`, so `v0_1-FRA-2.gpkg.zip` is `FRA` too.
pub fn country_code_from_name(name: &str) -> Option<&str> {
    let (_, rest) = name.split_once('-')?;
    let code = rest.split(['-', '.']).next()?;
    (!code.is_empty()).then_some(code)
}

/// Map country codes to GeoPackage download links.
///
/// Entries without a GeoPackage, with a restricted license, or with a name
/// that carries no country code are left out.
pub fn building_links(listing: &[CountryDataset]) -> BTreeMap<String, String> {
    listing
        .iter()
        .filter_map(|entry| entry.gpkg.as_ref())
        .filter(|file| !file.name.contains(RESTRICTED_LICENSE_MARKER))
        .filter_map(|file| {
            country_code_from_name(&file.name)
                .map(|code| (code.to_string(), file.download_link.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_country_code_from_name() {
        assert_eq!(country_code_from_name("v0_1-FRA.gpkg.zip"), Some("FRA"));
        assert_eq!(country_code_from_name("v0_1-CYP.gpkg"), Some("CYP"));
        assert_eq!(country_code_from_name("v0_1-FRA-2.gpkg.zip"), Some("FRA"));
        assert_eq!(country_code_from_name("nodash.gpkg"), None);
        assert_eq!(country_code_from_name("v0_1-.gpkg"), None);
    }

    #[test]
    fn test_building_links_from_listing() {
        let listing: Vec<CountryDataset> = serde_json::from_str(
            r#"[
                {"gpkg": {"name": "v0_1-CYP.gpkg.zip", "download_link": "https://x/CYP"}},
                {"gpkg": {"name": "v0_1-DEU-OTHER-LICENSE.gpkg.zip", "download_link": "https://x/DEU"}},
                {"gpkg": {"name": "v0_1-MLT.gpkg.zip", "download_link": "https://x/MLT"}, "csv": {}},
                {"csv": {"name": "v0_1-ITA.csv.zip"}}
            ]"#,
        )
        .unwrap();

        let links = building_links(&listing);
        assert_eq!(links.len(), 2);
        assert_eq!(links["CYP"], "https://x/CYP");
        assert_eq!(links["MLT"], "https://x/MLT");
        assert!(!links.contains_key("DEU"));
    }

    #[test]
    fn test_admin_metadata_field_name() {
        let meta: AdminMetadata =
            serde_json::from_str(r#"{"boundaryISO": "CYP", "gjDownloadURL": "https://x/a.geojson"}"#)
                .unwrap();
        assert_eq!(meta.geojson_url.as_deref(), Some("https://x/a.geojson"));

        let meta: AdminMetadata = serde_json::from_str(r#"{"boundaryISO": "CYP"}"#).unwrap();
        assert!(meta.geojson_url.is_none());
    }
}
