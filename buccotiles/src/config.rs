//! Configuration file handling.
//!
//! Settings live in an INI file, by default `~/.buccotiles/config.ini`:
//!
//! ```ini
//! [paths]
//! data_dir = ../data
//!
//! [pipeline]
//! workers = 8
//! overwrite = false
//! exclude = CZE
//! countries = CYP, MLT
//! buildings_max_zoom = 17
//! upload = true
//! upload_key = all_countries.pmtiles
//!
//! [sources]
//! admin_api_url = https://www.geoboundaries.org/api/current/gbOpen
//! buildings_api_url = https://api.eubucco.com/v0.1/countries
//!
//! [storage]
//! endpoint = https://fsn1.your-objectstorage.com
//! bucket = eubuccodissemination
//! credentials_file = .env
//!
//! [benchmark]
//! files = gpkg=v0_1-CYP.gpkg, zipped gpkg=v0_1-CYP.zip, ogr parquet=v0_1-CYP_ogr2ogr.parquet
//! ```
//!
//! A missing file yields the defaults. Values given on the command line
//! override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::{Ini, Properties};
use thiserror::Error;

use crate::zoom::{MaxZoom, MAX_ZOOM};

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("invalid value for [{section}] {key}: '{value}' ({reason})")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("no home directory found for the default config location")]
    NoHomeDir,
}

/// Default geoBoundaries metadata endpoint.
pub const DEFAULT_ADMIN_API_URL: &str = "https://www.geoboundaries.org/api/current/gbOpen";

/// Default EUBUCCO dataset listing endpoint.
pub const DEFAULT_BUILDINGS_API_URL: &str = "https://api.eubucco.com/v0.1/countries";

/// Default object storage endpoint.
pub const DEFAULT_STORAGE_ENDPOINT: &str = "https://fsn1.your-objectstorage.com";

/// Default bucket receiving the final archive.
pub const DEFAULT_STORAGE_BUCKET: &str = "eubuccodissemination";

/// Directory (under the home directory) holding the default config file.
pub const CONFIG_DIR_NAME: &str = ".buccotiles";

/// Default config file name.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Location of the default config file.
pub fn default_config_path() -> ConfigResult<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or(ConfigError::NoHomeDir)
}

/// Where every pipeline stage writes its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    pub data_dir: PathBuf,
}

impl DataLayout {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn admin_dir(&self) -> PathBuf {
        self.data_dir.join("admin_boundaries")
    }

    pub fn buildings_gpkg_dir(&self) -> PathBuf {
        self.data_dir.join("buildings").join("gpkg")
    }

    pub fn buildings_flatgeobuf_dir(&self) -> PathBuf {
        self.data_dir.join("buildings").join("flatgeobuf")
    }

    pub fn layer_tiles_dir(&self) -> PathBuf {
        self.data_dir.join("pmtiles").join("indiv")
    }

    pub fn country_tiles_dir(&self) -> PathBuf {
        self.data_dir.join("pmtiles").join("country")
    }

    pub fn merged_tiles_path(&self) -> PathBuf {
        self.data_dir.join("pmtiles").join("all_countries.pmtiles")
    }
}

impl Default for DataLayout {
    fn default() -> Self {
        Self::new("data")
    }
}

/// `[pipeline]` settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Worker pool size; `None` uses the CPU count.
    pub workers: Option<usize>,
    pub overwrite: bool,
    /// Country codes never processed.
    pub exclude: Vec<String>,
    /// Restrict the run to these codes; empty means every available country.
    pub countries: Vec<String>,
    pub buildings_max_zoom: MaxZoom,
    pub upload: bool,
    pub upload_key: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: None,
            overwrite: false,
            // Ships several layers in one GeoPackage, which ogr2ogr cannot flatten.
            exclude: vec!["CZE".to_string()],
            countries: Vec::new(),
            buildings_max_zoom: MaxZoom::Level(MAX_ZOOM),
            upload: true,
            upload_key: "all_countries.pmtiles".to_string(),
        }
    }
}

/// `[sources]` settings: metadata endpoints and network timeouts.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcesConfig {
    pub admin_api_url: String,
    pub buildings_api_url: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Total timeout for the building dataset listing.
    pub listing_timeout: Duration,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            admin_api_url: DEFAULT_ADMIN_API_URL.to_string(),
            buildings_api_url: DEFAULT_BUILDINGS_API_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(300),
            listing_timeout: Duration::from_secs(15),
        }
    }
}

/// `[storage]` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    /// dotenv-style file holding `ACCESS_KEY` and `SECRET_KEY`.
    pub credentials_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_STORAGE_ENDPOINT.to_string(),
            bucket: DEFAULT_STORAGE_BUCKET.to_string(),
            region: "fsn1".to_string(),
            credentials_file: PathBuf::from(".env"),
        }
    }
}

/// `[tools]` settings: program names of the external collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolsConfig {
    pub ogr2ogr: String,
    pub tippecanoe: String,
    pub tile_join: String,
    pub duckdb: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ogr2ogr: "ogr2ogr".to_string(),
            tippecanoe: "tippecanoe".to_string(),
            tile_join: "tile-join".to_string(),
            duckdb: "duckdb".to_string(),
        }
    }
}

/// `[benchmark]` settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkConfig {
    /// (display name, path) pairs; the first entry is the size baseline.
    pub files: Vec<(String, PathBuf)>,
    /// Side lengths of the bbox filter boxes, in the data's CRS units.
    pub bbox_sizes: Vec<f64>,
    pub iterations: usize,
    pub seed: Option<u64>,
    /// Where the temporary CSV export is written.
    pub export_dir: PathBuf,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            files: vec![
                ("gpkg".to_string(), PathBuf::from("v0_1-CYP.gpkg")),
                ("zipped gpkg".to_string(), PathBuf::from("v0_1-CYP.zip")),
                ("ogr parquet".to_string(), PathBuf::from("v0_1-CYP_ogr2ogr.parquet")),
                ("gpio parquet".to_string(), PathBuf::from("v0_1-CYP_gpio.parquet")),
            ],
            bbox_sizes: vec![500.0, 5000.0, 20000.0],
            iterations: 10,
            seed: None,
            export_dir: std::env::temp_dir(),
        }
    }
}

/// `[logging]` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for a daily rotated log file, if any.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

/// The whole configuration file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigFile {
    pub layout: DataLayout,
    pub pipeline: PipelineConfig,
    pub sources: SourcesConfig,
    pub storage: StorageConfig,
    pub tools: ToolsConfig,
    pub benchmark: BenchmarkConfig,
    pub logging: LoggingConfig,
}

impl ConfigFile {
    /// Load from `path`, or defaults if the file does not exist.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Parse from INI text.
    pub fn parse(text: &str) -> ConfigResult<Self> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Read {
            path: PathBuf::from("<string>"),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("paths")) {
            if let Some(dir) = section.get("data_dir") {
                config.layout = DataLayout::new(dir);
            }
        }

        if let Some(section) = ini.section(Some("pipeline")) {
            let p = &mut config.pipeline;
            if let Some(workers) = parse_opt::<usize>(section, "pipeline", "workers")? {
                p.workers = (workers > 0).then_some(workers);
            }
            if let Some(overwrite) = parse_bool(section, "pipeline", "overwrite")? {
                p.overwrite = overwrite;
            }
            if let Some(exclude) = section.get("exclude") {
                p.exclude = parse_codes(exclude);
            }
            if let Some(countries) = section.get("countries") {
                p.countries = parse_codes(countries);
            }
            if let Some(zoom) = section.get("buildings_max_zoom") {
                p.buildings_max_zoom = parse_max_zoom(zoom)?;
            }
            if let Some(upload) = parse_bool(section, "pipeline", "upload")? {
                p.upload = upload;
            }
            if let Some(key) = section.get("upload_key") {
                p.upload_key = key.trim().to_string();
            }
        }

        if let Some(section) = ini.section(Some("sources")) {
            let s = &mut config.sources;
            if let Some(url) = section.get("admin_api_url") {
                s.admin_api_url = url.trim().trim_end_matches('/').to_string();
            }
            if let Some(url) = section.get("buildings_api_url") {
                s.buildings_api_url = url.trim().to_string();
            }
            if let Some(secs) = parse_opt::<u64>(section, "sources", "connect_timeout_secs")? {
                s.connect_timeout = Duration::from_secs(secs);
            }
            if let Some(secs) = parse_opt::<u64>(section, "sources", "read_timeout_secs")? {
                s.read_timeout = Duration::from_secs(secs);
            }
            if let Some(secs) = parse_opt::<u64>(section, "sources", "listing_timeout_secs")? {
                s.listing_timeout = Duration::from_secs(secs);
            }
        }

        if let Some(section) = ini.section(Some("storage")) {
            let s = &mut config.storage;
            if let Some(v) = section.get("endpoint") {
                s.endpoint = v.trim().to_string();
            }
            if let Some(v) = section.get("bucket") {
                s.bucket = v.trim().to_string();
            }
            if let Some(v) = section.get("region") {
                s.region = v.trim().to_string();
            }
            if let Some(v) = section.get("credentials_file") {
                s.credentials_file = PathBuf::from(v.trim());
            }
        }

        if let Some(section) = ini.section(Some("tools")) {
            let t = &mut config.tools;
            for (key, slot) in [
                ("ogr2ogr", &mut t.ogr2ogr),
                ("tippecanoe", &mut t.tippecanoe),
                ("tile_join", &mut t.tile_join),
                ("duckdb", &mut t.duckdb),
            ] {
                if let Some(v) = section.get(key) {
                    *slot = v.trim().to_string();
                }
            }
        }

        if let Some(section) = ini.section(Some("benchmark")) {
            let b = &mut config.benchmark;
            if let Some(files) = section.get("files") {
                b.files = parse_named_files(files)?;
            }
            if let Some(sizes) = section.get("bbox_sizes") {
                b.bbox_sizes = sizes
                    .split(',')
                    .map(|s| {
                        s.trim().parse::<f64>().map_err(|e| ConfigError::InvalidValue {
                            section: "benchmark",
                            key: "bbox_sizes",
                            value: s.trim().to_string(),
                            reason: e.to_string(),
                        })
                    })
                    .collect::<ConfigResult<_>>()?;
            }
            if let Some(n) = parse_opt::<usize>(section, "benchmark", "iterations")? {
                b.iterations = n.max(1);
            }
            if let Some(seed) = parse_opt::<u64>(section, "benchmark", "seed")? {
                b.seed = Some(seed);
            }
            if let Some(dir) = section.get("export_dir") {
                b.export_dir = PathBuf::from(dir.trim());
            }
        }

        if let Some(section) = ini.section(Some("logging")) {
            if let Some(level) = section.get("level") {
                config.logging.level = level.trim().to_string();
            }
            if let Some(dir) = section.get("directory") {
                let dir = dir.trim();
                config.logging.directory = (!dir.is_empty()).then(|| PathBuf::from(dir));
            }
        }

        Ok(config)
    }
}

fn parse_opt<T>(section: &Properties, name: &'static str, key: &'static str) -> ConfigResult<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    section
        .get(key)
        .map(|v| {
            v.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
                section: name,
                key,
                value: v.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn parse_bool(section: &Properties, name: &'static str, key: &'static str) -> ConfigResult<Option<bool>> {
    section
        .get(key)
        .map(|v| match v.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                section: name,
                key,
                value: v.to_string(),
                reason: "expected true or false".to_string(),
            }),
        })
        .transpose()
}

/// Comma separated country codes, upper-cased.
pub fn parse_codes(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .collect()
}

/// `17` or `g`.
pub fn parse_max_zoom(value: &str) -> ConfigResult<MaxZoom> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("g") {
        return Ok(MaxZoom::Guess);
    }
    value
        .parse::<u8>()
        .ok()
        .filter(|z| *z <= 24)
        .map(MaxZoom::Level)
        .ok_or_else(|| ConfigError::InvalidValue {
            section: "pipeline",
            key: "buildings_max_zoom",
            value: value.to_string(),
            reason: "expected a zoom level (0-24) or 'g'".to_string(),
        })
}

/// `name=path, name=path`.
pub fn parse_named_files(value: &str) -> ConfigResult<Vec<(String, PathBuf)>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_named_file)
        .collect()
}

/// A single `name=path` entry.
pub fn parse_named_file(entry: &str) -> ConfigResult<(String, PathBuf)> {
    match entry.split_once('=') {
        Some((name, path)) if !name.trim().is_empty() && !path.trim().is_empty() => {
            Ok((name.trim().to_string(), PathBuf::from(path.trim())))
        }
        _ => Err(ConfigError::InvalidValue {
            section: "benchmark",
            key: "files",
            value: entry.to_string(),
            reason: "expected name=path".to_string(),
        }),
    }
}

/// Format a byte count for display (e.g. "1.5 GB").
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = ConfigFile::load(&temp.path().join("nope.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
        assert_eq!(config.pipeline.exclude, vec!["CZE".to_string()]);
        assert_eq!(config.sources.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.sources.read_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_parse_full_file() {
        let config = ConfigFile::parse(
            r#"
[paths]
data_dir = /srv/data

[pipeline]
workers = 6
overwrite = yes
exclude = cze, deu
countries = CYP,MLT
buildings_max_zoom = g
upload = false

[sources]
admin_api_url = http://localhost:9000/gbOpen/
read_timeout_secs = 60

[storage]
bucket = test-bucket
credentials_file = /etc/buccotiles/.env

[tools]
tile_join = /opt/tippecanoe/tile-join

[benchmark]
files = gpkg=a.gpkg, parquet=b.parquet
bbox_sizes = 100, 1000
iterations = 3
seed = 42

[logging]
level = debug
directory = /var/log/buccotiles
"#,
        )
        .unwrap();

        assert_eq!(config.layout.data_dir, PathBuf::from("/srv/data"));
        assert_eq!(
            config.layout.merged_tiles_path(),
            PathBuf::from("/srv/data/pmtiles/all_countries.pmtiles")
        );
        assert_eq!(config.pipeline.workers, Some(6));
        assert!(config.pipeline.overwrite);
        assert_eq!(config.pipeline.exclude, vec!["CZE", "DEU"]);
        assert_eq!(config.pipeline.countries, vec!["CYP", "MLT"]);
        assert_eq!(config.pipeline.buildings_max_zoom, MaxZoom::Guess);
        assert!(!config.pipeline.upload);
        assert_eq!(config.sources.admin_api_url, "http://localhost:9000/gbOpen");
        assert_eq!(config.sources.read_timeout, Duration::from_secs(60));
        assert_eq!(config.storage.bucket, "test-bucket");
        assert_eq!(config.storage.endpoint, DEFAULT_STORAGE_ENDPOINT);
        assert_eq!(config.tools.tile_join, "/opt/tippecanoe/tile-join");
        assert_eq!(config.tools.ogr2ogr, "ogr2ogr");
        assert_eq!(config.benchmark.files.len(), 2);
        assert_eq!(config.benchmark.bbox_sizes, vec![100.0, 1000.0]);
        assert_eq!(config.benchmark.iterations, 3);
        assert_eq!(config.benchmark.seed, Some(42));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.logging.directory,
            Some(PathBuf::from("/var/log/buccotiles"))
        );
    }

    #[test]
    fn test_invalid_value_names_the_key() {
        let err = ConfigFile::parse("[pipeline]\nworkers = many\n").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("[pipeline] workers"), "{}", msg);

        let err = ConfigFile::parse("[pipeline]\noverwrite = maybe\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "overwrite", .. }));
    }

    #[test]
    fn test_parse_max_zoom() {
        assert_eq!(parse_max_zoom("17").unwrap(), MaxZoom::Level(17));
        assert_eq!(parse_max_zoom("G").unwrap(), MaxZoom::Guess);
        assert!(parse_max_zoom("99").is_err());
        assert!(parse_max_zoom("high").is_err());
    }

    #[test]
    fn test_parse_named_file() {
        assert_eq!(
            parse_named_file("zipped gpkg=v0_1-CYP.zip").unwrap(),
            ("zipped gpkg".to_string(), PathBuf::from("v0_1-CYP.zip"))
        );
        assert!(parse_named_file("no-separator").is_err());
        assert!(parse_named_file("=path").is_err());
    }

    #[test]
    fn test_data_layout() {
        let layout = DataLayout::new("/d");
        assert_eq!(layout.admin_dir(), PathBuf::from("/d/admin_boundaries"));
        assert_eq!(layout.buildings_gpkg_dir(), PathBuf::from("/d/buildings/gpkg"));
        assert_eq!(
            layout.buildings_flatgeobuf_dir(),
            PathBuf::from("/d/buildings/flatgeobuf")
        );
        assert_eq!(layout.layer_tiles_dir(), PathBuf::from("/d/pmtiles/indiv"));
        assert_eq!(layout.country_tiles_dir(), PathBuf::from("/d/pmtiles/country"));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024 / 2), "1.5 GB");
    }
}
