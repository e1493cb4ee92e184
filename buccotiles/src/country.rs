//! Per-country records threaded through the tile pipeline.
//!
//! Every pipeline stage takes the records by value and hands back updated
//! copies. A stage output is a [`StageOutput`] rather than an optional path,
//! so "never attempted" and "attempted but failed" stay distinguishable.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

/// Layer name used for the building footprints in generated tiles.
pub const BUILDINGS_LAYER: &str = "buildings";

/// Result type for record accessors.
pub type RecordResult<T> = Result<T, RecordError>;

/// Errors raised when a stage asks for an output that was never produced.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The requested path has not been produced by its stage.
    #[error("{what} for {country} is not available ({state})")]
    MissingPath {
        country: String,
        what: &'static str,
        state: String,
    },

    /// Unknown administrative level name.
    #[error("unknown administrative level: {0}")]
    UnknownLevel(String),
}

/// geoBoundaries administrative level, ordered from coarse to fine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AdminLevel {
    /// Country outline.
    Adm0,
    /// First-level subdivisions (regions, states).
    Adm1,
    /// Second-level subdivisions (districts, counties).
    Adm2,
}

impl AdminLevel {
    /// All levels downloaded for each country.
    pub const ALL: [AdminLevel; 3] = [AdminLevel::Adm0, AdminLevel::Adm1, AdminLevel::Adm2];

    /// The name used by the geoBoundaries API and as the tile layer name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminLevel::Adm0 => "ADM0",
            AdminLevel::Adm1 => "ADM1",
            AdminLevel::Adm2 => "ADM2",
        }
    }
}

impl fmt::Display for AdminLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdminLevel {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ADM0" => Ok(AdminLevel::Adm0),
            "ADM1" => Ok(AdminLevel::Adm1),
            "ADM2" => Ok(AdminLevel::Adm2),
            _ => Err(RecordError::UnknownLevel(s.to_string())),
        }
    }
}

/// Outcome of one pipeline stage for one item.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StageOutput {
    /// The stage has not been attempted for this item.
    #[default]
    NotStarted,
    /// The stage produced (or found) this file.
    Succeeded(PathBuf),
    /// The stage ran and failed.
    Failed(String),
}

impl StageOutput {
    /// Build an output from a path and a success flag.
    pub fn from_outcome(path: PathBuf, ok: bool, reason: impl Into<String>) -> Self {
        if ok {
            StageOutput::Succeeded(path)
        } else {
            StageOutput::Failed(reason.into())
        }
    }

    /// The produced path, if the stage succeeded.
    pub fn path(&self) -> Option<&Path> {
        match self {
            StageOutput::Succeeded(path) => Some(path),
            _ => None,
        }
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, StageOutput::Succeeded(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StageOutput::Failed(_))
    }

    /// The produced path, or a [`RecordError::MissingPath`] naming what was asked for.
    pub fn require(&self, country: &str, what: &'static str) -> RecordResult<&Path> {
        self.path().ok_or_else(|| RecordError::MissingPath {
            country: country.to_string(),
            what,
            state: self.to_string(),
        })
    }
}

impl fmt::Display for StageOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageOutput::NotStarted => write!(f, "not started"),
            StageOutput::Succeeded(path) => write!(f, "{}", path.display()),
            StageOutput::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// A downloaded administrative boundary file.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminInfo {
    pub geojson_path: PathBuf,
    /// Mean polygon area in square metres (Web Mercator).
    pub mean_area: f64,
    pub tiles: StageOutput,
}

impl AdminInfo {
    pub fn new(geojson_path: PathBuf, mean_area: f64) -> Self {
        Self {
            geojson_path,
            mean_area,
            tiles: StageOutput::NotStarted,
        }
    }
}

/// Downloaded building footprints and their derived files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildingsInfo {
    pub gpkg_zip_path: PathBuf,
    pub flatgeobuf: StageOutput,
    pub tiles: StageOutput,
}

impl BuildingsInfo {
    pub fn new(gpkg_zip_path: PathBuf) -> Self {
        Self {
            gpkg_zip_path,
            flatgeobuf: StageOutput::NotStarted,
            tiles: StageOutput::NotStarted,
        }
    }
}

/// How far a country has progressed through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CountryStage {
    Pending,
    AdminDownloaded,
    BuildingsDownloaded,
    Converted,
    Tiled,
    CountryMerged,
}

/// Everything the pipeline knows about one country.
#[derive(Debug, Clone, PartialEq)]
pub struct Country {
    pub code: String,
    pub admin: BTreeMap<AdminLevel, AdminInfo>,
    pub buildings: Option<BuildingsInfo>,
    pub merged: StageOutput,
}

impl Country {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            admin: BTreeMap::new(),
            buildings: None,
            merged: StageOutput::NotStarted,
        }
    }

    pub fn with_admin(mut self, admin: BTreeMap<AdminLevel, AdminInfo>) -> Self {
        self.admin = admin;
        self
    }

    pub fn with_buildings(mut self, buildings: BuildingsInfo) -> Self {
        self.buildings = Some(buildings);
        self
    }

    /// Mean polygon area for a level, if that level was downloaded.
    pub fn mean_area(&self, level: AdminLevel) -> Option<f64> {
        self.admin.get(&level).map(|info| info.mean_area)
    }

    /// Tile archives that a per-country join should merge.
    ///
    /// Layers whose tiles were never produced are skipped, buildings first.
    pub fn tile_inputs(&self) -> Vec<PathBuf> {
        let buildings = self
            .buildings
            .iter()
            .filter_map(|b| b.tiles.path().map(Path::to_path_buf));
        let admin = self
            .admin
            .values()
            .filter_map(|info| info.tiles.path().map(Path::to_path_buf));
        buildings.chain(admin).collect()
    }

    /// The furthest stage this country has reached.
    pub fn stage(&self) -> CountryStage {
        if self.merged.is_succeeded() {
            return CountryStage::CountryMerged;
        }
        let Some(buildings) = &self.buildings else {
            return if self.admin.is_empty() {
                CountryStage::Pending
            } else {
                CountryStage::AdminDownloaded
            };
        };
        if buildings.tiles.is_succeeded() {
            CountryStage::Tiled
        } else if buildings.flatgeobuf.is_succeeded() {
            CountryStage::Converted
        } else if self.admin.is_empty() {
            CountryStage::Pending
        } else {
            CountryStage::BuildingsDownloaded
        }
    }
}

/// Filesystem-safe version of a country code.
pub fn safe_name(code: &str) -> String {
    code.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// File name with every extension removed (`CYP.gpkg.zip` → `CYP`).
pub fn bare_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.split_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin(level_tiles: &[(AdminLevel, StageOutput)]) -> BTreeMap<AdminLevel, AdminInfo> {
        level_tiles
            .iter()
            .map(|(level, tiles)| {
                let mut info = AdminInfo::new(PathBuf::from(format!("CYP-{}.geojson", level)), 1.0);
                info.tiles = tiles.clone();
                (*level, info)
            })
            .collect()
    }

    #[test]
    fn test_admin_level_round_trips_names() {
        for level in AdminLevel::ALL {
            assert_eq!(level.as_str().parse::<AdminLevel>().unwrap(), level);
        }
        assert_eq!("adm1".parse::<AdminLevel>().unwrap(), AdminLevel::Adm1);
        assert!("ADM5".parse::<AdminLevel>().is_err());
    }

    #[test]
    fn test_safe_name() {
        assert_eq!(safe_name("CYP"), "CYP");
        assert_eq!(safe_name("FRA-2"), "FRA-2");
        assert_eq!(safe_name("a/b c"), "a_b_c");
    }

    #[test]
    fn test_bare_stem_strips_all_extensions() {
        assert_eq!(bare_stem(Path::new("/data/CYP.gpkg.zip")), "CYP");
        assert_eq!(bare_stem(Path::new("CYP-ADM1.geojson")), "CYP-ADM1");
        assert_eq!(bare_stem(Path::new("noext")), "noext");
    }

    #[test]
    fn test_require_reports_missing_path() {
        let output = StageOutput::NotStarted;
        let err = output.require("CYP", "FlatGeobuf").unwrap_err();
        assert_eq!(
            err.to_string(),
            "FlatGeobuf for CYP is not available (not started)"
        );

        let failed = StageOutput::Failed("exit 1".to_string());
        assert!(failed.require("CYP", "tiles").is_err());

        let done = StageOutput::Succeeded(PathBuf::from("/x.fgb"));
        assert_eq!(done.require("CYP", "tiles").unwrap(), Path::new("/x.fgb"));
    }

    #[test]
    fn test_tile_inputs_skips_unset_levels() {
        let mut buildings = BuildingsInfo::new(PathBuf::from("CYP.gpkg.zip"));
        buildings.tiles = StageOutput::Succeeded(PathBuf::from("CYP.pmtiles"));
        let country = Country::new("CYP")
            .with_admin(admin(&[
                (AdminLevel::Adm0, StageOutput::Succeeded(PathBuf::from("CYP-ADM0.pmtiles"))),
                (AdminLevel::Adm1, StageOutput::NotStarted),
                (AdminLevel::Adm2, StageOutput::Failed("boom".to_string())),
            ]))
            .with_buildings(buildings);

        assert_eq!(
            country.tile_inputs(),
            vec![PathBuf::from("CYP.pmtiles"), PathBuf::from("CYP-ADM0.pmtiles")]
        );
    }

    #[test]
    fn test_stage_progression() {
        let mut country = Country::new("CYP");
        assert_eq!(country.stage(), CountryStage::Pending);

        country = country.with_admin(admin(&[(AdminLevel::Adm0, StageOutput::NotStarted)]));
        assert_eq!(country.stage(), CountryStage::AdminDownloaded);

        let mut buildings = BuildingsInfo::new(PathBuf::from("CYP.gpkg.zip"));
        country = country.with_buildings(buildings.clone());
        assert_eq!(country.stage(), CountryStage::BuildingsDownloaded);

        buildings.flatgeobuf = StageOutput::Succeeded(PathBuf::from("CYP.fgb"));
        country = country.with_buildings(buildings.clone());
        assert_eq!(country.stage(), CountryStage::Converted);

        buildings.tiles = StageOutput::Succeeded(PathBuf::from("CYP.pmtiles"));
        country = country.with_buildings(buildings);
        assert_eq!(country.stage(), CountryStage::Tiled);

        country.merged = StageOutput::Succeeded(PathBuf::from("country/CYP.pmtiles"));
        assert_eq!(country.stage(), CountryStage::CountryMerged);
    }
}
