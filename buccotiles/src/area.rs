//! Mean polygon area of a boundary file.
//!
//! Boundaries are delivered as WGS84 GeoJSON. Areas are measured after
//! projecting to Web Mercator (EPSG:3857), so they are in "mercator square
//! metres", the unit the zoom allocator is calibrated against.

use std::f64::consts::FRAC_PI_4;
use std::fs;
use std::path::{Path, PathBuf};

use geo::{Area, Coord, Geometry, MapCoords};
use geojson::GeoJson;
use thiserror::Error;

/// WGS84 semi-major axis used by Web Mercator.
const EARTH_RADIUS: f64 = 6_378_137.0;

/// Web Mercator is undefined at the poles; latitudes are clamped to this.
const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Errors computing a mean area.
#[derive(Debug, Error)]
pub enum AreaError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse GeoJSON in {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("{} contains no geometries", .0.display())]
    Empty(PathBuf),
}

/// Project a WGS84 coordinate to Web Mercator metres.
pub fn to_web_mercator(c: Coord<f64>) -> Coord<f64> {
    let lat = c.y.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    Coord {
        x: EARTH_RADIUS * c.x.to_radians(),
        y: EARTH_RADIUS * (FRAC_PI_4 + lat / 2.0).tan().ln(),
    }
}

/// Mean Web Mercator area of every feature geometry in a GeoJSON document.
///
/// Features without a geometry are ignored; points and lines count with an
/// area of zero.
pub fn mean_area_of_geojson(geojson: &GeoJson) -> Option<f64> {
    let geometries: Vec<Geometry<f64>> = match geojson {
        GeoJson::FeatureCollection(collection) => collection
            .features
            .iter()
            .filter_map(|feature| feature.geometry.clone())
            .filter_map(|geometry| Geometry::<f64>::try_from(geometry).ok())
            .collect(),
        GeoJson::Feature(feature) => feature
            .geometry
            .clone()
            .and_then(|geometry| Geometry::<f64>::try_from(geometry).ok())
            .into_iter()
            .collect(),
        GeoJson::Geometry(geometry) => Geometry::<f64>::try_from(geometry.clone())
            .ok()
            .into_iter()
            .collect(),
    };

    if geometries.is_empty() {
        return None;
    }

    let total: f64 = geometries
        .iter()
        .map(|g| g.map_coords(to_web_mercator).unsigned_area())
        .sum();
    Some(total / geometries.len() as f64)
}

/// Read a GeoJSON file and compute its mean polygon area.
pub fn mean_area(path: &Path) -> Result<f64, AreaError> {
    let contents = fs::read_to_string(path).map_err(|e| AreaError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    let geojson: GeoJson = contents.parse().map_err(|e: geojson::Error| AreaError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    mean_area_of_geojson(&geojson).ok_or_else(|| AreaError::Empty(path.to_path_buf()))
}
