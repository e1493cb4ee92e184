//! Benchmarked file formats and how DuckDB reads them.

use std::fmt;
use std::path::Path;

use super::error::{BenchError, BenchResult};
use super::sql::quote_literal;

/// Format of a benchmarked file, from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    GeoPackage,
    FlatGeobuf,
    GeoParquet,
    /// Zipped GeoPackage, only measured for size.
    Zip,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> BenchResult<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "gpkg" => Ok(FileFormat::GeoPackage),
            "fgb" => Ok(FileFormat::FlatGeobuf),
            "parquet" => Ok(FileFormat::GeoParquet),
            "zip" => Ok(FileFormat::Zip),
            _ => Err(BenchError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Whether DuckDB can query files of this format.
    pub fn is_queryable(&self) -> bool {
        !matches!(self, FileFormat::Zip)
    }

    /// Table expression reading `path`, or `None` if it cannot be queried.
    ///
    /// GDAL formats go through `ST_Read`; parquet is read natively.
    pub fn source_expr(&self, path: &Path) -> Option<String> {
        let literal = quote_literal(&path.to_string_lossy());
        match self {
            FileFormat::GeoPackage | FileFormat::FlatGeobuf => Some(format!("ST_Read({})", literal)),
            FileFormat::GeoParquet => Some(literal),
            FileFormat::Zip => None,
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileFormat::GeoPackage => "GeoPackage",
            FileFormat::FlatGeobuf => "FlatGeobuf",
            FileFormat::GeoParquet => "GeoParquet",
            FileFormat::Zip => "zip",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_per_extension() {
        let gpkg = FileFormat::from_path(Path::new("v0_1-CYP.gpkg")).unwrap();
        assert_eq!(gpkg.source_expr(Path::new("v0_1-CYP.gpkg")).unwrap(), "ST_Read('v0_1-CYP.gpkg')");

        let fgb = FileFormat::from_path(Path::new("CYP.FGB")).unwrap();
        assert_eq!(fgb, FileFormat::FlatGeobuf);
        assert_eq!(fgb.source_expr(Path::new("CYP.fgb")).unwrap(), "ST_Read('CYP.fgb')");

        let parquet = FileFormat::from_path(Path::new("a.parquet")).unwrap();
        assert_eq!(parquet.source_expr(Path::new("a.parquet")).unwrap(), "'a.parquet'");

        let zip = FileFormat::from_path(Path::new("v0_1-CYP.zip")).unwrap();
        assert!(!zip.is_queryable());
        assert!(zip.source_expr(Path::new("v0_1-CYP.zip")).is_none());
    }

    #[test]
    fn test_unknown_extension() {
        assert!(FileFormat::from_path(Path::new("a.shp")).is_err());
        assert!(FileFormat::from_path(Path::new("noext")).is_err());
    }
}
