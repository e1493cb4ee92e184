//! DuckDB access through its command line client.
//!
//! Every statement runs in a fresh `duckdb` process with the spatial
//! extension loaded, and rows come back as JSON (`duckdb -json`). The
//! extension is installed once, up front, by [`DuckDb::install_spatial`].

use std::path::Path;

use serde_json::{Map, Value};

use super::error::{BenchError, BenchResult};
use crate::command::{CommandResult, CommandRunner, ToolCommand};

/// Statement prepended to every invocation.
const LOAD_SPATIAL: &str = "LOAD spatial;";

const INSTALL_SPATIAL: &str = "INSTALL spatial;";

/// Column names tried, in order, before falling back to the column type.
const GEOMETRY_COLUMN_NAMES: [&str; 2] = ["geometry", "geom"];

/// One result row, keyed by column name.
pub type Row = Map<String, Value>;

/// Quote a string as a SQL literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quote an identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A `duckdb` executable run through a [`CommandRunner`].
pub struct DuckDb<'a> {
    runner: &'a dyn CommandRunner,
    program: &'a str,
}

impl<'a> DuckDb<'a> {
    pub fn new(runner: &'a dyn CommandRunner, program: &'a str) -> Self {
        Self { runner, program }
    }

    fn command(&self, sql: &str) -> ToolCommand {
        ToolCommand::new(self.program)
            .arg("-json")
            .arg("-c")
            .arg(format!("{} {}", LOAD_SPATIAL, sql))
    }

    /// Install the spatial extension. Run once before any timed statement.
    pub fn install_spatial(&self) -> CommandResult<()> {
        let command = ToolCommand::new(self.program).arg("-c").arg(INSTALL_SPATIAL);
        self.runner.run(&command)
    }

    /// Run statements whose output is not needed.
    pub fn execute(&self, sql: &str) -> CommandResult<()> {
        self.runner.run(&self.command(sql))
    }

    /// Run a query and return the rows of its last result set.
    pub fn query(&self, sql: &str) -> BenchResult<Vec<Row>> {
        let stdout = self.runner.output(&self.command(sql))?;
        parse_rows(&stdout)
    }
}

/// Rows of the last JSON array printed by `duckdb -json`.
///
/// Statements without a result set print nothing, so empty output is no rows.
pub fn parse_rows(stdout: &str) -> BenchResult<Vec<Row>> {
    let mut last = Vec::new();
    for batch in serde_json::Deserializer::from_str(stdout).into_iter::<Vec<Row>>() {
        last = batch.map_err(|e| BenchError::Output(e.to_string()))?;
    }
    Ok(last)
}

/// A column from `DESCRIBE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub data_type: String,
}

/// Columns of a `DESCRIBE` result.
pub fn columns_from_rows(rows: &[Row]) -> Vec<Column> {
    rows.iter()
        .filter_map(|row| {
            let name = row.get("column_name")?.as_str()?;
            let data_type = row.get("column_type").and_then(Value::as_str).unwrap_or("");
            Some(Column {
                name: name.to_string(),
                data_type: data_type.to_string(),
            })
        })
        .collect()
}

/// Pick the geometry column of a table.
///
/// `geometry` wins over `geom`; otherwise the first column typed `GEOMETRY`.
pub fn geometry_column(columns: &[Column], path: &Path) -> BenchResult<String> {
    for candidate in GEOMETRY_COLUMN_NAMES {
        if columns.iter().any(|c| c.name == candidate) {
            return Ok(candidate.to_string());
        }
    }
    columns
        .iter()
        .find(|c| c.data_type.to_ascii_uppercase().starts_with("GEOMETRY"))
        .map(|c| c.name.clone())
        .ok_or_else(|| BenchError::NoGeometryColumn {
            path: path.to_path_buf(),
            columns: columns.iter().map(|c| c.name.clone()).collect(),
        })
}

/// First value of the first row as a number.
pub fn scalar_f64(rows: &[Row]) -> Option<f64> {
    rows.first()?.values().next()?.as_f64()
}

/// A named value of the first row as a number.
pub fn field_f64(rows: &[Row], name: &str) -> Option<f64> {
    rows.first()?.get(name)?.as_f64()
}

pub fn describe_sql(source: &str) -> String {
    format!("DESCRIBE SELECT * FROM {};", source)
}

pub fn count_sql(source: &str) -> String {
    format!("SELECT count(*) FROM {};", source)
}

pub fn min_max_sql(source: &str, column: &str) -> String {
    let column = quote_ident(column);
    format!(
        "SELECT min({c}) AS min_value, max({c}) AS max_value FROM {s};",
        c = column,
        s = source
    )
}

pub fn avg_sql(source: &str, column: &str) -> String {
    format!("SELECT avg({}) FROM {};", quote_ident(column), source)
}

/// Export every column as `;`-separated CSV, geometry as WKT.
pub fn csv_export_sql(source: &str, geometry: &str, output: &Path) -> String {
    let geometry = quote_ident(geometry);
    format!(
        "COPY(SELECT * EXCLUDE {g}, ST_AsText({g}) AS wkt FROM {s}) TO {o} WITH (HEADER, DELIMITER ';');",
        g = geometry,
        s = source,
        o = quote_literal(&output.to_string_lossy()),
    )
}

/// Bounding box of every geometry, as `minx, miny, maxx, maxy`.
pub fn extent_sql(source: &str, geometry: &str) -> String {
    format!(
        "SELECT ST_XMin(e) AS minx, ST_YMin(e) AS miny, ST_XMax(e) AS maxx, ST_YMax(e) AS maxy \
         FROM (SELECT ST_Extent_Agg({}) AS e FROM {});",
        quote_ident(geometry),
        source
    )
}

/// Count the features intersecting an axis-aligned box.
pub fn bbox_count_sql(source: &str, geometry: &str, bbox: [f64; 4]) -> String {
    let [minx, miny, maxx, maxy] = bbox;
    format!(
        "SELECT count(*) FROM {} WHERE ST_Intersects({}, ST_MakeEnvelope({}, {}, {}, {}));",
        source,
        quote_ident(geometry),
        minx,
        miny,
        maxx,
        maxy
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::RecordingRunner;

    fn column(name: &str, data_type: &str) -> Column {
        Column {
            name: name.to_string(),
            data_type: data_type.to_string(),
        }
    }

    #[test]
    fn test_quote_literal_escapes_quotes() {
        assert_eq!(quote_literal("it's.gpkg"), "'it''s.gpkg'");
    }

    #[test]
    fn test_parse_rows_takes_last_result_set() {
        let stdout = "[{\"a\":1}]\n[{\"count_star()\":42}]\n";
        let rows = parse_rows(stdout).unwrap();
        assert_eq!(scalar_f64(&rows), Some(42.0));
    }

    #[test]
    fn test_parse_rows_empty_output() {
        assert!(parse_rows("").unwrap().is_empty());
        assert!(parse_rows("not json").is_err());
    }

    #[test]
    fn test_geometry_column_prefers_geometry_name() {
        let cols = vec![column("geom", "GEOMETRY"), column("geometry", "BLOB")];
        assert_eq!(geometry_column(&cols, Path::new("a")).unwrap(), "geometry");

        let cols = vec![column("id", "VARCHAR"), column("geom", "GEOMETRY")];
        assert_eq!(geometry_column(&cols, Path::new("a")).unwrap(), "geom");
    }

    #[test]
    fn test_geometry_column_falls_back_to_type() {
        let cols = vec![column("id", "VARCHAR"), column("shape", "GEOMETRY('EPSG:3035')")];
        assert_eq!(geometry_column(&cols, Path::new("a")).unwrap(), "shape");
    }

    #[test]
    fn test_geometry_column_missing_is_an_error() {
        let cols = vec![column("id", "VARCHAR"), column("height", "DOUBLE")];
        let err = geometry_column(&cols, Path::new("x.parquet")).unwrap_err();
        assert!(err.to_string().contains("x.parquet"));
        assert!(err.to_string().contains("height"));
    }

    #[test]
    fn test_columns_from_describe_rows() {
        let rows = parse_rows(
            r#"[{"column_name":"id","column_type":"VARCHAR"},{"column_name":"geom","column_type":"GEOMETRY"}]"#,
        )
        .unwrap();
        let cols = columns_from_rows(&rows);
        assert_eq!(cols, vec![column("id", "VARCHAR"), column("geom", "GEOMETRY")]);
    }

    #[test]
    fn test_query_loads_spatial_and_requests_json() {
        let runner = RecordingRunner::new().with_stdout(r#"[{"count_star()":7}]"#);
        let db = DuckDb::new(&runner, "duckdb");

        let rows = db.query(&count_sql("'a.parquet'")).unwrap();

        assert_eq!(scalar_f64(&rows), Some(7.0));
        let args = runner.recorded()[0].args_lossy();
        assert_eq!(args[0], "-json");
        assert_eq!(args[1], "-c");
        assert_eq!(args[2], "LOAD spatial; SELECT count(*) FROM 'a.parquet';");
    }

    #[test]
    fn test_install_spatial_is_its_own_command() {
        let runner = RecordingRunner::new();
        DuckDb::new(&runner, "duckdb").install_spatial().unwrap();

        let recorded = runner.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].args_lossy(), vec!["-c", "INSTALL spatial;"]);
    }

    #[test]
    fn test_bbox_count_sql() {
        let sql = bbox_count_sql("ST_Read('a.gpkg')", "geom", [1.0, 2.0, 501.0, 502.0]);
        assert_eq!(
            sql,
            "SELECT count(*) FROM ST_Read('a.gpkg') WHERE ST_Intersects(\"geom\", ST_MakeEnvelope(1, 2, 501, 502));"
        );
    }

    #[test]
    fn test_csv_export_sql() {
        let sql = csv_export_sql("'a.parquet'", "geometry", Path::new("/tmp/out.csv"));
        assert!(sql.contains("EXCLUDE \"geometry\""));
        assert!(sql.contains("ST_AsText(\"geometry\") AS wkt"));
        assert!(sql.ends_with("TO '/tmp/out.csv' WITH (HEADER, DELIMITER ';');"));
    }
}
