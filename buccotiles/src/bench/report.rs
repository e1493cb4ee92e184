//! Benchmark results and their text rendering.

use std::fmt;
use std::time::Duration;

use super::scenario::TimingStats;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Bytes to mebibytes.
pub fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

/// How much smaller `size` is than `baseline`, in percent.
///
/// Negative when `size` is larger; `None` for an empty baseline.
pub fn percent_smaller(baseline: f64, size: f64) -> Option<f64> {
    if baseline <= 0.0 {
        return None;
    }
    Some((baseline - size) * 100.0 / baseline)
}

/// On-disk size of one file.
#[derive(Debug, Clone, PartialEq)]
pub struct SizeRow {
    pub name: String,
    /// `None` when the file does not exist.
    pub size_mb: Option<f64>,
    /// Relative to the first file; `None` for the baseline itself.
    pub percent_smaller: Option<f64>,
}

/// One timed query against one file.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTiming {
    pub name: String,
    pub elapsed: Duration,
}

/// CSV export of one file.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportTiming {
    pub name: String,
    pub elapsed: Duration,
    pub csv_mb: f64,
}

/// Bbox filter runs of one box size against one file.
#[derive(Debug, Clone, PartialEq)]
pub struct BboxTiming {
    pub name: String,
    pub size: f64,
    pub stats: TimingStats,
}

/// Everything one benchmark run measured.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BenchReport {
    pub sizes: Vec<SizeRow>,
    pub counts: Vec<QueryTiming>,
    pub exports: Vec<ExportTiming>,
    pub min_max: Vec<QueryTiming>,
    pub averages: Vec<QueryTiming>,
    pub scenario_count: usize,
    pub bbox: Vec<BboxTiming>,
    /// Why the bbox test did not run, if it did not.
    pub bbox_skipped: Option<String>,
    /// Per-file problems that did not stop the run.
    pub errors: Vec<(String, String)>,
}

impl fmt::Display for BenchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Test 1: Storage Size Test")?;
        for row in &self.sizes {
            match (row.size_mb, row.percent_smaller) {
                (None, _) => writeln!(f, "File {:<20} not found.", row.name)?,
                (Some(mb), None) => writeln!(f, "{:<20} : {:.2} MB", row.name, mb)?,
                (Some(mb), Some(pct)) => {
                    writeln!(f, "{:<20} : {:.2} MB ({:.1}% smaller)", row.name, mb, pct)?
                }
            }
        }

        writeln!(f, "\nTest 2: Counting all rows")?;
        for t in &self.counts {
            writeln!(f, "{:<20} : {:.6} seconds.", t.name, t.elapsed.as_secs_f64())?;
        }

        writeln!(f, "\nTest 3: Reading the full file - exporting it as CSV")?;
        for t in &self.exports {
            writeln!(
                f,
                "{:<20} : {:.6} seconds (wrote CSV file of {:.1} MB)",
                t.name,
                t.elapsed.as_secs_f64(),
                t.csv_mb
            )?;
        }

        writeln!(f, "\nTest 4: Attribute access")?;
        for t in &self.min_max {
            writeln!(f, "{:<20} : min-max in {:.6} seconds.", t.name, t.elapsed.as_secs_f64())?;
        }
        for t in &self.averages {
            writeln!(f, "{:<20} : avg in {:.6} seconds", t.name, t.elapsed.as_secs_f64())?;
        }

        writeln!(f, "\nTest 5: BBox filtering")?;
        match &self.bbox_skipped {
            Some(reason) => writeln!(f, "{}", reason)?,
            None => {
                writeln!(f, "Generated {} test scenarios.", self.scenario_count)?;
                for t in &self.bbox {
                    writeln!(f, "{:<20} | Size: {:<6}m | {}", t.name, t.size, t.stats)?;
                }
            }
        }

        if !self.errors.is_empty() {
            writeln!(f, "\nErrors")?;
            for (name, reason) in &self.errors {
                writeln!(f, "{:<20} : {}", name, reason)?;
            }
        }
        Ok(())
    }
}
