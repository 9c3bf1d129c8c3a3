//! Data loading utilities

use crate::error::{PipelineError, Result};
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where the raw records come from
#[derive(Debug, Clone)]
pub enum DataSource {
    /// A file on disk; the format is chosen from the extension
    Path(PathBuf),
    /// An already materialized frame
    Frame(DataFrame),
}

impl DataSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        DataSource::Path(path.into())
    }

    /// Materialize the source as a frame
    pub fn load(&self) -> Result<DataFrame> {
        match self {
            DataSource::Path(path) => DataLoader::new().load_auto(path),
            DataSource::Frame(df) => Ok(df.clone()),
        }
    }
}

/// Data loader for CSV, Parquet and JSON files.
///
/// All failures are reported as ingestion errors: a source that cannot be read is
/// fatal for the run.
pub struct DataLoader {
    infer_schema_length: usize,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    /// Create a new data loader
    pub fn new() -> Self {
        Self {
            infer_schema_length: 10_000,
        }
    }

    /// Load a delimited text file with a header row
    pub fn load_csv(&self, path: &Path, delimiter: u8) -> Result<DataFrame> {
        let file = File::open(path).map_err(|e| read_error(path, e))?;

        let parse_opts = CsvParseOptions::default().with_separator(delimiter);

        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(self.infer_schema_length))
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(file)
            .finish()
            .map_err(|e| read_error(path, e))
    }

    /// Load a Parquet file
    pub fn load_parquet(&self, path: &Path) -> Result<DataFrame> {
        let file = File::open(path).map_err(|e| read_error(path, e))?;
        ParquetReader::new(file).finish().map_err(|e| read_error(path, e))
    }

    /// Load a JSON file
    pub fn load_json(&self, path: &Path) -> Result<DataFrame> {
        let file = File::open(path).map_err(|e| read_error(path, e))?;
        JsonReader::new(file).finish().map_err(|e| read_error(path, e))
    }

    /// Detect file format from extension and load
    pub fn load_auto(&self, path: &Path) -> Result<DataFrame> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        debug!(path = %path.display(), format = %ext, "Loading source");

        match ext.as_str() {
            "csv" | "" => self.load_csv(path, b','),
            "tsv" => self.load_csv(path, b'\t'),
            "parquet" | "pq" => self.load_parquet(path),
            "json" => self.load_json(path),
            other => Err(PipelineError::Ingestion(format!(
                "unsupported file format '{}' for {}",
                other,
                path.display()
            ))),
        }
    }
}

fn read_error(path: &Path, err: impl std::fmt::Display) -> PipelineError {
    PipelineError::Ingestion(format!("cannot read {}: {}", path.display(), err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_csv() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "tenure,contract,churn").unwrap();
        writeln!(file, "1,Month-to-month,Yes").unwrap();
        writeln!(file, "40,Two year,No").unwrap();
        file.flush().unwrap();

        let df = DataLoader::new().load_auto(file.path()).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 3);
    }

    #[test]
    fn test_unreadable_source() {
        let err = DataLoader::new()
            .load_auto(Path::new("/nonexistent/churn.csv"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Ingestion(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = DataLoader::new().load_auto(Path::new("data.xlsx")).unwrap_err();
        assert!(err.to_string().contains("unsupported"));
    }
}
