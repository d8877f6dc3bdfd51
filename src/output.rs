//! # Tabular Output
//!
//! Writes extracted series and slices to disk. The file extension picks the
//! format: `.parquet`/`.pq` for Parquet, `.csv` for CSV.

use crate::error::{Error, Result};
use log::debug;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// Supported table formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Parquet,
    Csv,
}

impl TableFormat {
    /// Infer the format from the extension of `path`.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("parquet") | Some("pq") => Ok(TableFormat::Parquet),
            Some("csv") => Ok(TableFormat::Csv),
            _ => Err(Error::Config(format!(
                "cannot infer export format of '{}': use a .parquet, .pq or .csv extension",
                path.display()
            ))),
        }
    }
}

/// Write `df` to `path`, creating missing parent directories.
///
/// Returns the format that was written.
pub fn write_dataframe<P: AsRef<Path>>(df: &DataFrame, path: P) -> Result<TableFormat> {
    let path = path.as_ref();
    let format = TableFormat::from_path(path)?;

    debug!("Writing DataFrame to {:?} file: {}", format, path.display());
    debug!("DataFrame shape: {:?}", df.shape());
    debug!("DataFrame schema:\n{:?}", df.schema());

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(path)?;
    let mut df = df.clone();
    match format {
        TableFormat::Parquet => {
            ParquetWriter::new(file).finish(&mut df)?;
        }
        TableFormat::Csv => {
            CsvWriter::new(file).include_header(true).finish(&mut df)?;
        }
    }

    debug!("Successfully wrote {}", path.display());
    Ok(format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn frame() -> DataFrame {
        df!(
            "time" => [0i64, 60_000, 120_000],
            "intensity" => [Some(2.0), None, Some(1.0)],
        )
        .unwrap()
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(TableFormat::from_path(Path::new("a.parquet")).unwrap(), TableFormat::Parquet);
        assert_eq!(TableFormat::from_path(Path::new("a.PQ")).unwrap(), TableFormat::Parquet);
        assert_eq!(TableFormat::from_path(Path::new("a.csv")).unwrap(), TableFormat::Csv);
        assert!(matches!(
            TableFormat::from_path(Path::new("a.xlsx")),
            Err(Error::Config(_))
        ));
        assert!(TableFormat::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn writes_parquet_that_reads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("series.parquet");
        assert_eq!(write_dataframe(&frame(), &path).unwrap(), TableFormat::Parquet);

        let back = ParquetReader::new(File::open(&path).unwrap()).finish().unwrap();
        assert_eq!(back.shape(), (3, 2));
        assert_eq!(back.column("intensity").unwrap().null_count(), 1);
    }

    #[test]
    fn writes_csv_with_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("series.csv");
        write_dataframe(&frame(), &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("time,intensity"));
        assert_eq!(lines.next(), Some("0,2.0"));
        assert_eq!(lines.next(), Some("60000,"));
    }
}
