//! Delimited text reader using csv-async
//!
//! Reads one column from CSV or TSV files whose first row is a header.

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;

use crate::{FileType, LoaderError, Result, TableReader};

/// CSV/TSV reader
pub struct DelimitedReader {
    /// Delimiter override (inferred from the extension when unset)
    pub delimiter: Option<u8>,
}

impl DelimitedReader {
    pub fn new() -> Self {
        Self { delimiter: None }
    }

    /// Force a delimiter regardless of extension
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    fn delimiter_for(&self, path: &Path) -> u8 {
        self.delimiter.unwrap_or(match FileType::from_path(path) {
            FileType::Tsv => b'\t',
            _ => b',',
        })
    }
}

impl Default for DelimitedReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Find `column` in a header row, ignoring surrounding whitespace and a BOM
pub(crate) fn header_position<'a>(
    headers: impl IntoIterator<Item = &'a str>,
    column: &str,
) -> Option<usize> {
    headers
        .into_iter()
        .position(|h| h.trim_start_matches('\u{feff}').trim() == column)
}

#[async_trait]
impl TableReader for DelimitedReader {
    async fn read_column(&self, path: &Path, column: &str) -> Result<Vec<String>> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| LoaderError::IoError {
                path: path.display().to_string(),
                source: e,
            })?;

        let mut reader = csv_async::AsyncReaderBuilder::new()
            .delimiter(self.delimiter_for(path))
            .flexible(true)
            .create_reader(file);

        let headers = reader
            .headers()
            .await
            .map_err(|e| LoaderError::CsvError(e.to_string()))?;

        let index =
            header_position(headers.iter(), column).ok_or_else(|| LoaderError::MissingColumn {
                path: path.display().to_string(),
                column: column.to_string(),
            })?;

        let mut values = Vec::new();
        let mut records = reader.records();
        while let Some(record) = records.next().await {
            let record = record.map_err(|e| LoaderError::CsvError(e.to_string()))?;
            match record.get(index).map(str::trim) {
                Some(value) if !value.is_empty() => values.push(value.to_string()),
                _ => {}
            }
        }

        Ok(values)
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::Csv, FileType::Tsv]
    }
}
