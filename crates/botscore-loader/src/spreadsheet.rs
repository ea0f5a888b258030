//! Spreadsheet reader using calamine
//!
//! Reads one column from XLSX, XLS or ODS workbooks. The first row of the
//! worksheet is the header.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use calamine::{open_workbook_auto, Data, Range, Reader};

use crate::delimited::header_position;
use crate::{float_to_id, FileType, LoaderError, Result, TableReader};

/// Spreadsheet reader
pub struct SpreadsheetReader {
    /// Worksheet to read (None = first non-empty sheet)
    pub sheet: Option<String>,
}

impl SpreadsheetReader {
    pub fn new() -> Self {
        Self { sheet: None }
    }

    /// Select a worksheet by name
    pub fn with_sheet(mut self, sheet: Option<String>) -> Self {
        self.sheet = sheet;
        self
    }

    /// Convert a Data cell to string
    fn cell_to_string(cell: &Data) -> String {
        match cell {
            Data::Empty => String::new(),
            Data::String(s) => s.trim().to_string(),
            // Integer ids are stored as floats by most writers
            Data::Float(f) => float_to_id(*f),
            Data::Int(i) => format!("{i}"),
            Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Data::Error(e) => format!("#ERROR: {e:?}"),
            Data::DateTime(dt) => format!("{dt}"),
            Data::DateTimeIso(s) => s.clone(),
            Data::DurationIso(s) => s.clone(),
        }
    }

    fn column_values(range: &Range<Data>, column: &str, path: &Path) -> Result<Vec<String>> {
        let mut rows = range.rows();

        let headers: Vec<String> = rows
            .next()
            .map(|row| row.iter().map(Self::cell_to_string).collect())
            .unwrap_or_default();

        let index = header_position(headers.iter().map(String::as_str), column).ok_or_else(
            || LoaderError::MissingColumn {
                path: path.display().to_string(),
                column: column.to_string(),
            },
        )?;

        Ok(rows
            .filter_map(|row| row.get(index))
            .filter(|cell| !matches!(cell, Data::Error(_)))
            .map(Self::cell_to_string)
            .filter(|value| !value.is_empty())
            .collect())
    }

    fn read_blocking(path: PathBuf, sheet: Option<String>, column: String) -> Result<Vec<String>> {
        if !path.exists() {
            return Err(LoaderError::IoError {
                path: path.display().to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }

        let mut workbook =
            open_workbook_auto(&path).map_err(|e| LoaderError::SpreadsheetError(e.to_string()))?;

        let range = match sheet {
            Some(name) => workbook
                .worksheet_range(&name)
                .map_err(|e| LoaderError::SpreadsheetError(format!("{name}: {e}")))?,
            None => {
                let names = workbook.sheet_names();
                Self::first_non_empty(&names, |name| {
                    workbook
                        .worksheet_range(name)
                        .map_err(|e| LoaderError::SpreadsheetError(format!("{name}: {e}")))
                })?
            }
        };

        Self::column_values(&range, &column, &path)
    }

    /// First worksheet holding at least one non-empty cell
    fn first_non_empty<F>(names: &[String], mut load: F) -> Result<Range<Data>>
    where
        F: FnMut(&str) -> Result<Range<Data>>,
    {
        for name in names {
            let range = load(name)?;
            if range.used_cells().next().is_some() {
                return Ok(range);
            }
            tracing::debug!(sheet = %name, "Skipping empty worksheet");
        }
        Err(LoaderError::SpreadsheetError(
            "workbook has no non-empty sheets".into(),
        ))
    }
}

impl Default for SpreadsheetReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TableReader for SpreadsheetReader {
    async fn read_column(&self, path: &Path, column: &str) -> Result<Vec<String>> {
        let path = path.to_path_buf();
        let sheet = self.sheet.clone();
        let column = column.to_string();

        tokio::task::spawn_blocking(move || Self::read_blocking(path, sheet, column))
            .await
            .map_err(|e| LoaderError::SpreadsheetError(format!("reader task failed: {e}")))?
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::Xlsx, FileType::Xls, FileType::Ods]
    }
}
