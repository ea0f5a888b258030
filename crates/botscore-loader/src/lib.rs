//! botscore Loader - Account identifiers from tabular samples
//!
//! Supports reading the identifier column of:
//! - Delimited text (CSV, TSV)
//! - Spreadsheets (XLSX, XLSM, XLS, ODS)
//! - JSON record arrays and JSON Lines
//!
//! Each reader implements the `TableReader` trait and returns the raw
//! column values. `SampleSource` deduplicates them in first-occurrence
//! order and slices the requested index range.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use botscore_core::{AccountId, IdRange, InputConfig};
use thiserror::Error;

pub mod delimited;
pub mod records;
pub mod spreadsheet;

pub use delimited::DelimitedReader;
pub use records::RecordReader;
pub use spreadsheet::SpreadsheetReader;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while loading identifiers
#[derive(Error, Debug)]
pub enum LoaderError {
    /// File format is not supported
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// IO error while reading the file
    #[error("IO error reading file: {path}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Identifier column not present in the header
    #[error("Column '{column}' not found in {path}")]
    MissingColumn { path: String, column: String },

    /// Delimited text parsing error
    #[error("CSV parsing error: {0}")]
    CsvError(String),

    /// Spreadsheet parsing error
    #[error("Spreadsheet parsing error: {0}")]
    SpreadsheetError(String),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

pub type Result<T> = std::result::Result<T, LoaderError>;

// ============================================================================
// File Types
// ============================================================================

/// Supported sample file types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Csv,
    Tsv,
    Xlsx,
    Xls,
    Ods,
    Json,
    JsonLines,
    Unknown,
}

impl FileType {
    /// Detect file type from extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "csv" => Self::Csv,
            "tsv" | "tab" => Self::Tsv,
            "xlsx" | "xlsm" => Self::Xlsx,
            "xls" => Self::Xls,
            "ods" => Self::Ods,
            "json" => Self::Json,
            "jsonl" | "ndjson" => Self::JsonLines,
            _ => Self::Unknown,
        }
    }

    /// Detect file type from path
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Csv => write!(f, "csv"),
            Self::Tsv => write!(f, "tsv"),
            Self::Xlsx => write!(f, "xlsx"),
            Self::Xls => write!(f, "xls"),
            Self::Ods => write!(f, "ods"),
            Self::Json => write!(f, "json"),
            Self::JsonLines => write!(f, "jsonl"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ============================================================================
// Reader Trait
// ============================================================================

/// Trait for table readers
#[async_trait]
pub trait TableReader: Send + Sync {
    /// Read every non-empty value of `column`, in row order
    async fn read_column(&self, path: &Path, column: &str) -> Result<Vec<String>>;

    /// Get supported file types
    fn supported_types(&self) -> &[FileType];

    /// Check if this reader can handle a file type
    fn can_read(&self, file_type: FileType) -> bool {
        self.supported_types().contains(&file_type)
    }
}

/// Registry of table readers, selected by file type
pub struct ReaderRegistry {
    readers: Vec<Box<dyn TableReader>>,
}

impl ReaderRegistry {
    /// Create an empty registry
    pub fn empty() -> Self {
        Self {
            readers: Vec::new(),
        }
    }

    /// Create a registry with the built-in readers
    pub fn new() -> Self {
        Self::with_sheet(None)
    }

    /// Built-in readers, with spreadsheets read from `sheet` when given
    pub fn with_sheet(sheet: Option<String>) -> Self {
        let mut registry = Self::empty();
        registry.register(DelimitedReader::new());
        registry.register(SpreadsheetReader::new().with_sheet(sheet));
        registry.register(RecordReader::new());
        registry
    }

    /// Register a reader
    pub fn register<R: TableReader + 'static>(&mut self, reader: R) {
        self.readers.push(Box::new(reader));
    }

    /// Find a reader for the file type
    pub fn find_reader(&self, file_type: FileType) -> Option<&dyn TableReader> {
        self.readers
            .iter()
            .find(|r| r.can_read(file_type))
            .map(|r| r.as_ref())
    }

    /// Read a column using the reader registered for the path's extension
    pub async fn read_column(&self, path: &Path, column: &str) -> Result<Vec<String>> {
        let file_type = FileType::from_path(path);
        let reader = self
            .find_reader(file_type)
            .ok_or_else(|| LoaderError::UnsupportedFormat(path.display().to_string()))?;

        reader.read_column(path, column).await
    }
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Sample Source
// ============================================================================

/// The sample file and the column that holds account identifiers
#[derive(Debug, Clone)]
pub struct SampleSource {
    pub path: PathBuf,
    pub column: String,
    pub sheet: Option<String>,
}

impl SampleSource {
    pub fn new(path: impl Into<PathBuf>, column: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            column: column.into(),
            sheet: None,
        }
    }

    pub fn from_config(config: &InputConfig) -> Self {
        Self {
            path: config.path.clone(),
            column: config.column.clone(),
            sheet: config.sheet.clone(),
        }
    }

    /// Read the spreadsheet worksheet `sheet` instead of the first one
    pub fn with_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = Some(sheet.into());
        self
    }

    /// Load the deduplicated identifier sequence
    ///
    /// The file is reopened and reparsed on every call.
    pub async fn load_identifiers(&self) -> Result<Vec<AccountId>> {
        let registry = ReaderRegistry::with_sheet(self.sheet.clone());
        let values = registry.read_column(&self.path, &self.column).await?;
        let ids = unique_in_order(values);

        tracing::debug!(
            path = %self.path.display(),
            unique = ids.len(),
            "Loaded sample identifiers"
        );

        Ok(ids)
    }

    /// Load the identifiers at positions `[range.start, range.end)`
    pub async fn load_slice(&self, range: IdRange) -> Result<Vec<AccountId>> {
        let ids = self.load_identifiers().await?;
        Ok(slice_range(ids, range))
    }
}

/// Deduplicate, keeping the first occurrence of each value in order
pub fn unique_in_order<I, S>(values: I) -> Vec<AccountId>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .map(Into::into)
        .filter(|value| seen.insert(value.clone()))
        .map(AccountId::from)
        .collect()
}

/// Slice with sequence semantics: `end` is clamped to the length and an
/// empty or out-of-bounds range yields nothing
pub fn slice_range<T>(mut items: Vec<T>, range: IdRange) -> Vec<T> {
    let end = range.end.min(items.len());
    if range.start >= end {
        return Vec::new();
    }
    items.truncate(end);
    items.split_off(range.start)
}

/// Render a numeric identifier. Integral values print without a fraction
/// as long as they fit an `i64`.
pub(crate) fn float_to_id(f: f64) -> String {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        format!("{}", f as i64)
    } else {
        format!("{f}")
    }
}

// ============================================================================
// Tests
// ============================================================================
