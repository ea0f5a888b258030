//! JSON record reader
//!
//! Reads one field from a JSON array of objects or from JSON Lines.

use std::path::Path;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{float_to_id, FileType, LoaderError, Result, TableReader};

/// JSON / JSON Lines reader
#[derive(Default)]
pub struct RecordReader;

impl RecordReader {
    pub fn new() -> Self {
        Self
    }

    /// Render an identifier value; nulls and empty strings yield nothing
    fn value_to_string(value: &Value) -> Option<String> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
                (Some(i), _, _) => Some(i.to_string()),
                (_, Some(u), _) => Some(u.to_string()),
                (_, _, Some(f)) => Some(float_to_id(f)),
                _ => Some(n.to_string()),
            },
            _ => None,
        }
    }

    fn parse_records(content: &str, file_type: FileType) -> Result<Vec<Map<String, Value>>> {
        match file_type {
            FileType::JsonLines => content
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(n, line)| {
                    serde_json::from_str(line)
                        .map_err(|e| LoaderError::JsonError(format!("line {}: {e}", n + 1)))
                })
                .collect(),
            _ => serde_json::from_str(content).map_err(|e| LoaderError::JsonError(e.to_string())),
        }
    }
}

#[async_trait]
impl TableReader for RecordReader {
    async fn read_column(&self, path: &Path, column: &str) -> Result<Vec<String>> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| LoaderError::IoError {
                path: path.display().to_string(),
                source: e,
            })?;

        let records = Self::parse_records(&content, FileType::from_path(path))?;

        if !records.is_empty() && !records.iter().any(|r| r.contains_key(column)) {
            return Err(LoaderError::MissingColumn {
                path: path.display().to_string(),
                column: column.to_string(),
            });
        }

        Ok(records
            .iter()
            .filter_map(|record| record.get(column))
            .filter_map(Self::value_to_string)
            .collect())
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::Json, FileType::JsonLines]
    }
}
