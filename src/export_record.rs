/// Export Record Module
///
/// Reads the locally processed date range (`upload.json`). The file is written
/// by the external processing command; this service only ever reads it.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;

use crate::dates::parse_timestamp;
use crate::error::UpdateError;

/// One entry of `upload.json`, as written by the processing pipeline
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExportRange {
    #[serde(default)]
    start_date: Option<String>,
    end_date: String,
}

/// The date range that has already been turned into analytics artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRecord {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: DateTime<Utc>,
}

impl ExportRecord {
    /// Parse the contents of an export-record file. Only the first element counts.
    pub fn parse(contents: &str) -> Result<Self, UpdateError> {
        let ranges: Vec<RawExportRange> = serde_json::from_str(contents)
            .map_err(|e| UpdateError::LocalState(format!("invalid export record: {}", e)))?;

        let first = ranges
            .into_iter()
            .next()
            .ok_or_else(|| UpdateError::LocalState("export record is empty".to_string()))?;

        let end_date = parse_timestamp(&first.end_date).ok_or_else(|| {
            UpdateError::LocalState(format!("unparseable endDate: {:?}", first.end_date))
        })?;

        Ok(Self {
            start_date: first.start_date.as_deref().and_then(parse_timestamp),
            end_date,
        })
    }

    /// Read and parse the export-record file at `path`
    pub async fn load(path: &Path) -> Result<Self, UpdateError> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            UpdateError::LocalState(format!("cannot read {}: {}", path.display(), e))
        })?;

        Self::parse(&contents)
    }
}
