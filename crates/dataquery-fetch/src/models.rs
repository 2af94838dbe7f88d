//! JSON payloads of the file endpoints.

use serde::{Deserialize, Serialize};

/// Availability of one file on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AvailabilityInfo {
    /// File date as `YYYYMMDD`.
    pub file_datetime: String,
    /// Whether the file can be downloaded.
    #[serde(default)]
    pub is_available: bool,
    /// Server-side file name.
    #[serde(default)]
    pub file_name: Option<String>,
    /// When the file was first published.
    #[serde(default)]
    pub first_created_on: Option<String>,
    /// When the file last changed.
    #[serde(default)]
    pub last_modified: Option<String>,
}

impl AvailabilityInfo {
    /// An entry for a date the server did not report.
    #[must_use]
    pub fn missing(file_datetime: impl Into<String>) -> Self {
        Self {
            file_datetime: file_datetime.into(),
            is_available: false,
            file_name: None,
            first_created_on: None,
            last_modified: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AvailabilityResponse {
    #[serde(default)]
    pub(crate) availability: Vec<AvailabilityInfo>,
}

impl AvailabilityResponse {
    /// Entry for `file_datetime`, the first entry, or a missing marker.
    pub(crate) fn select(self, file_datetime: &str) -> AvailabilityInfo {
        let mut items = self.availability;
        match items.iter().position(|i| i.file_datetime == file_datetime) {
            Some(index) => items.swap_remove(index),
            None if !items.is_empty() => items.swap_remove(0),
            None => AvailabilityInfo::missing(file_datetime),
        }
    }
}

/// A file identifier listed for a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileInfo {
    /// The file group identifier.
    pub file_group_id: String,
    /// Free-text description.
    #[serde(default)]
    pub description: Option<String>,
    /// File format, such as `csv` or `parquet`.
    #[serde(default)]
    pub file_type: Option<String>,
    /// Size in bytes, when listed.
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct FileListResponse {
    #[serde(default)]
    pub(crate) file_group_ids: Vec<FileInfo>,
}
