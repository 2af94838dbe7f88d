//! Remote file descriptors and download parts.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// What a probe learned about a remote file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// The file group identifier.
    pub file_id: String,
    /// The file date.
    pub file_date: NaiveDate,
    /// Size in bytes, if the server reported one.
    pub total_bytes: Option<u64>,
    /// Whether the server honours `Range` requests for this file.
    pub supports_range: bool,
}

impl FileDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub const fn new(
        file_id: String,
        file_date: NaiveDate,
        total_bytes: Option<u64>,
        supports_range: bool,
    ) -> Self {
        Self {
            file_id,
            file_date,
            total_bytes,
            supports_range,
        }
    }

    /// Returns a descriptor for a file whose metadata could not be probed.
    #[must_use]
    pub const fn unprobed(file_id: String, file_date: NaiveDate) -> Self {
        Self::new(file_id, file_date, None, false)
    }
}

/// An inclusive byte range, rendered as an HTTP `Range` header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    /// First byte offset.
    pub start: u64,
    /// Last byte offset (inclusive).
    pub end: u64,
}

impl ByteRange {
    /// Creates a range covering `start..=end`.
    #[must_use]
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of bytes in the range.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always false; an inclusive range holds at least one byte.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Returns the `Range` header value (`bytes=start-end`).
    #[must_use]
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// Lifecycle state of a download part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartState {
    /// Planned, not yet requested.
    #[default]
    Pending,
    /// A request for this part is running.
    InFlight,
    /// All bytes of the part are on disk.
    Done,
    /// Retries are exhausted or a fatal error occurred.
    Failed,
}

impl PartState {
    /// Returns true if the part will not change state again.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// One contiguous byte span of a file, fetched and retried independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadPart {
    /// Position of the part within its plan.
    pub index: usize,
    /// First byte offset of the part.
    pub start_offset: u64,
    /// Last byte offset (inclusive); `None` for a whole-body part of unknown length.
    pub end_offset: Option<u64>,
    /// Bytes of this part already written to disk.
    pub bytes_written: u64,
    /// Number of requests issued for this part.
    pub attempt_count: u32,
    /// Current state.
    pub state: PartState,
    /// Whether the part is requested with a `Range` header.
    pub ranged: bool,
}

impl DownloadPart {
    /// Creates a ranged part covering `start..=end`.
    #[must_use]
    pub const fn ranged(index: usize, start: u64, end: u64) -> Self {
        Self {
            index,
            start_offset: start,
            end_offset: Some(end),
            bytes_written: 0,
            attempt_count: 0,
            state: PartState::Pending,
            ranged: true,
        }
    }

    /// Creates a single part streaming the whole body without a `Range` header.
    #[must_use]
    pub const fn whole_body(total_bytes: Option<u64>) -> Self {
        let end_offset = match total_bytes {
            Some(0) | None => None,
            Some(n) => Some(n - 1),
        };
        Self {
            index: 0,
            start_offset: 0,
            end_offset,
            bytes_written: 0,
            attempt_count: 0,
            state: PartState::Pending,
            ranged: false,
        }
    }

    /// Expected length of the part, if known.
    #[must_use]
    pub const fn len(&self) -> Option<u64> {
        match self.end_offset {
            Some(end) => Some(end - self.start_offset + 1),
            None => None,
        }
    }

    /// Returns true if the part is known to hold no bytes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self.len(), Some(0))
    }

    /// Offset the next received byte belongs at.
    #[must_use]
    pub const fn next_offset(&self) -> u64 {
        self.start_offset + self.bytes_written
    }

    /// Range still to be fetched, for a ranged part that is not yet complete.
    #[must_use]
    pub const fn remaining_range(&self) -> Option<ByteRange> {
        match self.end_offset {
            Some(end) if self.ranged && self.next_offset() <= end => {
                Some(ByteRange::new(self.next_offset(), end))
            }
            _ => None,
        }
    }

    /// Returns true if every expected byte has been written.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        match self.len() {
            Some(len) => self.bytes_written >= len,
            None => false,
        }
    }
}
