// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::PathBuf;

use snafu::Snafu;

/// Queue operation errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum QueueError {
    /// Filesystem I/O failure.
    #[snafu(context(false), display("IO error: {source}"))]
    Io { source: std::io::Error },

    /// The header or element layout on disk is inconsistent.
    #[snafu(display("Queue file {} is corrupt: {reason}", path.display()))]
    Corrupted {
        path:   PathBuf,
        reason: String,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// Growing the file would exceed the maximum supported length.
    #[snafu(display("Queue file cannot grow to hold {needed} more bytes (max {max})"))]
    QueueFull { needed: u64, max: u64 },

    /// A single element is larger than the queue can ever hold.
    #[snafu(display("Element of {len} bytes exceeds the maximum of {max}"))]
    ElementTooLarge { len: usize, max: usize },

    /// An encoded payload is larger than the configured limit.
    #[snafu(display("Payload of {len} bytes exceeds the limit of {limit}"))]
    PayloadTooLarge { len: usize, limit: usize },

    /// Attempted to remove more elements than the queue holds.
    #[snafu(display(
        "Cannot remove more elements ({requested}) than present in queue ({available})"
    ))]
    RemoveOutOfRange { requested: usize, available: usize },

    /// Failed to encode a payload before appending it.
    #[snafu(display("Failed to encode payload: {source}"))]
    Encode { source: serde_json::Error },

    /// Failed to decode a stored element.
    #[snafu(display("Failed to decode payload: {source}"))]
    Decode { source: serde_json::Error },

    /// Invalid or inaccessible file path.
    #[snafu(display("Invalid queue path: {}", path.display()))]
    InvalidPath { path: PathBuf },
}

impl QueueError {
    /// Whether the on-disk layout is unusable; only clearing the queue
    /// recovers from this.
    #[must_use]
    pub const fn is_corruption(&self) -> bool { matches!(self, Self::Corrupted { .. }) }
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
