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

//! On-disk layout of a queue file.
//!
//! ```text
//! ┌────────────┬───────────────┬────────────┬────────────┬──────────────────────────┐
//! │ fileLength │ elementCount  │    head    │    tail    │  ring of elements ...    │
//! │  u32 BE    │    u32 BE     │   u32 BE   │   u32 BE   │                          │
//! └────────────┴───────────────┴────────────┴────────────┴──────────────────────────┘
//!  0            4               8            12           16 (HEADER_LENGTH)
//! ```
//!
//! Each element is a 4-byte big-endian length followed by that many payload
//! bytes. Both parts may straddle the physical end of the file, in which case
//! they continue at [`HEADER_LENGTH`].
//!
//! `head` is the offset of the first element, `tail` the offset immediately
//! after the last one. An empty queue has `head == tail == HEADER_LENGTH`; a
//! non-empty queue with `head == tail` is exactly full.

/// Size of the file header in bytes.
pub const HEADER_LENGTH: u64 = 16;

/// Size of an element's length prefix in bytes.
pub const ELEMENT_HEADER_LENGTH: u64 = 4;

/// Length of a freshly created file, and the floor for shrinking.
pub const INITIAL_LENGTH: u64 = 4096;

/// Largest file length that still fits the header's 32-bit fields.
pub const MAX_FILE_LENGTH: u64 = 1 << 31;

/// The four header fields, as stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub file_length:   u32,
    pub element_count: u32,
    pub head:          u32,
    pub tail:          u32,
}

impl Header {
    pub(crate) fn encode(&self) -> [u8; HEADER_LENGTH as usize] {
        let mut buf = [0u8; HEADER_LENGTH as usize];
        buf[0..4].copy_from_slice(&self.file_length.to_be_bytes());
        buf[4..8].copy_from_slice(&self.element_count.to_be_bytes());
        buf[8..12].copy_from_slice(&self.head.to_be_bytes());
        buf[12..16].copy_from_slice(&self.tail.to_be_bytes());
        buf
    }

    pub(crate) fn decode(buf: &[u8; HEADER_LENGTH as usize]) -> Self {
        let field = |at: usize| u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        Self {
            file_length:   field(0),
            element_count: field(4),
            head:          field(8),
            tail:          field(12),
        }
    }

    /// Checks the header against the actual file size.
    ///
    /// A header whose `file_length` is smaller than the file is accepted: a
    /// crash between resizing the file and committing the header leaves the
    /// file longer than the last committed state.
    pub(crate) fn validate(&self, actual_length: u64) -> Result<(), String> {
        let file_length = u64::from(self.file_length);
        if file_length < INITIAL_LENGTH
            || file_length > MAX_FILE_LENGTH
            || !file_length.is_power_of_two()
        {
            return Err(format!("length stored in header ({file_length}) is invalid"));
        }
        if file_length > actual_length {
            return Err(format!(
                "length stored in header ({file_length}) exceeds actual file length \
                 ({actual_length})"
            ));
        }

        let head = u64::from(self.head);
        if head < HEADER_LENGTH || head >= file_length {
            return Err(format!("first position stored in header ({head}) is invalid"));
        }
        let tail = u64::from(self.tail);
        if tail < HEADER_LENGTH || tail >= file_length {
            return Err(format!("last position stored in header ({tail}) is invalid"));
        }

        if self.element_count == 0 {
            if head != HEADER_LENGTH || tail != HEADER_LENGTH {
                return Err(format!(
                    "empty queue must have head and tail at {HEADER_LENGTH}, found {head} and \
                     {tail}"
                ));
            }
        } else if u64::from(self.element_count) * ELEMENT_HEADER_LENGTH
            > file_length - HEADER_LENGTH
        {
            return Err(format!(
                "element count stored in header ({}) cannot fit in {file_length} bytes",
                self.element_count
            ));
        }

        Ok(())
    }
}
