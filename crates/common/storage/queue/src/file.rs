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

//! Single-file ring buffer of length-prefixed elements.
//!
//! See [`crate::header`] for the layout. Every mutating operation writes the
//! element bytes first and commits the header last, so a crash in the middle
//! of an `add` leaves the queue as if the element had never been added.

#![allow(clippy::cast_possible_truncation)]

use std::{
    fmt,
    fs::{self, File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use bytes::Bytes;
use snafu::ensure;
use tracing::{debug, info, warn};

use crate::{
    FlushMode, QueueConfig, QueueError, Result,
    error::{CorruptedSnafu, ElementTooLargeSnafu, QueueFullSnafu, RemoveOutOfRangeSnafu},
    header::{ELEMENT_HEADER_LENGTH, HEADER_LENGTH, Header, INITIAL_LENGTH, MAX_FILE_LENGTH},
};

/// Chunk used when zeroing or relocating file regions.
const COPY_CHUNK: usize = 8 * 1024;

static ZEROES: [u8; COPY_CHUNK] = [0; COPY_CHUNK];

/// A persistent FIFO queue of byte elements backed by one file.
///
/// `QueueFile` is not synchronized; it is meant to be owned by a single
/// thread. Two processes opening the same path will corrupt it.
pub struct QueueFile {
    file:          File,
    path:          PathBuf,
    flush_mode:    FlushMode,
    /// Committed file length, always a power of two.
    file_length:   u64,
    element_count: usize,
    /// Offset of the first element.
    head:          u64,
    /// Offset immediately after the last element.
    tail:          u64,
}

impl QueueFile {
    /// Opens the queue file at `config.path`, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Corrupted`] if the header or element layout is
    /// inconsistent, and [`QueueError::Io`] on filesystem failures.
    pub fn open(config: QueueConfig) -> Result<Self> {
        let path = config.path;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        if !path.exists() {
            return Self::create(path, config.flush_mode);
        }

        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let actual_length = file.metadata()?.len();
        ensure!(
            actual_length >= HEADER_LENGTH,
            CorruptedSnafu {
                path:   path.clone(),
                reason: format!("file length ({actual_length}) is shorter than the header"),
            }
        );

        let mut buf = [0u8; HEADER_LENGTH as usize];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut buf)?;
        let header = Header::decode(&buf);
        if let Err(reason) = header.validate(actual_length) {
            return CorruptedSnafu { path, reason }.fail();
        }

        let file_length = u64::from(header.file_length);
        if file_length < actual_length {
            warn!(
                path = ?path,
                committed = file_length,
                actual = actual_length,
                "Queue file is longer than its header, truncating interrupted resize"
            );
            file.set_len(file_length)?;
            file.sync_all()?;
        }

        let mut queue = Self {
            file,
            path,
            flush_mode: config.flush_mode,
            file_length,
            element_count: header.element_count as usize,
            head: u64::from(header.head),
            tail: u64::from(header.tail),
        };

        if config.verify_on_open {
            queue.verify_elements()?;
        }

        info!(
            path = ?queue.path,
            file_length = queue.file_length,
            elements = queue.element_count,
            "Queue file opened"
        );
        Ok(queue)
    }

    /// Opens the queue file, discarding and recreating it when it is corrupt.
    ///
    /// Losing a corrupt queue is preferred over refusing to start.
    pub fn open_or_recreate(config: QueueConfig) -> Result<Self> {
        let path = config.path.clone();
        let flush_mode = config.flush_mode;
        match Self::open(config) {
            Err(QueueError::Corrupted { reason, .. }) => {
                warn!(path = ?path, reason = %reason, "Queue file is corrupt, recreating it empty");
                fs::remove_file(&path)?;
                Self::create(path, flush_mode)
            }
            other => other,
        }
    }

    fn create(path: PathBuf, flush_mode: FlushMode) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(INITIAL_LENGTH)?;

        let mut queue = Self {
            file,
            path,
            flush_mode,
            file_length: INITIAL_LENGTH,
            element_count: 0,
            head: HEADER_LENGTH,
            tail: HEADER_LENGTH,
        };
        queue.write_header(INITIAL_LENGTH, 0, HEADER_LENGTH, HEADER_LENGTH)?;
        queue.file.sync_all()?;

        info!(path = ?queue.path, "Queue file created");
        Ok(queue)
    }

    /// Number of elements in the queue.
    #[must_use]
    pub const fn size(&self) -> usize { self.element_count }

    #[must_use]
    pub const fn is_empty(&self) -> bool { self.element_count == 0 }

    /// Current allocated length of the file.
    #[must_use]
    pub const fn file_length(&self) -> u64 { self.file_length }

    #[must_use]
    pub fn path(&self) -> &Path { &self.path }

    /// Bytes in use, including the file header.
    #[must_use]
    pub const fn used_bytes(&self) -> u64 {
        if self.element_count == 0 {
            HEADER_LENGTH
        } else if self.tail > self.head {
            self.tail - self.head + HEADER_LENGTH
        } else {
            // Wrapped, or exactly full when head == tail.
            self.file_length - (self.head - self.tail)
        }
    }

    const fn remaining_bytes(&self) -> u64 { self.file_length - self.used_bytes() }

    /// Appends an element at the tail, growing the file if needed.
    pub fn add(&mut self, data: &[u8]) -> Result<()> {
        let max = (MAX_FILE_LENGTH - HEADER_LENGTH - ELEMENT_HEADER_LENGTH) as usize;
        ensure!(
            data.len() <= max,
            ElementTooLargeSnafu {
                len: data.len(),
                max,
            }
        );

        let needed = ELEMENT_HEADER_LENGTH + data.len() as u64;
        self.expand_if_necessary(needed)?;

        let was_empty = self.is_empty();
        let position = if was_empty { HEADER_LENGTH } else { self.tail };
        self.ring_write(position, &(data.len() as u32).to_be_bytes())?;
        self.ring_write(position + ELEMENT_HEADER_LENGTH, data)?;
        if self.flush_mode.is_sync() {
            self.file.sync_data()?;
        }

        let head = if was_empty { HEADER_LENGTH } else { self.head };
        let tail = self.wrap(position + needed);
        self.write_header(self.file_length, self.element_count + 1, head, tail)
    }

    /// Reads up to `n` elements from the head without removing them.
    pub fn peek(&mut self, n: usize) -> Result<Vec<Bytes>> {
        let n = n.min(self.element_count);
        let mut elements = Vec::with_capacity(n);
        let mut position = self.head;
        for _ in 0..n {
            let (data, next) = self.read_element(position)?;
            elements.push(Bytes::from(data));
            position = next;
        }
        Ok(elements)
    }

    /// Reads the eldest element, if any.
    pub fn peek_first(&mut self) -> Result<Option<Bytes>> {
        Ok(self.peek(1)?.into_iter().next())
    }

    /// Visits elements from eldest to newest until `visitor` returns `false`.
    ///
    /// Returns the number of elements the visitor accepted; the element it
    /// declined is not counted.
    pub fn for_each(&mut self, visitor: &mut dyn FnMut(&[u8]) -> bool) -> Result<usize> {
        let mut position = self.head;
        for visited in 0..self.element_count {
            let (data, next) = self.read_element(position)?;
            if !visitor(&data) {
                return Ok(visited);
            }
            position = next;
        }
        Ok(self.element_count)
    }

    /// Removes the eldest `n` elements.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::RemoveOutOfRange`] if `n` exceeds the size.
    pub fn remove(&mut self, n: usize) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        ensure!(
            n <= self.element_count,
            RemoveOutOfRangeSnafu {
                requested: n,
                available: self.element_count,
            }
        );
        if n == self.element_count {
            return self.clear();
        }

        let old_head = self.head;
        let mut position = self.head;
        let mut erased = 0u64;
        for _ in 0..n {
            let size = ELEMENT_HEADER_LENGTH + self.read_element_length(position)?;
            erased += size;
            position = self.wrap(position + size);
        }

        self.write_header(self.file_length, self.element_count - n, position, self.tail)?;
        self.ring_erase(old_head, erased)?;
        self.maybe_shrink()
    }

    /// Removes every element and shrinks the file back to its initial length.
    pub fn clear(&mut self) -> Result<()> {
        let previous_length = self.file_length;
        self.write_header(INITIAL_LENGTH, 0, HEADER_LENGTH, HEADER_LENGTH)?;
        if previous_length > INITIAL_LENGTH {
            self.file.set_len(INITIAL_LENGTH)?;
        }
        self.ring_erase(HEADER_LENGTH, INITIAL_LENGTH - HEADER_LENGTH)?;
        self.sync(true)
    }

    /// Flushes outstanding writes and closes the file.
    pub fn close(mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        debug!(path = ?self.path, "Queue file closed");
        Ok(())
    }

    pub(crate) fn sync_all(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Doubles the file until `needed` bytes fit, relocating the wrapped
    /// segment so free space stays one contiguous block.
    fn expand_if_necessary(&mut self, needed: u64) -> Result<()> {
        let mut remaining = self.remaining_bytes();
        if remaining >= needed {
            return Ok(());
        }

        let previous_length = self.file_length;
        let mut new_length = previous_length;
        while remaining < needed {
            remaining += new_length;
            new_length <<= 1;
        }
        ensure!(
            new_length <= MAX_FILE_LENGTH,
            QueueFullSnafu {
                needed,
                max: MAX_FILE_LENGTH,
            }
        );

        self.file.set_len(new_length)?;

        // With tail <= head the elements run off the old end of the file and
        // continue at HEADER_LENGTH. Move that continuation right after the
        // old end so the sequence is contiguous in the larger file.
        let tail = if self.element_count > 0 && self.tail <= self.head {
            let moved = self.tail - HEADER_LENGTH;
            self.copy_region(HEADER_LENGTH, previous_length, moved)?;
            previous_length + moved
        } else {
            self.tail
        };

        self.sync(true)?;
        self.write_header(new_length, self.element_count, self.head, tail)?;

        debug!(
            path = ?self.path,
            from = previous_length,
            to = new_length,
            "Queue file expanded"
        );
        Ok(())
    }

    /// Halves the file while the live elements sit contiguously in the lower
    /// half and occupy at most a quarter of it.
    fn maybe_shrink(&mut self) -> Result<()> {
        while self.file_length > INITIAL_LENGTH {
            let half = self.file_length / 2;
            let contiguous = self.element_count > 0 && self.head < self.tail;
            if !contiguous || self.tail >= half || self.used_bytes() > half / 2 {
                break;
            }

            self.write_header(half, self.element_count, self.head, self.tail)?;
            self.file.set_len(half)?;
            self.sync(true)?;
            debug!(path = ?self.path, to = half, "Queue file shrunk");
        }
        Ok(())
    }

    /// Walks every element from head and checks it lands exactly on tail.
    fn verify_elements(&mut self) -> Result<()> {
        let expected = self.used_bytes() - HEADER_LENGTH;
        let mut position = self.head;
        let mut walked = 0u64;
        for index in 0..self.element_count {
            let size = ELEMENT_HEADER_LENGTH + self.read_element_length(position)?;
            walked += size;
            if walked > expected {
                return CorruptedSnafu {
                    path:   self.path.clone(),
                    reason: format!("element {index} runs past the tail"),
                }
                .fail();
            }
            position = self.wrap(position + size);
        }

        ensure!(
            walked == expected && position == self.tail,
            CorruptedSnafu {
                path:   self.path.clone(),
                reason: format!(
                    "elements end at {position} but the tail stored in header is {}",
                    self.tail
                ),
            }
        );
        Ok(())
    }

    fn read_element_length(&mut self, position: u64) -> Result<u64> {
        let mut buf = [0u8; ELEMENT_HEADER_LENGTH as usize];
        self.ring_read(position, &mut buf)?;
        let length = u64::from(u32::from_be_bytes(buf));
        ensure!(
            length <= self.file_length - HEADER_LENGTH - ELEMENT_HEADER_LENGTH,
            CorruptedSnafu {
                path:   self.path.clone(),
                reason: format!("element at {position} claims {length} bytes"),
            }
        );
        Ok(length)
    }

    /// Reads the element at `position`, returning it and the next position.
    fn read_element(&mut self, position: u64) -> Result<(Vec<u8>, u64)> {
        let length = self.read_element_length(position)?;
        let mut data = vec![0u8; length as usize];
        self.ring_read(position + ELEMENT_HEADER_LENGTH, &mut data)?;
        let next = self.wrap(position + ELEMENT_HEADER_LENGTH + length);
        Ok((data, next))
    }

    /// Commits the header, then mirrors it in memory.
    fn write_header(
        &mut self,
        file_length: u64,
        element_count: usize,
        head: u64,
        tail: u64,
    ) -> Result<()> {
        let header = Header {
            file_length:   file_length as u32,
            element_count: element_count as u32,
            head:          head as u32,
            tail:          tail as u32,
        };
        self.write_at(0, &header.encode())?;
        self.sync(false)?;

        self.file_length = file_length;
        self.element_count = element_count;
        self.head = head;
        self.tail = tail;
        Ok(())
    }

    /// Maps a position that ran past the end of the file back into the ring.
    const fn wrap(&self, position: u64) -> u64 {
        if position < self.file_length {
            position
        } else {
            HEADER_LENGTH + position - self.file_length
        }
    }

    fn ring_write(&mut self, position: u64, buf: &[u8]) -> Result<()> {
        let position = self.wrap(position);
        let len = buf.len() as u64;
        if position + len <= self.file_length {
            self.write_at(position, buf)
        } else {
            let before_eof = (self.file_length - position) as usize;
            self.write_at(position, &buf[..before_eof])?;
            self.write_at(HEADER_LENGTH, &buf[before_eof..])
        }
    }

    fn ring_read(&mut self, position: u64, buf: &mut [u8]) -> Result<()> {
        let position = self.wrap(position);
        let len = buf.len() as u64;
        if position + len <= self.file_length {
            self.read_at(position, buf)
        } else {
            let before_eof = (self.file_length - position) as usize;
            self.read_at(position, &mut buf[..before_eof])?;
            self.read_at(HEADER_LENGTH, &mut buf[before_eof..])
        }
    }

    /// Zeroes `len` bytes of the ring starting at `position`.
    fn ring_erase(&mut self, position: u64, len: u64) -> Result<()> {
        let mut position = position;
        let mut remaining = len;
        while remaining > 0 {
            let chunk = remaining.min(COPY_CHUNK as u64);
            self.ring_write(position, &ZEROES[..chunk as usize])?;
            position = self.wrap(position + chunk);
            remaining -= chunk;
        }
        Ok(())
    }

    /// Copies `len` bytes between two non-overlapping physical regions.
    fn copy_region(&mut self, from: u64, to: u64, len: u64) -> Result<()> {
        let mut buf = vec![0u8; COPY_CHUNK];
        let mut copied = 0u64;
        while copied < len {
            let chunk = (len - copied).min(COPY_CHUNK as u64) as usize;
            self.read_at(from + copied, &mut buf[..chunk])?;
            self.write_at(to + copied, &buf[..chunk])?;
            copied += chunk as u64;
        }
        Ok(())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    /// Syncs according to the flush mode; `metadata` also syncs the length.
    fn sync(&mut self, metadata: bool) -> Result<()> {
        if self.flush_mode.is_sync() {
            if metadata {
                self.file.sync_all()?;
            } else {
                self.file.sync_data()?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for QueueFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueFile")
            .field("path", &self.path)
            .field("file_length", &self.file_length)
            .field("size", &self.element_count)
            .field("head", &self.head)
            .field("tail", &self.tail)
            .finish()
    }
}
