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

use bytes::Bytes;

use crate::{QueueFile, Result};

/// A FIFO queue of opaque byte elements.
///
/// Implemented by the durable [`QueueFile`] and by
/// [`MemoryQueue`](crate::MemoryQueue), which callers fall back to when the
/// file cannot be opened.
pub trait ElementQueue: Send {
    fn size(&self) -> usize;

    fn is_empty(&self) -> bool { self.size() == 0 }

    fn add(&mut self, data: &[u8]) -> Result<()>;

    /// Reads up to `n` elements from the head without removing them.
    fn peek(&mut self, n: usize) -> Result<Vec<Bytes>>;

    /// Visits elements from eldest to newest until `visitor` returns `false`,
    /// returning how many it accepted.
    fn for_each(&mut self, visitor: &mut dyn FnMut(&[u8]) -> bool) -> Result<usize>;

    /// Removes the eldest `n` elements; `n` larger than the size is an error.
    fn remove(&mut self, n: usize) -> Result<()>;

    /// Drops every element.
    fn clear(&mut self) -> Result<()>;

    /// Flushes any buffered state. The queue must not be used afterwards.
    fn close(&mut self) -> Result<()>;

    /// Short label for logs.
    fn kind(&self) -> &'static str;
}

impl ElementQueue for QueueFile {
    fn size(&self) -> usize { Self::size(self) }

    fn add(&mut self, data: &[u8]) -> Result<()> { Self::add(self, data) }

    fn peek(&mut self, n: usize) -> Result<Vec<Bytes>> { Self::peek(self, n) }

    fn for_each(&mut self, visitor: &mut dyn FnMut(&[u8]) -> bool) -> Result<usize> {
        Self::for_each(self, visitor)
    }

    fn remove(&mut self, n: usize) -> Result<()> { Self::remove(self, n) }

    fn clear(&mut self) -> Result<()> { Self::clear(self) }

    fn close(&mut self) -> Result<()> { self.sync_all() }

    fn kind(&self) -> &'static str { "file" }
}

impl<Q: ElementQueue + ?Sized> ElementQueue for Box<Q> {
    fn size(&self) -> usize { (**self).size() }

    fn add(&mut self, data: &[u8]) -> Result<()> { (**self).add(data) }

    fn peek(&mut self, n: usize) -> Result<Vec<Bytes>> { (**self).peek(n) }

    fn for_each(&mut self, visitor: &mut dyn FnMut(&[u8]) -> bool) -> Result<usize> {
        (**self).for_each(visitor)
    }

    fn remove(&mut self, n: usize) -> Result<()> { (**self).remove(n) }

    fn clear(&mut self) -> Result<()> { (**self).clear() }

    fn close(&mut self) -> Result<()> { (**self).close() }

    fn kind(&self) -> &'static str { (**self).kind() }
}
