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

//! Typed view over an [`ElementQueue`].

use snafu::ensure;
use tracing::warn;

use crate::{
    Codec, ElementQueue, Result, config::DEFAULT_MAX_PAYLOAD_BYTES, error::PayloadTooLargeSnafu,
};

/// Upper bounds for one batch read by [`PayloadQueue::peek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimit {
    /// Maximum number of elements read, malformed ones included.
    pub max_items: usize,
    /// Maximum encoded bytes of the decoded items. The first element is taken
    /// even if it alone exceeds this.
    pub max_bytes: usize,
}

impl BatchLimit {
    #[must_use]
    pub const fn items(max_items: usize) -> Self {
        Self {
            max_items,
            max_bytes: usize::MAX,
        }
    }
}

/// Items read from the head of a [`PayloadQueue`].
#[derive(Debug)]
pub struct Batch<T> {
    /// Successfully decoded items, eldest first.
    pub items:     Vec<T>,
    /// Elements read from the queue, malformed ones included. Removing this
    /// many elements discards exactly this batch.
    pub consumed:  usize,
    /// Encoded size of `items`.
    pub bytes:     usize,
    /// Elements that failed to decode.
    pub malformed: usize,
}

impl<T> Batch<T> {
    #[must_use]
    pub const fn is_empty(&self) -> bool { self.consumed == 0 }
}

/// Serializes items into an [`ElementQueue`] and decodes them back.
pub struct PayloadQueue<C: Codec> {
    queue:             Box<dyn ElementQueue>,
    codec:             C,
    max_payload_bytes: usize,
}

impl<C: Codec> PayloadQueue<C> {
    pub fn new(queue: Box<dyn ElementQueue>, codec: C) -> Self {
        Self {
            queue,
            codec,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }

    /// Sets the largest encoded item `add` accepts.
    #[must_use]
    pub const fn with_max_payload_bytes(mut self, max_payload_bytes: usize) -> Self {
        self.max_payload_bytes = max_payload_bytes;
        self
    }

    pub fn size(&self) -> usize { self.queue.size() }

    pub fn is_empty(&self) -> bool { self.queue.is_empty() }

    /// Label of the backing store, `"file"` or `"memory"`.
    pub fn kind(&self) -> &'static str { self.queue.kind() }

    /// Encodes and appends `item`. Nothing is written if it is too large.
    pub fn add(&mut self, item: &C::Item) -> Result<()> {
        let data = self.codec.encode(item)?;
        ensure!(
            data.len() <= self.max_payload_bytes,
            PayloadTooLargeSnafu {
                len:   data.len(),
                limit: self.max_payload_bytes,
            }
        );
        self.queue.add(&data)
    }

    /// Reads a batch from the head without removing it.
    ///
    /// Elements that fail to decode are skipped and counted in
    /// [`Batch::malformed`], but still count toward [`Batch::consumed`].
    pub fn peek(&mut self, limit: BatchLimit) -> Result<Batch<C::Item>> {
        let mut batch = Batch {
            items:     Vec::new(),
            consumed:  0,
            bytes:     0,
            malformed: 0,
        };
        if limit.max_items == 0 {
            return Ok(batch);
        }

        let codec = &self.codec;
        self.queue.for_each(&mut |data: &[u8]| {
            if batch.consumed > 0 && batch.bytes + data.len() > limit.max_bytes {
                return false;
            }
            match codec.decode(data) {
                Ok(item) => {
                    batch.items.push(item);
                    batch.bytes += data.len();
                }
                Err(err) => {
                    warn!(error = %err, len = data.len(), "Skipping malformed queue element");
                    batch.malformed += 1;
                }
            }
            batch.consumed += 1;
            batch.consumed < limit.max_items
        })?;
        Ok(batch)
    }

    /// Removes the eldest `n` elements.
    pub fn remove(&mut self, n: usize) -> Result<()> { self.queue.remove(n) }

    /// Drops every element, readable or not.
    pub fn clear(&mut self) -> Result<()> { self.queue.clear() }

    pub fn close(&mut self) -> Result<()> { self.queue.close() }
}

impl<C: Codec> std::fmt::Debug for PayloadQueue<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadQueue")
            .field("kind", &self.queue.kind())
            .field("size", &self.queue.size())
            .field("max_payload_bytes", &self.max_payload_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    use super::*;
    use crate::{FlushMode, JsonCodec, MemoryQueue, QueueBuilder, QueueError, RawCodec};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Event {
        id: u32,
    }

    fn event_queue() -> PayloadQueue<JsonCodec<Event>> {
        PayloadQueue::new(Box::new(MemoryQueue::new()), JsonCodec::new())
    }

    #[test]
    fn test_add_and_peek_in_order() {
        let mut queue = event_queue();
        for id in 0..5 {
            queue.add(&Event { id }).unwrap();
        }

        let batch = queue.peek(BatchLimit::items(3)).unwrap();
        assert_eq!(batch.items, vec![Event { id: 0 }, Event { id: 1 }, Event { id: 2 }]);
        assert_eq!(batch.consumed, 3);
        assert_eq!(batch.malformed, 0);
        assert_eq!(queue.size(), 5);
    }

    #[test]
    fn test_malformed_elements_are_skipped_but_consumed() {
        let mut raw = MemoryQueue::new();
        raw.add(br#"{"id":1}"#).unwrap();
        raw.add(b"garbage").unwrap();
        raw.add(br#"{"id":3}"#).unwrap();
        let mut queue: PayloadQueue<JsonCodec<Event>> =
            PayloadQueue::new(Box::new(raw), JsonCodec::new());

        let batch = queue.peek(BatchLimit::items(10)).unwrap();
        assert_eq!(batch.items, vec![Event { id: 1 }, Event { id: 3 }]);
        assert_eq!(batch.consumed, 3);
        assert_eq!(batch.malformed, 1);

        queue.remove(batch.consumed).unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_byte_limit_bounds_batch() {
        let mut queue = PayloadQueue::new(Box::new(MemoryQueue::new()), RawCodec);
        for _ in 0..4 {
            queue.add(&Bytes::from(vec![1u8; 100])).unwrap();
        }

        let batch = queue
            .peek(BatchLimit {
                max_items: 10,
                max_bytes: 250,
            })
            .unwrap();
        assert_eq!(batch.consumed, 2);
        assert_eq!(batch.bytes, 200);
    }

    #[test]
    fn test_first_element_always_taken() {
        let mut queue = PayloadQueue::new(Box::new(MemoryQueue::new()), RawCodec);
        queue.add(&Bytes::from(vec![1u8; 500])).unwrap();
        queue.add(&Bytes::from(vec![2u8; 10])).unwrap();

        let batch = queue
            .peek(BatchLimit {
                max_items: 10,
                max_bytes: 100,
            })
            .unwrap();
        assert_eq!(batch.consumed, 1);
        assert_eq!(batch.items[0].len(), 500);
    }

    #[test]
    fn test_oversized_payload_is_rejected() {
        let mut queue = PayloadQueue::new(Box::new(MemoryQueue::new()), RawCodec)
            .with_max_payload_bytes(64);
        let err = queue.add(&Bytes::from(vec![0u8; 65])).unwrap_err();
        assert!(matches!(err, QueueError::PayloadTooLarge { len: 65, limit: 64 }));
        assert!(queue.is_empty());
        queue.add(&Bytes::from(vec![0u8; 64])).unwrap();
        assert_eq!(queue.size(), 1);
    }

    #[test]
    fn test_empty_queue_yields_empty_batch() {
        let mut queue = event_queue();
        let batch = queue.peek(BatchLimit::items(100)).unwrap();
        assert!(batch.is_empty());
        assert!(batch.items.is_empty());
    }

    #[test]
    fn test_file_backed_payloads_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("events");
        {
            let file = QueueBuilder::new(&path).flush_mode(FlushMode::Async).open().unwrap();
            let mut queue = PayloadQueue::new(Box::new(file), JsonCodec::<Event>::new());
            queue.add(&Event { id: 7 }).unwrap();
            queue.add(&Event { id: 8 }).unwrap();
            queue.close().unwrap();
        }

        let file = QueueBuilder::new(&path).open().unwrap();
        let mut queue = PayloadQueue::new(Box::new(file), JsonCodec::<Event>::new());
        assert_eq!(queue.kind(), "file");
        let batch = queue.peek(BatchLimit::items(10)).unwrap();
        assert_eq!(batch.items, vec![Event { id: 7 }, Event { id: 8 }]);
    }
}
