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

use std::collections::VecDeque;

use bytes::Bytes;
use snafu::ensure;

use crate::{ElementQueue, Result, error::RemoveOutOfRangeSnafu};

/// Volatile [`ElementQueue`]. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    elements: VecDeque<Bytes>,
}

impl MemoryQueue {
    #[must_use]
    pub fn new() -> Self { Self::default() }
}

impl ElementQueue for MemoryQueue {
    fn size(&self) -> usize { self.elements.len() }

    fn add(&mut self, data: &[u8]) -> Result<()> {
        self.elements.push_back(Bytes::copy_from_slice(data));
        Ok(())
    }

    fn peek(&mut self, n: usize) -> Result<Vec<Bytes>> {
        Ok(self.elements.iter().take(n).cloned().collect())
    }

    fn for_each(&mut self, visitor: &mut dyn FnMut(&[u8]) -> bool) -> Result<usize> {
        let mut accepted = 0;
        for element in &self.elements {
            if !visitor(element) {
                break;
            }
            accepted += 1;
        }
        Ok(accepted)
    }

    fn remove(&mut self, n: usize) -> Result<()> {
        ensure!(
            n <= self.elements.len(),
            RemoveOutOfRangeSnafu {
                requested: n,
                available: self.elements.len(),
            }
        );
        self.elements.drain(..n);
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.elements.clear();
        Ok(())
    }

    fn close(&mut self) -> Result<()> { Ok(()) }

    fn kind(&self) -> &'static str { "memory" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QueueError;

    #[test]
    fn test_fifo_order() {
        let mut queue = MemoryQueue::new();
        queue.add(b"one").unwrap();
        queue.add(b"two").unwrap();
        queue.add(b"three").unwrap();

        let peeked = queue.peek(2).unwrap();
        assert_eq!(peeked, vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]);

        queue.remove(1).unwrap();
        assert_eq!(queue.size(), 2);
        assert_eq!(queue.peek(10).unwrap()[0].as_ref(), b"two");
    }

    #[test]
    fn test_remove_out_of_range() {
        let mut queue = MemoryQueue::new();
        queue.add(b"only").unwrap();
        assert!(matches!(
            queue.remove(2),
            Err(QueueError::RemoveOutOfRange {
                requested: 2,
                available: 1
            })
        ));
        assert_eq!(queue.size(), 1);
    }

    #[test]
    fn test_clear() {
        let mut queue = MemoryQueue::new();
        queue.add(b"one").unwrap();
        queue.add(b"two").unwrap();
        queue.clear().unwrap();
        assert!(queue.is_empty());
        queue.add(b"three").unwrap();
        assert_eq!(queue.peek(1).unwrap()[0].as_ref(), b"three");
    }

    #[test]
    fn test_for_each_halts() {
        let mut queue = MemoryQueue::new();
        for data in [b"a", b"b", b"c"] {
            queue.add(data).unwrap();
        }
        let accepted = queue.for_each(&mut |data: &[u8]| data != b"b").unwrap();
        assert_eq!(accepted, 1);
    }
}
