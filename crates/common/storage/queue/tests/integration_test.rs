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


use std::{
    collections::VecDeque,
    fs::{self, OpenOptions},
    io::{Seek, SeekFrom, Write},
};

use beacon_common_storage_queue::{
    BatchLimit, ElementQueue, FlushMode, JsonCodec, PayloadQueue, QueueBuilder, QueueConfig,
    QueueError, QueueFile,
};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use test_case::test_case;

fn open(temp_dir: &TempDir) -> QueueFile {
    QueueBuilder::new(temp_dir.path().join("queue"))
        .flush_mode(FlushMode::Async)
        .open()
        .unwrap()
}

/// Small deterministic generator so runs are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: usize) -> usize {
        self.0 = self.0.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        ((self.0 >> 33) as usize) % bound
    }
}

#[test]
fn test_queue_write_and_read() {
    let temp_dir = TempDir::new().unwrap();
    let mut queue = open(&temp_dir);

    for i in 0..100 {
        queue.add(format!("message-{i:04}").as_bytes()).unwrap();
    }
    assert_eq!(queue.size(), 100);

    let elements = queue.peek(100).unwrap();
    for (i, element) in elements.iter().enumerate() {
        assert_eq!(std::str::from_utf8(element).unwrap(), format!("message-{i:04}"));
    }
}

#[test]
fn test_queue_recovery() {
    let temp_dir = TempDir::new().unwrap();
    {
        let mut queue = open(&temp_dir);
        for i in 0..50 {
            queue.add(format!("msg-{i}").as_bytes()).unwrap();
        }
        queue.remove(20).unwrap();
        queue.close().unwrap();
    }

    let mut queue = open(&temp_dir);
    assert_eq!(queue.size(), 30);
    let elements = queue.peek(30).unwrap();
    assert_eq!(elements.first().unwrap().as_ref(), b"msg-20");
    assert_eq!(elements.last().unwrap().as_ref(), b"msg-49");
}

#[test_case(1 ; "seed one")]
#[test_case(42 ; "seed forty two")]
#[test_case(9_001 ; "seed nine thousand one")]
fn test_random_operations_match_model(seed: u64) {
    let temp_dir = TempDir::new().unwrap();
    let mut rng = Lcg(seed);
    let mut model: VecDeque<Vec<u8>> = VecDeque::new();
    let mut queue = open(&temp_dir);

    for step in 0..2_000 {
        match rng.next(10) {
            0..=5 => {
                let len = rng.next(1_500);
                let data: Vec<u8> = (0..len).map(|i| (i + step) as u8).collect();
                queue.add(&data).unwrap();
                model.push_back(data);
            }
            6..=8 => {
                let n = rng.next(model.len() + 1);
                queue.remove(n).unwrap();
                model.drain(..n);
            }
            _ => {
                // Reopen to check the committed state matches.
                drop(queue);
                queue = open(&temp_dir);
            }
        }

        assert_eq!(queue.size(), model.len());
        assert!(queue.file_length().is_power_of_two());
        assert_eq!(fs::metadata(queue.path()).unwrap().len(), queue.file_length());
        if step % 50 == 0 {
            let elements = queue.peek(model.len()).unwrap();
            for (element, expected) in elements.iter().zip(&model) {
                assert_eq!(element.as_ref(), expected.as_slice());
            }
        }
    }

    drop(queue);
    let mut queue = open(&temp_dir);
    let elements = queue.peek(usize::MAX).unwrap();
    assert_eq!(elements.len(), model.len());
    for (element, expected) in elements.iter().zip(&model) {
        assert_eq!(element.as_ref(), expected.as_slice());
    }
}

#[test]
fn test_corrupt_file_is_recreated() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("queue");
    {
        let mut queue = open(&temp_dir);
        queue.add(b"lost").unwrap();
    }
    // Stomp the head pointer.
    let mut file = OpenOptions::new().write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(8)).unwrap();
    file.write_all(&9_999_999u32.to_be_bytes()).unwrap();
    drop(file);

    let strict = QueueFile::open(QueueConfig {
        path: path.clone(),
        ..Default::default()
    });
    assert!(matches!(strict, Err(QueueError::Corrupted { .. })));

    let mut queue = QueueBuilder::new(&path).open().unwrap();
    assert!(queue.is_empty());
    queue.add(b"fresh").unwrap();
    assert_eq!(queue.peek_first().unwrap().unwrap().as_ref(), b"fresh");
}

#[test]
fn test_corrupt_file_kept_without_recreate() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("queue");
    fs::write(&path, [0xFFu8; 64]).unwrap();

    let result = QueueBuilder::new(&path).recreate_on_corruption(false).open();
    assert!(matches!(result, Err(QueueError::Corrupted { .. })));
    assert_eq!(fs::read(&path).unwrap(), vec![0xFFu8; 64]);
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Event {
    name: String,
    seq:  u32,
}

#[test]
fn test_payload_queue_over_queue_file() {
    let temp_dir = TempDir::new().unwrap();
    let file: Box<dyn ElementQueue> = Box::new(open(&temp_dir));
    let mut queue = PayloadQueue::new(file, JsonCodec::<Event>::new());

    for seq in 0..25 {
        queue
            .add(&Event {
                name: "page_viewed".to_string(),
                seq,
            })
            .unwrap();
    }

    let mut seen = Vec::new();
    while !queue.is_empty() {
        let batch = queue.peek(BatchLimit::items(10)).unwrap();
        assert!(batch.consumed <= 10);
        seen.extend(batch.items.iter().map(|event| event.seq));
        queue.remove(batch.consumed).unwrap();
    }
    assert_eq!(seen, (0..25).collect::<Vec<_>>());
}
