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


//! Durable FIFO storage for batched event delivery.
//!
//! [`QueueFile`] keeps length-prefixed byte elements in a single ring-buffer
//! file that survives process death. [`PayloadQueue`] layers a [`Codec`] on top
//! of any [`ElementQueue`] and reads bounded batches from the head.

pub mod builder;
pub mod codec;
pub mod config;
pub mod error;
pub mod file;
pub mod header;
pub mod memory;
pub mod path;
pub mod payload;
pub mod store;

pub use builder::QueueBuilder;
pub use codec::{Codec, JsonCodec, RawCodec};
pub use config::{DEFAULT_MAX_PAYLOAD_BYTES, FlushMode, QueueConfig};
pub use error::{QueueError, Result};
pub use file::QueueFile;
pub use memory::MemoryQueue;
pub use path::queue_file_path;
pub use payload::{Batch, BatchLimit, PayloadQueue};
pub use store::ElementQueue;
