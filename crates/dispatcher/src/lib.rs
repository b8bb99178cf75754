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


//! Batched delivery of queued events.
//!
//! A [`Dispatcher`] owns one worker thread, which owns the
//! [`PayloadQueue`](beacon_common_storage_queue::PayloadQueue). Events are
//! appended on [`enqueue`](DispatcherHandle::enqueue) and uploaded in
//! bounded batches when `flush_at` events have accumulated, when
//! `flush_interval` elapses, or on an explicit flush. A batch is removed only
//! after the [`Uploader`] confirms it, so delivery is at least once.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod stats;
pub mod uploader;
mod worker;

pub use config::{DEFAULT_MAX_BATCH_BYTES, DispatcherConfig};
pub use dispatcher::{Dispatcher, DispatcherHandle, open_queue};
pub use error::{DispatcherError, Result};
pub use stats::{CountingStats, NoopStats, PrometheusStats, Stats, StatsSnapshot};
pub use uploader::{
    BatchEnvelope, DEFAULT_ENDPOINT, HttpUploader, HttpUploaderConfig, UploadError, Uploader,
    classify_status, encode_batch,
};
