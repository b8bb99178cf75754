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


use std::sync::LazyLock;

use prometheus::{HistogramVec, IntCounterVec, register_histogram_vec, register_int_counter_vec};

pub const QUEUE_LABEL: &str = "queue";

pub static EVENTS_ENQUEUED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "beacon_events_enqueued_total",
        "Total number of events appended to the queue",
        &[QUEUE_LABEL]
    )
    .unwrap()
});

pub static ENQUEUE_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "beacon_enqueue_errors_total",
        "Total number of events that could not be appended",
        &[QUEUE_LABEL]
    )
    .unwrap()
});

pub static FLUSH_ATTEMPTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "beacon_flush_attempts_total",
        "Total number of batch uploads attempted",
        &[QUEUE_LABEL]
    )
    .unwrap()
});

pub static FLUSH_SUCCESSES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "beacon_flush_successes_total",
        "Total number of batches uploaded successfully",
        &[QUEUE_LABEL]
    )
    .unwrap()
});

pub static FLUSH_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "beacon_flush_failures_total",
        "Total number of batch uploads that failed",
        &[QUEUE_LABEL]
    )
    .unwrap()
});

pub static EVENTS_FLUSHED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "beacon_events_flushed_total",
        "Total number of events delivered",
        &[QUEUE_LABEL]
    )
    .unwrap()
});

pub static EVENTS_DROPPED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "beacon_events_dropped_total",
        "Total number of events evicted by the queue cap or rejected by the server",
        &[QUEUE_LABEL]
    )
    .unwrap()
});

pub static EVENTS_MALFORMED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "beacon_events_malformed_total",
        "Total number of stored events that failed to decode",
        &[QUEUE_LABEL]
    )
    .unwrap()
});

pub static FLUSH_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "beacon_flush_duration_seconds",
        "Batch upload duration in seconds",
        &[QUEUE_LABEL]
    )
    .unwrap()
});
