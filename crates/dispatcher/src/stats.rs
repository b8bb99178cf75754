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


//! Write-only sinks for delivery statistics.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use crate::metrics::{
    ENQUEUE_ERRORS, EVENTS_DROPPED, EVENTS_ENQUEUED, EVENTS_FLUSHED, EVENTS_MALFORMED,
    FLUSH_ATTEMPTS, FLUSH_DURATION_SECONDS, FLUSH_FAILURES, FLUSH_SUCCESSES,
};

/// Receives dispatcher events. Called from the worker thread only.
pub trait Stats: Send + Sync {
    /// An event was appended to the queue.
    fn on_enqueue(&self) {}

    /// An event could not be appended and was lost.
    fn on_enqueue_error(&self) {}

    /// A batch upload is about to start.
    fn on_flush_attempt(&self) {}

    /// `count` events were delivered in `duration`.
    fn on_flush_success(&self, count: usize, duration: Duration) {
        let _ = (count, duration);
    }

    /// An upload failed and the batch stays queued.
    fn on_flush_failure(&self) {}

    /// `count` events were discarded without delivery.
    fn on_drop(&self, count: usize) { let _ = count; }

    /// `count` stored events failed to decode and were skipped.
    fn on_malformed(&self, count: usize) { let _ = count; }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStats;

impl Stats for NoopStats {}

/// Point-in-time copy of [`CountingStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub enqueue_count:       u64,
    pub enqueue_error_count: u64,
    pub flush_attempt_count: u64,
    pub flush_count:         u64,
    pub flush_event_count:   u64,
    pub flush_failure_count: u64,
    pub drop_count:          u64,
    pub malformed_count:     u64,
    pub total_flush_time:    Duration,
}

impl StatsSnapshot {
    /// Mean duration of a successful flush, if any happened.
    #[must_use]
    pub fn average_flush_time(&self) -> Option<Duration> {
        u32::try_from(self.flush_count)
            .ok()
            .filter(|count| *count > 0)
            .map(|count| self.total_flush_time / count)
    }
}

/// Counts events in memory.
#[derive(Debug, Default)]
pub struct CountingStats {
    enqueue_count:       AtomicU64,
    enqueue_error_count: AtomicU64,
    flush_attempt_count: AtomicU64,
    flush_count:         AtomicU64,
    flush_event_count:   AtomicU64,
    flush_failure_count: AtomicU64,
    drop_count:          AtomicU64,
    malformed_count:     AtomicU64,
    total_flush_micros:  AtomicU64,
}

impl CountingStats {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            enqueue_count:       self.enqueue_count.load(Ordering::Relaxed),
            enqueue_error_count: self.enqueue_error_count.load(Ordering::Relaxed),
            flush_attempt_count: self.flush_attempt_count.load(Ordering::Relaxed),
            flush_count:         self.flush_count.load(Ordering::Relaxed),
            flush_event_count:   self.flush_event_count.load(Ordering::Relaxed),
            flush_failure_count: self.flush_failure_count.load(Ordering::Relaxed),
            drop_count:          self.drop_count.load(Ordering::Relaxed),
            malformed_count:     self.malformed_count.load(Ordering::Relaxed),
            total_flush_time:    Duration::from_micros(
                self.total_flush_micros.load(Ordering::Relaxed),
            ),
        }
    }
}

fn add(counter: &AtomicU64, n: usize) { counter.fetch_add(n as u64, Ordering::Relaxed); }

impl Stats for CountingStats {
    fn on_enqueue(&self) { add(&self.enqueue_count, 1); }

    fn on_enqueue_error(&self) { add(&self.enqueue_error_count, 1); }

    fn on_flush_attempt(&self) { add(&self.flush_attempt_count, 1); }

    fn on_flush_success(&self, count: usize, duration: Duration) {
        add(&self.flush_count, 1);
        add(&self.flush_event_count, count);
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.total_flush_micros.fetch_add(micros, Ordering::Relaxed);
    }

    fn on_flush_failure(&self) { add(&self.flush_failure_count, 1); }

    fn on_drop(&self, count: usize) { add(&self.drop_count, count); }

    fn on_malformed(&self, count: usize) { add(&self.malformed_count, count); }
}

/// Exports counters to the default prometheus registry, labelled by queue.
#[derive(Debug, Clone)]
pub struct PrometheusStats {
    queue: String,
}

impl PrometheusStats {
    pub fn new(queue: impl Into<String>) -> Self { Self { queue: queue.into() } }
}

impl Stats for PrometheusStats {
    fn on_enqueue(&self) { EVENTS_ENQUEUED.with_label_values(&[self.queue.as_str()]).inc(); }

    fn on_enqueue_error(&self) { ENQUEUE_ERRORS.with_label_values(&[self.queue.as_str()]).inc(); }

    fn on_flush_attempt(&self) { FLUSH_ATTEMPTS.with_label_values(&[self.queue.as_str()]).inc(); }

    fn on_flush_success(&self, count: usize, duration: Duration) {
        FLUSH_SUCCESSES.with_label_values(&[self.queue.as_str()]).inc();
        EVENTS_FLUSHED
            .with_label_values(&[self.queue.as_str()])
            .inc_by(count as u64);
        FLUSH_DURATION_SECONDS
            .with_label_values(&[self.queue.as_str()])
            .observe(duration.as_secs_f64());
    }

    fn on_flush_failure(&self) { FLUSH_FAILURES.with_label_values(&[self.queue.as_str()]).inc(); }

    fn on_drop(&self, count: usize) {
        EVENTS_DROPPED
            .with_label_values(&[self.queue.as_str()])
            .inc_by(count as u64);
    }

    fn on_malformed(&self, count: usize) {
        EVENTS_MALFORMED
            .with_label_values(&[self.queue.as_str()])
            .inc_by(count as u64);
    }
}
