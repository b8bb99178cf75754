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


//! Background thread that owns the queue and performs uploads.
//!
//! ```text
//! ┌──────────────┐     crossbeam      ┌────────────────┐   add/peek/remove   ┌──────────────┐
//! │  Dispatcher  │ ──── channel ────► │ DispatchWorker │ ──────────────────► │ PayloadQueue │
//! │   (caller)   │     Command<T>     │  (bg thread)   │                     └──────────────┘
//! └──────────────┘                    └────────────────┘ ───── upload ─────► Uploader
//! ```
//!
//! Commands are handled strictly in arrival order, so uploads follow enqueue
//! order and at most one flush is ever in flight.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Instant,
};

use beacon_common_storage_queue::{Codec, PayloadQueue, QueueError};
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info, warn};

use crate::{DispatcherConfig, Stats, UploadError, Uploader};

pub(crate) enum Command<T> {
    Enqueue(T),
    /// Coalesced flush request; see [`Shared::pending_flush`].
    Flush,
    /// Flush, then acknowledge.
    FlushBlocking(Sender<()>),
    /// Drain, close the queue and exit.
    Shutdown,
}

/// State visible to both the worker and the callers.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    /// Set while a `Flush` command is queued or running. Cleared by the worker
    /// once that flush is done, so requests in between are no-ops.
    pub(crate) pending_flush: AtomicBool,
    pub(crate) flushing:      AtomicBool,
    /// Elements in the queue as of the last worker operation.
    pub(crate) queued:        AtomicUsize,
}

/// Result of one peek/upload/remove round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Round {
    /// Nothing to send.
    Empty,
    /// The batch left the queue (delivered, rejected or all malformed).
    Progress,
    /// The batch is still queued.
    Stalled,
}

pub(crate) struct DispatchWorker<C: Codec, U> {
    rx:        Receiver<Command<C::Item>>,
    config:    Arc<DispatcherConfig>,
    queue:     PayloadQueue<C>,
    uploader:  U,
    stats:     Arc<dyn Stats>,
    shared:    Arc<Shared>,
    /// Events enqueued since the last flush attempt.
    counter:   usize,
    next_tick: Instant,
}

impl<C, U> DispatchWorker<C, U>
where
    C: Codec,
    U: Uploader<C::Item>,
{
    pub(crate) fn new(
        rx: Receiver<Command<C::Item>>,
        config: Arc<DispatcherConfig>,
        queue: PayloadQueue<C>,
        uploader: U,
        stats: Arc<dyn Stats>,
        shared: Arc<Shared>,
    ) -> Self {
        let counter = queue.size();
        shared.queued.store(counter, Ordering::Release);
        let next_tick = Instant::now() + config.flush_interval;
        Self {
            rx,
            config,
            queue,
            uploader,
            stats,
            shared,
            counter,
            next_tick,
        }
    }

    /// Processes commands until shutdown or until every sender is gone.
    pub(crate) fn run(&mut self) {
        info!(
            name = %self.config.name,
            store = self.queue.kind(),
            queued = self.queue.size(),
            "Dispatcher worker starting"
        );

        if self.queue.size() >= self.config.flush_at {
            self.flush();
        }

        loop {
            if Instant::now() >= self.next_tick {
                self.on_tick();
            }

            match self.rx.recv_deadline(self.next_tick) {
                Ok(Command::Enqueue(item)) => self.enqueue(&item),
                Ok(Command::Flush) => {
                    self.flush();
                    self.shared.pending_flush.store(false, Ordering::Release);
                }
                Ok(Command::FlushBlocking(ack)) => {
                    self.flush();
                    let _ = ack.send(());
                }
                Ok(Command::Shutdown) => {
                    info!(name = %self.config.name, "Dispatcher received shutdown signal");
                    break;
                }
                Err(RecvTimeoutError::Timeout) => self.on_tick(),
                Err(RecvTimeoutError::Disconnected) => {
                    info!(name = %self.config.name, "Dispatcher channel disconnected");
                    break;
                }
            }
        }

        self.flush();
        if let Err(e) = self.queue.close() {
            error!(name = %self.config.name, error = %e, "Failed to close queue");
        }
        info!(name = %self.config.name, remaining = self.queue.size(), "Dispatcher worker stopped");
    }

    fn on_tick(&mut self) {
        self.next_tick = Instant::now() + self.config.flush_interval;
        if !self.queue.is_empty() {
            debug!(name = %self.config.name, "Flush interval elapsed");
            self.flush();
        }
    }

    fn enqueue(&mut self, item: &C::Item) {
        if let Err(e) = self.queue.add(item) {
            error!(name = %self.config.name, error = %e, "Failed to enqueue event, dropping it");
            self.stats.on_enqueue_error();
            return;
        }
        self.stats.on_enqueue();
        self.enforce_cap();
        self.publish_size();

        self.counter += 1;
        if self.counter >= self.config.flush_at {
            self.flush();
        }
    }

    /// Evicts the oldest events beyond `max_queue_size`.
    fn enforce_cap(&mut self) {
        let size = self.queue.size();
        if size <= self.config.max_queue_size {
            return;
        }
        let excess = size - self.config.max_queue_size;
        match self.queue.remove(excess) {
            Ok(()) => {
                warn!(
                    name = %self.config.name,
                    dropped = excess,
                    max = self.config.max_queue_size,
                    "Queue is full, dropped oldest events"
                );
                self.stats.on_drop(excess);
            }
            Err(e) if e.is_corruption() => self.recover_from_corruption(&e),
            Err(e) => error!(name = %self.config.name, error = %e, "Failed to evict events"),
        }
    }

    /// Drops the whole queue once its layout on disk is unreadable.
    fn recover_from_corruption(&mut self, cause: &QueueError) {
        let lost = self.queue.size();
        match self.queue.clear() {
            Ok(()) => {
                warn!(
                    name = %self.config.name,
                    error = %cause,
                    dropped = lost,
                    "Queue became corrupt, cleared it"
                );
                self.stats.on_drop(lost);
            }
            Err(e) => error!(
                name = %self.config.name,
                error = %e,
                cause = %cause,
                "Failed to clear corrupt queue"
            ),
        }
        self.publish_size();
    }

    /// Uploads batches until the queue is empty or an upload fails.
    fn flush(&mut self) {
        self.counter = 0;
        if self.queue.is_empty() {
            return;
        }

        self.shared.flushing.store(true, Ordering::Release);
        while self.flush_round() == Round::Progress && !self.queue.is_empty() {}
        self.shared.flushing.store(false, Ordering::Release);
        self.publish_size();
    }

    fn flush_round(&mut self) -> Round {
        let batch = match self.queue.peek(self.config.batch_limit()) {
            Ok(batch) => batch,
            Err(e) if e.is_corruption() => {
                self.stats.on_flush_failure();
                self.recover_from_corruption(&e);
                return Round::Empty;
            }
            Err(e) => {
                error!(name = %self.config.name, error = %e, "Failed to read batch");
                self.stats.on_flush_failure();
                return Round::Stalled;
            }
        };
        if batch.is_empty() {
            return Round::Empty;
        }
        if batch.malformed > 0 {
            self.stats.on_malformed(batch.malformed);
        }
        if batch.items.is_empty() {
            return self.discard(batch.consumed);
        }

        self.stats.on_flush_attempt();
        let started = Instant::now();
        match self.uploader.upload(&batch.items) {
            Ok(()) => {
                let elapsed = started.elapsed();
                debug!(
                    name = %self.config.name,
                    events = batch.items.len(),
                    bytes = batch.bytes,
                    elapsed = ?elapsed,
                    "Batch delivered"
                );
                self.stats.on_flush_success(batch.items.len(), elapsed);
                self.discard(batch.consumed)
            }
            Err(UploadError::Rejected { status }) => {
                warn!(
                    name = %self.config.name,
                    status,
                    events = batch.items.len(),
                    "Batch rejected by server, dropping it"
                );
                self.stats.on_flush_failure();
                self.stats.on_drop(batch.items.len());
                self.discard(batch.consumed)
            }
            Err(e) => {
                warn!(name = %self.config.name, error = %e, "Batch upload failed, will retry");
                self.stats.on_flush_failure();
                Round::Stalled
            }
        }
    }

    fn discard(&mut self, consumed: usize) -> Round {
        match self.queue.remove(consumed) {
            Ok(()) => Round::Progress,
            Err(e) if e.is_corruption() => {
                self.recover_from_corruption(&e);
                Round::Empty
            }
            Err(e) => {
                error!(name = %self.config.name, error = %e, "Failed to remove batch");
                Round::Stalled
            }
        }
    }

    fn publish_size(&self) { self.shared.queued.store(self.queue.size(), Ordering::Release); }
}
