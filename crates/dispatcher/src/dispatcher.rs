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


//! Caller-facing side of the dispatcher.
//!
//! ```ignore
//! let queue = open_queue(dir.join("events"), FlushMode::Sync, JsonCodec::<Event>::new());
//! let dispatcher = Dispatcher::start(DispatcherConfig::default(), queue, uploader, stats)?;
//!
//! // Cheap, non-blocking, callable from any thread.
//! dispatcher.enqueue(event)?;
//! dispatcher.flush();
//!
//! // Drain and stop.
//! dispatcher.shutdown()?;
//! ```

use std::{
    fmt,
    path::PathBuf,
    sync::{Arc, atomic::Ordering},
    thread::{self, JoinHandle},
};

use beacon_common_storage_queue::{
    Codec, ElementQueue, FlushMode, MemoryQueue, PayloadQueue, QueueBuilder,
};
use crossbeam::channel::{Sender, bounded, unbounded};
use snafu::{OptionExt, ResultExt, ensure};
use tracing::{error, info};

use crate::{
    DispatcherConfig, Result, Stats, Uploader,
    error::{ClosedSnafu, SpawnWorkerSnafu, WorkerPanickedSnafu},
    worker::{Command, DispatchWorker, Shared},
};

/// Opens the durable queue at `path`, falling back to a [`MemoryQueue`] if
/// the file cannot be opened. Corrupt files are recreated empty.
pub fn open_queue<C: Codec>(
    path: impl Into<PathBuf>,
    flush_mode: FlushMode,
    codec: C,
) -> PayloadQueue<C> {
    let path = path.into();
    let opened = QueueBuilder::new(&path).flush_mode(flush_mode).open();
    let store: Box<dyn ElementQueue> = match opened {
        Ok(file) => Box::new(file),
        Err(e) => {
            error!(
                path = ?path,
                error = %e,
                "Failed to open queue file, events will only be kept in memory"
            );
            Box::new(MemoryQueue::new())
        }
    };
    PayloadQueue::new(store, codec)
}

/// Sends commands to the dispatcher worker.
///
/// Handles are cheap to clone and can be used from any thread. Every
/// operation returns without touching the disk, except
/// [`flush_blocking`](Self::flush_blocking).
pub struct DispatcherHandle<T> {
    name:   Arc<str>,
    tx:     Sender<Command<T>>,
    shared: Arc<Shared>,
}

impl<T> Clone for DispatcherHandle<T> {
    fn clone(&self) -> Self {
        Self {
            name:   self.name.clone(),
            tx:     self.tx.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl<T> fmt::Debug for DispatcherHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherHandle")
            .field("name", &self.name)
            .field("queued", &self.size())
            .field("flushing", &self.is_flushing())
            .finish()
    }
}

impl<T> DispatcherHandle<T> {
    /// Queues `item` for delivery.
    ///
    /// Storage failures are reported through [`Stats`], not here; the only
    /// error is a dispatcher that has already stopped.
    pub fn enqueue(&self, item: T) -> Result<()> {
        ensure!(
            self.tx.send(Command::Enqueue(item)).is_ok(),
            ClosedSnafu {
                name: self.name.as_ref(),
            }
        );
        Ok(())
    }

    /// Requests a flush without waiting for it.
    ///
    /// A no-op while an earlier request is still pending or running.
    pub fn flush(&self) {
        if self.shared.pending_flush.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.tx.send(Command::Flush).is_err() {
            self.shared.pending_flush.store(false, Ordering::Release);
        }
    }

    /// Flushes and waits until the worker has finished draining.
    pub fn flush_blocking(&self) -> Result<()> {
        let (ack_tx, ack_rx) = bounded(1);
        ensure!(
            self.tx.send(Command::FlushBlocking(ack_tx)).is_ok(),
            ClosedSnafu {
                name: self.name.as_ref(),
            }
        );
        ack_rx.recv().ok().context(ClosedSnafu {
            name: self.name.as_ref(),
        })
    }

    /// Number of queued events as of the worker's last operation.
    #[must_use]
    pub fn size(&self) -> usize { self.shared.queued.load(Ordering::Acquire) }

    #[must_use]
    pub fn is_flushing(&self) -> bool { self.shared.flushing.load(Ordering::Acquire) }

    #[must_use]
    pub fn name(&self) -> &str { &self.name }
}

/// Owns the worker thread. Dereferences to a [`DispatcherHandle`].
#[derive(derive_more::Deref)]
pub struct Dispatcher<T> {
    #[deref]
    handle: DispatcherHandle<T>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Dispatcher<T> {
    /// Spawns the worker thread over `queue`.
    ///
    /// If the queue already holds `flush_at` events, the worker flushes
    /// immediately.
    pub fn start<C, U>(
        config: DispatcherConfig,
        queue: PayloadQueue<C>,
        uploader: U,
        stats: Arc<dyn Stats>,
    ) -> Result<Self>
    where
        C: Codec<Item = T> + 'static,
        U: Uploader<T> + 'static,
    {
        config.validate()?;
        let config = Arc::new(config);
        let queue = queue.with_max_payload_bytes(config.max_payload_bytes);

        let (tx, rx) = unbounded();
        let shared = Arc::new(Shared::default());
        let mut worker = DispatchWorker::new(
            rx,
            config.clone(),
            queue,
            uploader,
            stats,
            shared.clone(),
        );

        let worker = thread::Builder::new()
            .name(format!("beacon-{}-dispatcher", config.name))
            .spawn(move || worker.run())
            .context(SpawnWorkerSnafu)?;

        info!(
            name = %config.name,
            flush_at = config.flush_at,
            flush_interval = ?config.flush_interval,
            max_queue_size = config.max_queue_size,
            "Dispatcher started"
        );

        Ok(Self {
            handle: DispatcherHandle {
                name: Arc::from(config.name.as_str()),
                tx,
                shared,
            },
            worker: Some(worker),
        })
    }
}

impl<T> Dispatcher<T> {
    /// Returns a clonable handle for other threads.
    #[must_use]
    pub fn handle(&self) -> DispatcherHandle<T> { self.handle.clone() }

    /// Drains the queue, closes it and joins the worker thread.
    ///
    /// Events that cannot be delivered stay in the queue file for the next
    /// start.
    pub fn shutdown(mut self) -> Result<()> {
        info!(name = %self.handle.name, "Shutting down dispatcher");
        let _ = self.handle.tx.send(Command::Shutdown);

        if let Some(worker) = self.worker.take() {
            worker.join().ok().context(WorkerPanickedSnafu {
                name: self.handle.name.as_ref(),
            })?;
        }

        info!(name = %self.handle.name, "Dispatcher shutdown complete");
        Ok(())
    }
}

impl<T> fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handle", &self.handle)
            .field("running", &self.worker.is_some())
            .finish()
    }
}

impl<T> Drop for Dispatcher<T> {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.handle.tx.send(Command::Shutdown);
        }
    }
}
