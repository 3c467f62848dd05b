// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A hardware queue driven by a dedicated worker thread.
//!
//! Producers on any thread queue closures; the worker runs them one at a time,
//! in the order they arrived, against the native queue.

use super::{CommandListPool, Fence, HardwareQueueClass};
use crate::backend::{GraphicsBackend, NativeQueue};
use crate::command::CommandList;
use crate::device::ObjectState;
use crate::error::{RhiError, RhiResult};
use crate::sync::{lock, read, write};
use flume::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{JoinHandle, ThreadId};
use std::time::Duration;

/// A unit of work run on a queue's worker thread.
pub type Command<B> = Box<dyn FnOnce(&<B as GraphicsBackend>::Queue) + Send + 'static>;

/// Parameters of a [`CommandQueue`].
#[derive(Debug, Clone)]
pub struct CommandQueueDescriptor {
    /// The queue class served.
    pub hardware_queue_class: HardwareQueueClass,
    /// Capacity of the queue's command list pool.
    pub command_list_capacity: usize,
    /// How long acquiring a command list may block.
    pub command_list_acquire_timeout: Duration,
    /// How long CPU waits on the queue fence may block.
    pub fence_wait_timeout: Duration,
}

impl CommandQueueDescriptor {
    /// Creates a descriptor with default pool and timeout settings.
    pub fn new(hardware_queue_class: HardwareQueueClass) -> Self {
        Self {
            hardware_queue_class,
            command_list_capacity: 16,
            command_list_acquire_timeout: Duration::from_secs(2),
            fence_wait_timeout: Duration::from_secs(5),
        }
    }
}

/// Command lists submitted together, and the fence value that marks their completion.
pub struct ExecuteWorkRequest<B: GraphicsBackend> {
    /// Closed command lists, executed in order.
    pub command_lists: Vec<CommandList<B>>,
    /// The queue fence value signaled once every list completed.
    pub signal_fence_value: u64,
}

struct Running<B: GraphicsBackend> {
    sender: Sender<Command<B>>,
    native: Arc<B::Queue>,
    fence: Arc<Fence<B>>,
    pool: Arc<CommandListPool<B>>,
    worker_id: ThreadId,
}

impl<B: GraphicsBackend> Clone for Running<B> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            native: self.native.clone(),
            fence: self.fence.clone(),
            pool: self.pool.clone(),
            worker_id: self.worker_id,
        }
    }
}

/// One hardware queue of a device.
///
/// Commands queued from a single thread run in the order they were queued.
/// There is no ordering between different queues.
pub struct CommandQueue<B: GraphicsBackend> {
    descriptor: CommandQueueDescriptor,
    state: Mutex<ObjectState>,
    running: RwLock<Option<Running<B>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    quitting: AtomicBool,
    pending: Arc<AtomicUsize>,
    executed: Arc<AtomicU64>,
}

impl<B: GraphicsBackend> CommandQueue<B> {
    /// Creates an uninitialized queue.
    pub fn new(descriptor: CommandQueueDescriptor) -> Self {
        Self {
            descriptor,
            state: Mutex::new(ObjectState::Uninitialized),
            running: RwLock::new(None),
            worker: Mutex::new(None),
            quitting: AtomicBool::new(false),
            pending: Arc::new(AtomicUsize::new(0)),
            executed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Creates the native queue, its fence and pool, and starts the worker thread.
    ///
    /// # Errors
    ///
    /// * `InvalidOperation` if the queue was already initialized.
    /// * Any error raised by the backend while creating native objects.
    pub fn init(&self, backend: &Arc<B>, device: &Arc<B::Device>) -> RhiResult<()> {
        let mut state = lock(&self.state);
        state.ensure_can_init("command queue")?;

        let queue_class = self.descriptor.hardware_queue_class;
        let native = Arc::new(backend.create_queue(device, queue_class)?);
        let fence = Arc::new(Fence::new(
            backend.create_fence(device, 0)?,
            0,
            self.descriptor.fence_wait_timeout,
        ));
        let pool = Arc::new(CommandListPool::new(
            backend.clone(),
            device.clone(),
            queue_class,
            self.descriptor.command_list_capacity,
            self.descriptor.command_list_acquire_timeout,
            fence.clone(),
        ));

        let (sender, receiver) = flume::unbounded();
        let worker_native = native.clone();
        let pending = self.pending.clone();
        let executed = self.executed.clone();
        let handle = std::thread::Builder::new()
            .name(format!("strata-{queue_class}-queue"))
            .spawn(move || worker_loop::<B>(receiver, worker_native, pending, executed))
            .map_err(|e| RhiError::Fail(format!("failed to spawn {queue_class} queue thread: {e}")))?;

        *write(&self.running) = Some(Running {
            sender,
            native,
            fence,
            pool,
            worker_id: handle.thread().id(),
        });
        *lock(&self.worker) = Some(handle);
        *state = ObjectState::Initialized;
        log::debug!("Started {queue_class} command queue");
        Ok(())
    }

    fn running(&self) -> RhiResult<Running<B>> {
        read(&self.running).clone().ok_or_else(|| {
            RhiError::invalid_operation(format!(
                "{} command queue is not running",
                self.descriptor.hardware_queue_class
            ))
        })
    }

    /// Queues a command for the worker thread.
    ///
    /// Called from the worker thread itself, the command runs immediately instead.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if the queue is not initialized or is shutting down.
    pub fn queue_command(&self, command: Command<B>) -> RhiResult<()> {
        if self.quitting.load(Ordering::Acquire) {
            return Err(RhiError::invalid_operation(format!(
                "{} command queue is shutting down",
                self.descriptor.hardware_queue_class
            )));
        }
        let running = self.running()?;

        if std::thread::current().id() == running.worker_id {
            command(&running.native);
            self.executed.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        self.pending.fetch_add(1, Ordering::AcqRel);
        if running.sender.send(command).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(RhiError::invalid_operation(format!(
                "{} command queue worker has exited",
                self.descriptor.hardware_queue_class
            )));
        }
        Ok(())
    }

    /// Spins, yielding, until every queued command has run.
    ///
    /// This is a soft barrier. Commands queued concurrently by other threads may
    /// or may not be waited for, and the call returns immediately on the worker
    /// thread itself.
    pub fn flush_commands(&self) {
        let Some(running) = read(&self.running).clone() else {
            return;
        };
        if std::thread::current().id() == running.worker_id {
            return;
        }
        while self.pending.load(Ordering::Acquire) > 0 && !self.quitting.load(Ordering::Acquire) {
            std::thread::yield_now();
        }
    }

    /// Submits command lists and signals the queue fence once they complete.
    ///
    /// The lists are retired into the queue's pool and recycled once the fence
    /// reaches `request.signal_fence_value`.
    pub fn execute_work(&self, request: ExecuteWorkRequest<B>) -> RhiResult<()> {
        let running = self.running()?;
        let fence = running.fence.clone();
        let pool = running.pool.clone();
        let queue_class = self.descriptor.hardware_queue_class;

        self.queue_command(Box::new(move |native: &B::Queue| {
            let ExecuteWorkRequest {
                command_lists,
                signal_fence_value,
            } = request;
            let natives: Vec<&B::CommandList> =
                command_lists.iter().map(CommandList::native).collect();
            log::trace!(
                "{queue_class} queue: submitting {} command list(s), signal {signal_fence_value}",
                natives.len()
            );
            if let Err(err) = native.submit(&natives, Some((fence.native(), signal_fence_value))) {
                log::error!("{queue_class} queue submission failed: {err}");
                fence.signal_on_cpu(signal_fence_value);
            }
            pool.retire(signal_fence_value, command_lists);
        }))
    }

    /// Queues an empty submission that signals the next fence value.
    ///
    /// # Returns
    ///
    /// The fence value that will be reached once the signal executes.
    pub fn signal_fence(&self) -> RhiResult<u64> {
        let running = self.running()?;
        let value = running.fence.next_value();
        let fence = running.fence.clone();
        let queue_class = self.descriptor.hardware_queue_class;
        self.queue_command(Box::new(move |native: &B::Queue| {
            if let Err(err) = native.submit(&[], Some((fence.native(), value))) {
                log::error!("{queue_class} queue failed to signal {value}: {err}");
                fence.signal_on_cpu(value);
            }
        }))?;
        Ok(value)
    }

    /// Flushes the queue, then waits until the GPU reached the last reserved fence value.
    pub fn wait_for_idle(&self) -> RhiResult<()> {
        let running = self.running()?;
        self.flush_commands();
        running.fence.wait_on_cpu(running.fence.pending_value())?;
        running.native.wait_for_idle()
    }

    /// Stops the worker thread after it drained every queued command.
    ///
    /// Shutting down twice, or shutting down a queue that never started, does nothing.
    pub fn shutdown(&self) {
        let mut state = lock(&self.state);
        if *state != ObjectState::Initialized {
            *state = ObjectState::Shutdown;
            return;
        }
        self.quitting.store(true, Ordering::Release);

        let queue_class = self.descriptor.hardware_queue_class;
        // The worker drains the channel and exits once every sender is gone,
        // including clones still held by producers racing this call.
        drop(write(&self.running).take());
        if let Some(handle) = lock(&self.worker).take() {
            if std::thread::current().id() == handle.thread().id() {
                log::error!("{queue_class} command queue cannot join itself; detaching its worker");
            } else if handle.join().is_err() {
                log::error!("{queue_class} command queue worker panicked before shutdown");
            }
        }
        *state = ObjectState::Shutdown;
        log::debug!(
            "Stopped {queue_class} command queue after {} command(s)",
            self.executed_command_count()
        );
    }

    /// The queue class served.
    pub fn hardware_queue_class(&self) -> HardwareQueueClass {
        self.descriptor.hardware_queue_class
    }

    /// The lifecycle state.
    pub fn state(&self) -> ObjectState {
        *lock(&self.state)
    }

    /// The queue's timeline fence.
    pub fn fence(&self) -> RhiResult<Arc<Fence<B>>> {
        Ok(self.running()?.fence)
    }

    /// The queue's command list pool.
    pub fn command_list_pool(&self) -> RhiResult<Arc<CommandListPool<B>>> {
        Ok(self.running()?.pool)
    }

    /// The number of commands run so far, inline or on the worker.
    pub fn executed_command_count(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    /// A best-effort count of commands queued but not yet run.
    pub fn pending_command_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

impl<B: GraphicsBackend> Drop for CommandQueue<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop<B: GraphicsBackend>(
    receiver: Receiver<Command<B>>,
    native: Arc<B::Queue>,
    pending: Arc<AtomicUsize>,
    executed: Arc<AtomicU64>,
) {
    while let Ok(command) = receiver.recv() {
        command(&native);
        executed.fetch_add(1, Ordering::Relaxed);
        pending.fetch_sub(1, Ordering::AcqRel);
    }
}
