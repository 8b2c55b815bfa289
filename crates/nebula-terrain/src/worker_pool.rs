//! Long-lived generation workers fed through a shared task queue.
//!
//! Tasks go in through a bounded channel that every worker pulls from, and
//! results come back through a bounded channel that the main loop drains with
//! [`GenerationBackend::try_recv`] without ever blocking. Workers carry no
//! state between tasks. Shutdown is cooperative: every worker checks the
//! shared [`ShutdownToken`] between tasks and while waiting to hand over a
//! result, finishing the task it holds before it exits.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{
    Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError, bounded,
};
use tracing::{debug, error, info, warn};

use crate::error::GenerationError;
use crate::heightmap::TerrainNoise;
use crate::protocol::{GenerationFailure, GenerationTask, WorkerOutput};
use crate::tessellate::generate_partition;
use crate::transport::TransportPool;

/// How often a waiting worker re-checks the shutdown token.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Cooperative stop signal shared by every worker.
#[derive(Clone, Debug, Default)]
pub struct ShutdownToken(Arc<AtomicBool>);

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder of this token to stop.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Anything that can execute generation tasks on behalf of the coordinator.
pub trait GenerationBackend {
    /// Queue a task. Hands the task back if it cannot be accepted right now.
    #[allow(clippy::result_large_err)]
    fn submit(&self, task: GenerationTask) -> Result<(), GenerationTask>;

    /// Take one finished output if any is ready. Never blocks.
    fn try_recv(&self) -> Option<WorkerOutput>;

    /// How many partitions each chunk should be split into.
    fn partitions_per_chunk(&self) -> u32;

    /// Tasks accepted but not yet answered.
    fn in_flight(&self) -> u64;
}

/// Sizing of a [`WorkerPool`].
#[derive(Clone, Debug)]
pub struct WorkerPoolConfig {
    /// Worker threads. `0` picks one less than the number of CPUs.
    pub threads: usize,
    /// Capacity of the task queue.
    pub task_capacity: usize,
    /// Capacity of the result queue.
    pub result_capacity: usize,
    /// Partitions each chunk is cut into.
    pub partitions_per_chunk: u32,
    /// Float budget shared by all result payloads in flight.
    pub transport_budget_floats: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            task_capacity: 256,
            result_capacity: 256,
            partitions_per_chunk: 2,
            transport_budget_floats: 32 * 1024 * 1024,
        }
    }
}

impl WorkerPoolConfig {
    /// Thread count after resolving `0` to the machine's parallelism.
    pub fn resolved_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get().saturating_sub(1).max(1)
        } else {
            self.threads
        }
    }
}

/// A fixed set of worker threads consuming [`GenerationTask`]s.
pub struct WorkerPool {
    task_sender: Option<Sender<GenerationTask>>,
    output_receiver: Receiver<WorkerOutput>,
    workers: Vec<JoinHandle<()>>,
    shutdown: ShutdownToken,
    in_flight: Arc<AtomicU64>,
    transport: TransportPool,
    partitions_per_chunk: u32,
}

impl WorkerPool {
    /// Spawn the workers with a fresh shutdown token.
    pub fn new(
        config: &WorkerPoolConfig,
        noise: Arc<dyn TerrainNoise>,
    ) -> Result<Self, GenerationError> {
        Self::with_shutdown(config, noise, ShutdownToken::new())
    }

    /// Spawn the workers observing an existing shutdown token.
    pub fn with_shutdown(
        config: &WorkerPoolConfig,
        noise: Arc<dyn TerrainNoise>,
        shutdown: ShutdownToken,
    ) -> Result<Self, GenerationError> {
        let threads = config.resolved_threads();
        let (task_sender, task_receiver) = bounded::<GenerationTask>(config.task_capacity.max(1));
        let (output_sender, output_receiver) =
            bounded::<WorkerOutput>(config.result_capacity.max(1));
        let in_flight = Arc::new(AtomicU64::new(0));
        let transport = TransportPool::new(config.transport_budget_floats);

        let mut pool = Self {
            task_sender: Some(task_sender),
            output_receiver,
            workers: Vec::with_capacity(threads),
            shutdown: shutdown.clone(),
            in_flight: Arc::clone(&in_flight),
            transport: transport.clone(),
            partitions_per_chunk: config.partitions_per_chunk.max(1),
        };

        for i in 0..threads {
            let worker = Worker {
                tasks: task_receiver.clone(),
                outputs: output_sender.clone(),
                noise: Arc::clone(&noise),
                transport: transport.clone(),
                shutdown: shutdown.clone(),
                in_flight: Arc::clone(&in_flight),
            };
            let handle = std::thread::Builder::new()
                .name(format!("terrain-worker-{i}"))
                .spawn(move || worker.run())
                .map_err(|e| GenerationError::Spawn(e.to_string()))?;
            pool.workers.push(handle);
        }

        info!(threads, "terrain worker pool started");
        Ok(pool)
    }

    /// Number of worker threads.
    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// The shared transport ledger.
    pub fn transport(&self) -> &TransportPool {
        &self.transport
    }

    /// Token observed by the workers.
    pub fn shutdown_token(&self) -> &ShutdownToken {
        &self.shutdown
    }

    /// Signal every worker, close the task queue, and join the threads.
    ///
    /// Undelivered results are dropped here, which reclaims their leases.
    pub fn shutdown(&mut self) {
        if self.task_sender.is_none() {
            return;
        }
        self.shutdown.trigger();
        self.task_sender.take();

        let mut joined = 0;
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("terrain worker exited by panic");
            } else {
                joined += 1;
            }
        }
        let dropped = self.output_receiver.try_iter().count();
        debug!(joined, dropped, "terrain worker pool stopped");
    }
}

impl GenerationBackend for WorkerPool {
    fn submit(&self, task: GenerationTask) -> Result<(), GenerationTask> {
        let Some(sender) = &self.task_sender else {
            return Err(task);
        };
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        sender.try_send(task).map_err(|e| {
            self.in_flight.fetch_sub(1, Ordering::Relaxed);
            match e {
                TrySendError::Full(task) | TrySendError::Disconnected(task) => task,
            }
        })
    }

    fn try_recv(&self) -> Option<WorkerOutput> {
        self.output_receiver.try_recv().ok()
    }

    fn partitions_per_chunk(&self) -> u32 {
        self.partitions_per_chunk
    }

    fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker {
    tasks: Receiver<GenerationTask>,
    outputs: Sender<WorkerOutput>,
    noise: Arc<dyn TerrainNoise>,
    transport: TransportPool,
    shutdown: ShutdownToken,
    in_flight: Arc<AtomicU64>,
}

impl Worker {
    fn run(self) {
        while !self.shutdown.is_triggered() {
            let task = match self.tasks.recv_timeout(POLL_INTERVAL) {
                Ok(task) => task,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            if let Some(output) = execute(&task, self.noise.as_ref(), &self.transport) {
                self.deliver(output);
            }
            self.in_flight.fetch_sub(1, Ordering::Relaxed);
        }
    }

    fn deliver(&self, mut output: WorkerOutput) {
        loop {
            match self.outputs.send_timeout(output, POLL_INTERVAL) {
                Ok(()) => return,
                Err(SendTimeoutError::Timeout(back)) => {
                    if self.shutdown.is_triggered() {
                        debug!(mesh_id = back.mesh_id().0, "dropping result at shutdown");
                        return;
                    }
                    output = back;
                }
                Err(SendTimeoutError::Disconnected(_)) => return,
            }
        }
    }
}

/// Run one task on the calling thread, containing any failure.
///
/// Malformed tasks are logged and produce no output.
pub fn execute(
    task: &GenerationTask,
    noise: &dyn TerrainNoise,
    transport: &TransportPool,
) -> Option<WorkerOutput> {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        generate_partition(task, noise, transport)
    }))
    .unwrap_or_else(|payload| Err(GenerationError::Panicked(panic_message(payload))));

    match outcome {
        Ok(result) => Some(WorkerOutput::Generated(result)),
        Err(GenerationError::MalformedTask(reason)) => {
            warn!(mesh_id = task.mesh_id.0, %reason, "dropping malformed generation task");
            None
        }
        Err(error) => {
            warn!(
                mesh_id = task.mesh_id.0,
                partition = task.partition_index,
                %error,
                "generation task failed"
            );
            Some(WorkerOutput::Failed(GenerationFailure {
                mesh_id: task.mesh_id,
                partition_index: task.partition_index,
                error,
            }))
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Executes tasks synchronously on the calling thread.
///
/// Outputs are buffered in submission order. Useful wherever threads would
/// make behaviour non-deterministic.
pub struct InlineGenerator {
    noise: Arc<dyn TerrainNoise>,
    transport: TransportPool,
    outputs: RefCell<VecDeque<WorkerOutput>>,
    partitions_per_chunk: u32,
    capacity: usize,
    submitted: Cell<u64>,
}

impl InlineGenerator {
    pub fn new(noise: Arc<dyn TerrainNoise>, partitions_per_chunk: u32) -> Self {
        Self {
            noise,
            transport: TransportPool::new(usize::MAX),
            outputs: RefCell::new(VecDeque::new()),
            partitions_per_chunk: partitions_per_chunk.max(1),
            capacity: usize::MAX,
            submitted: Cell::new(0),
        }
    }

    /// Limit the float budget of the transport ledger.
    pub fn with_transport_budget(mut self, floats: usize) -> Self {
        self.transport = TransportPool::new(floats);
        self
    }

    /// Refuse submissions while this many outputs are waiting.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn transport(&self) -> &TransportPool {
        &self.transport
    }

    /// Tasks accepted so far.
    pub fn submitted(&self) -> u64 {
        self.submitted.get()
    }

    /// Outputs waiting to be received.
    pub fn pending(&self) -> usize {
        self.outputs.borrow().len()
    }
}

impl GenerationBackend for InlineGenerator {
    fn submit(&self, task: GenerationTask) -> Result<(), GenerationTask> {
        if self.outputs.borrow().len() >= self.capacity {
            return Err(task);
        }
        self.submitted.set(self.submitted.get() + 1);
        if let Some(output) = execute(&task, self.noise.as_ref(), &self.transport) {
            self.outputs.borrow_mut().push_back(output);
        }
        Ok(())
    }

    fn try_recv(&self) -> Option<WorkerOutput> {
        self.outputs.borrow_mut().pop_front()
    }

    fn partitions_per_chunk(&self) -> u32 {
        self.partitions_per_chunk
    }

    fn in_flight(&self) -> u64 {
        self.outputs.borrow().len() as u64
    }
}
