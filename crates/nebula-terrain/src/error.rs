//! Generation and transport error types.

/// Failures moving a generated batch from a worker to the integrator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The shared transport budget cannot hold another batch right now.
    #[error("transport budget exhausted: requested {requested} floats, {available} available")]
    Exhausted {
        /// Floats the batch needed.
        requested: usize,
        /// Floats left in the budget when the request was made.
        available: usize,
    },

    /// A worker tried to write past the capacity it reserved.
    #[error("transport buffer overflow: capacity {capacity} floats")]
    Overflow {
        /// Floats reserved for the buffer.
        capacity: usize,
    },

    /// The receiving side of the result channel is gone.
    #[error("result channel disconnected")]
    Disconnected,
}

/// Errors produced while executing a generation task.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    /// The task cannot be executed as described. Dropped by the worker.
    #[error("malformed task: {0}")]
    MalformedTask(String),

    /// The batch could not be handed over to the integrator.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// Tessellation panicked; the worker caught it and kept running.
    #[error("generation panicked: {0}")]
    Panicked(String),

    /// The operating system refused to start a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),
}
