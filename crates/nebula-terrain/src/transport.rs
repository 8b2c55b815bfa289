//! Budgeted transport buffers carrying vertex batches from workers to the integrator.
//!
//! A worker leases a [`TransportBuffer`] from the shared [`TransportPool`]
//! before it writes a batch. The lease is owned by the buffer for its whole
//! life and is settled exactly once: [`TransportBuffer::into_parts`] releases
//! it when the integrator consumes the batch, and dropping the buffer on any
//! other path (stale result, failed send, shutdown) reclaims it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dashmap::DashMap;
use glam::Vec3;
use tracing::error;

use crate::error::TransportError;

/// Identifier of a live lease.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LeaseId(u64);

#[derive(Debug)]
struct Ledger {
    budget_floats: usize,
    outstanding: AtomicUsize,
    next_id: AtomicU64,
    leases: DashMap<LeaseId, usize>,
    released: AtomicU64,
    reclaimed: AtomicU64,
}

impl Ledger {
    fn settle(&self, id: LeaseId, consumed: bool) {
        match self.leases.remove(&id) {
            Some((_, floats)) => {
                self.outstanding.fetch_sub(floats, Ordering::AcqRel);
                let counter = if consumed {
                    &self.released
                } else {
                    &self.reclaimed
                };
                counter.fetch_add(1, Ordering::Relaxed);
            }
            None => error!(lease = id.0, "transport lease settled twice"),
        }
    }
}

/// Shared accounting for every in-flight transport buffer.
///
/// Cloning is cheap; all clones share one ledger.
#[derive(Clone, Debug)]
pub struct TransportPool {
    ledger: Arc<Ledger>,
}

impl TransportPool {
    /// Create a pool that allows at most `budget_floats` floats in flight.
    pub fn new(budget_floats: usize) -> Self {
        Self {
            ledger: Arc::new(Ledger {
                budget_floats,
                outstanding: AtomicUsize::new(0),
                next_id: AtomicU64::new(0),
                leases: DashMap::new(),
                released: AtomicU64::new(0),
                reclaimed: AtomicU64::new(0),
            }),
        }
    }

    /// Reserve room for `vertex_count` positions and colours.
    pub fn acquire(&self, vertex_count: usize) -> Result<TransportBuffer, TransportError> {
        let floats = vertex_count * 6;
        let ledger = &self.ledger;
        let mut current = ledger.outstanding.load(Ordering::Acquire);
        loop {
            let available = ledger.budget_floats.saturating_sub(current);
            if floats > available {
                return Err(TransportError::Exhausted {
                    requested: floats,
                    available,
                });
            }
            match ledger.outstanding.compare_exchange_weak(
                current,
                current + floats,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        let id = LeaseId(ledger.next_id.fetch_add(1, Ordering::Relaxed));
        ledger.leases.insert(id, floats);

        Ok(TransportBuffer {
            vertices: Vec::with_capacity(vertex_count * 3),
            colors: Vec::with_capacity(vertex_count * 3),
            capacity: vertex_count,
            lease: Lease {
                id,
                ledger: Arc::clone(&self.ledger),
                consumed: false,
            },
        })
    }

    /// Floats currently reserved by live buffers.
    pub fn outstanding_floats(&self) -> usize {
        self.ledger.outstanding.load(Ordering::Acquire)
    }

    /// Number of live buffers.
    pub fn live_leases(&self) -> usize {
        self.ledger.leases.len()
    }

    /// Buffers consumed by the integrator.
    pub fn released_count(&self) -> u64 {
        self.ledger.released.load(Ordering::Relaxed)
    }

    /// Buffers dropped without being consumed.
    pub fn reclaimed_count(&self) -> u64 {
        self.ledger.reclaimed.load(Ordering::Relaxed)
    }

    /// Total float budget.
    pub fn budget_floats(&self) -> usize {
        self.ledger.budget_floats
    }
}

#[derive(Debug)]
struct Lease {
    id: LeaseId,
    ledger: Arc<Ledger>,
    consumed: bool,
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.ledger.settle(self.id, self.consumed);
    }
}

/// Interleaved-free vertex and colour storage for one batch.
#[derive(Debug)]
pub struct TransportBuffer {
    vertices: Vec<f32>,
    colors: Vec<f32>,
    capacity: usize,
    lease: Lease,
}

impl TransportBuffer {
    /// Append one vertex with its colour.
    pub fn push(&mut self, position: Vec3, color: Vec3) -> Result<(), TransportError> {
        if self.len() >= self.capacity {
            return Err(TransportError::Overflow {
                capacity: self.capacity * 6,
            });
        }
        self.vertices.extend_from_slice(&position.to_array());
        self.colors.extend_from_slice(&color.to_array());
        Ok(())
    }

    /// Number of vertices written so far.
    pub fn len(&self) -> usize {
        self.vertices.len() / 3
    }

    /// Returns `true` if no vertex has been written.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Flat `xyz` positions.
    pub fn vertices(&self) -> &[f32] {
        &self.vertices
    }

    /// Flat `rgb` colours, one triple per vertex.
    pub fn colors(&self) -> &[f32] {
        &self.colors
    }

    /// Identifier of the lease backing this buffer.
    pub fn lease_id(&self) -> LeaseId {
        self.lease.id
    }

    /// Take the data out and release the lease.
    pub fn into_parts(mut self) -> (Vec<f32>, Vec<f32>) {
        self.lease.consumed = true;
        let vertices = std::mem::take(&mut self.vertices);
        let colors = std::mem::take(&mut self.colors);
        (vertices, colors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_reserves_and_consume_releases() {
        let pool = TransportPool::new(600);
        let mut buffer = pool.acquire(10).unwrap();
        assert_eq!(pool.outstanding_floats(), 60);
        assert_eq!(pool.live_leases(), 1);

        buffer.push(Vec3::ONE, Vec3::ZERO).unwrap();
        let (vertices, colors) = buffer.into_parts();
        assert_eq!(vertices, vec![1.0, 1.0, 1.0]);
        assert_eq!(colors, vec![0.0, 0.0, 0.0]);

        assert_eq!(pool.outstanding_floats(), 0);
        assert_eq!(pool.live_leases(), 0);
        assert_eq!(pool.released_count(), 1);
        assert_eq!(pool.reclaimed_count(), 0);
    }

    #[test]
    fn test_drop_reclaims_exactly_once() {
        let pool = TransportPool::new(600);
        {
            let _buffer = pool.acquire(4).unwrap();
        }
        assert_eq!(pool.outstanding_floats(), 0);
        assert_eq!(pool.released_count(), 0);
        assert_eq!(pool.reclaimed_count(), 1);
    }

    #[test]
    fn test_exhausted_budget_is_reported() {
        let pool = TransportPool::new(60);
        let held = pool.acquire(10).unwrap();
        let err = pool.acquire(1).unwrap_err();
        assert_eq!(
            err,
            TransportError::Exhausted {
                requested: 6,
                available: 0
            }
        );
        drop(held);
        assert!(pool.acquire(10).is_ok());
    }

    #[test]
    fn test_overflow_past_reservation() {
        let pool = TransportPool::new(600);
        let mut buffer = pool.acquire(1).unwrap();
        buffer.push(Vec3::X, Vec3::X).unwrap();
        assert!(matches!(
            buffer.push(Vec3::Y, Vec3::Y),
            Err(TransportError::Overflow { .. })
        ));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_concurrent_leases_balance_out() {
        let pool = TransportPool::new(1_000_000);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    for j in 0..100 {
                        let buffer = pool.acquire(16).unwrap();
                        if (i + j) % 2 == 0 {
                            let _ = buffer.into_parts();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(pool.outstanding_floats(), 0);
        assert_eq!(pool.released_count() + pool.reclaimed_count(), 800);
        assert_eq!(pool.released_count(), 400);
    }
}
