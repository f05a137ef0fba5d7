//! Bounded in-memory replay buffer
//!
//! Self-play workers push whole episodes, the training loop samples
//! uniformly with replacement. The buffer is a FIFO ring: once `capacity`
//! records are held, every push evicts the oldest one.
//!
//! Records are stored behind `Arc` and never mutated after insertion, so
//! sampling hands out cheap clones while the lock is held only for the
//! index lookups.

use rand::seq::index;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Not enough records to sample yet. Recoverable: the caller waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("replay buffer holds {len} records, needs at least {min_fill}")]
pub struct BufferUnderrun {
    pub len: usize,
    pub min_fill: usize,
}

/// Bounded FIFO shared between self-play producers and the trainer.
#[derive(Debug)]
pub struct ReplayBuffer<R> {
    records: Mutex<VecDeque<Arc<R>>>,
    capacity: usize,
    min_fill: usize,
    total_pushed: AtomicU64,
}

impl<R> ReplayBuffer<R> {
    /// Create a buffer holding at most `capacity` records.
    ///
    /// `min_fill` is the number of records required before sampling is
    /// allowed, clamped to `[1, capacity]`.
    pub fn new(capacity: usize, min_fill: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            min_fill: min_fill.clamp(1, capacity),
            total_pushed: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Arc<R>>> {
        // A panicking producer cannot leave a half-written record behind
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push_locked(&self, records: &mut VecDeque<Arc<R>>, record: Arc<R>) {
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Append one record, evicting the oldest when full.
    pub fn push(&self, record: R) {
        let mut records = self.lock();
        self.push_locked(&mut records, Arc::new(record));
        self.total_pushed.fetch_add(1, Ordering::Relaxed);
    }

    /// Append a whole episode under a single lock acquisition.
    ///
    /// Samplers see either none or all of `batch`.
    pub fn push_batch(&self, batch: Vec<R>) -> usize {
        let count = batch.len();
        if count == 0 {
            return 0;
        }
        let arcs: Vec<Arc<R>> = batch.into_iter().map(Arc::new).collect();

        let mut records = self.lock();
        for record in arcs {
            self.push_locked(&mut records, record);
        }
        drop(records);

        self.total_pushed.fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    /// Draw `batch_size` records uniformly with replacement.
    ///
    /// Never blocks on fill level: returns [`BufferUnderrun`] while fewer
    /// than `min_fill` records are held.
    pub fn sample<T: Rng + ?Sized>(
        &self,
        batch_size: usize,
        rng: &mut T,
    ) -> Result<Vec<Arc<R>>, BufferUnderrun> {
        let records = self.lock();
        let len = records.len();
        if len < self.min_fill {
            return Err(BufferUnderrun {
                len,
                min_fill: self.min_fill,
            });
        }

        Ok((0..batch_size)
            .map(|_| Arc::clone(&records[rng.gen_range(0..len)]))
            .collect())
    }

    /// Draw a training batch plus a disjoint held-out batch.
    ///
    /// The held-out batch is `min(held_out_size, len / 2)` distinct records.
    /// The training batch is drawn with replacement from the other records,
    /// so no record lands in both. With a single record held the held-out
    /// batch is empty.
    pub fn sample_split<T: Rng + ?Sized>(
        &self,
        batch_size: usize,
        held_out_size: usize,
        rng: &mut T,
    ) -> Result<(Vec<Arc<R>>, Vec<Arc<R>>), BufferUnderrun> {
        let records = self.lock();
        let len = records.len();
        if len < self.min_fill {
            return Err(BufferUnderrun {
                len,
                min_fill: self.min_fill,
            });
        }

        let mut held: Vec<usize> = index::sample(rng, len, held_out_size.min(len / 2)).into_vec();
        held.sort_unstable();

        // At least half the positions are free, so this terminates quickly
        let batch = (0..batch_size)
            .map(|_| loop {
                let i = rng.gen_range(0..len);
                if held.binary_search(&i).is_err() {
                    break Arc::clone(&records[i]);
                }
            })
            .collect();
        let held_out = held.iter().map(|&i| Arc::clone(&records[i])).collect();
        Ok((batch, held_out))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn min_fill(&self) -> usize {
        self.min_fill
    }

    /// Whether `sample` would currently succeed
    pub fn is_ready(&self) -> bool {
        self.len() >= self.min_fill
    }

    /// Records pushed since creation, evicted ones included
    pub fn total_pushed(&self) -> u64 {
        self.total_pushed.load(Ordering::Relaxed)
    }

    /// Copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<Arc<R>> {
        self.lock().iter().cloned().collect()
    }
}
