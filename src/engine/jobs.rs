//! Fork/join execution of query chunks on a fixed worker pool.
//!
//! ## Partitioning
//! A chunk of `n` rows is cut into contiguous, non-overlapping sub-ranges.
//! The sub-range length is at least `ceil(n / threads)`, strictly above the
//! minimum parallel length, and rounded up to the query's component multiple,
//! so only the tail of a chunk can end off a multiple boundary.
//!
//! Sub-ranges of at most `min_parallel_len` rows run on the caller's thread;
//! the rest are spawned on the pool. The call returns once every sub-range
//! has finished. There is no cancellation.

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::engine::config::StoreConfig;
use crate::engine::error::ConfigError;
use crate::engine::query::{ChunkMut, QueryData};

/// Fixed-size worker pool for [`Query::run_parallel`](crate::Query::run_parallel).
pub struct JobRunner {
    pool: ThreadPool,
    threads: usize,
    min_parallel_len: usize,
}

impl JobRunner {
    /// Builds a pool sized by `config.worker_threads`.
    pub fn new(config: &StoreConfig) -> Result<Self, ConfigError> {
        Self::with_threads(config.resolved_worker_threads(), config.min_parallel_chunk_len)
    }

    /// Builds a pool of exactly `threads` workers (at least one).
    pub fn with_threads(threads: usize, min_parallel_len: usize) -> Result<Self, ConfigError> {
        let threads = threads.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("archestore-worker-{index}"))
            .build()?;
        tracing::debug!(threads, min_parallel_len, "job runner started");
        Ok(Self { pool, threads, min_parallel_len })
    }

    /// Number of worker threads.
    #[inline]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Sub-ranges at or below this length run on the caller.
    #[inline]
    pub fn min_parallel_len(&self) -> usize {
        self.min_parallel_len
    }

    /// Length of the sub-ranges a chunk of `len` rows is cut into.
    ///
    /// Saturates at `usize::MAX` when rounding up to `multiple` would
    /// overflow; such a length always covers the whole chunk.
    pub fn sub_range_len(&self, len: usize, multiple: usize) -> usize {
        let multiple = multiple.max(1);
        let per_worker = len.div_ceil(self.threads);
        let target = per_worker.max(self.min_parallel_len.saturating_add(1));
        target.div_ceil(multiple).saturating_mul(multiple)
    }

    pub(crate) fn run_chunks<'a, Q, F>(&self, chunks: Vec<ChunkMut<'a, Q>>, multiple: usize, f: &F)
    where
        Q: QueryData,
        F: Fn(ChunkMut<'a, Q>) + Sync,
    {
        let mut local = Vec::new();
        let mut remote = Vec::new();
        for chunk in chunks {
            let len = chunk.len();
            if len <= self.min_parallel_len || self.threads == 1 {
                local.push(chunk);
                continue;
            }
            let step = self.sub_range_len(len, multiple);
            let mut rest = chunk;
            while rest.len() > step {
                let (head, tail) = rest.split_at(step);
                remote.push(head);
                rest = tail;
            }
            if rest.len() <= self.min_parallel_len {
                local.push(rest);
            } else {
                remote.push(rest);
            }
        }

        tracing::trace!(local = local.len(), remote = remote.len(), "dispatching query job");
        self.pool.in_place_scope(|scope| {
            for job in remote {
                scope.spawn(move |_| f(job));
            }
            for job in local {
                f(job);
            }
        });
    }
}
