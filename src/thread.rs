//! Thread distribution layer.
//!
//! Threads are organized as a hierarchy of gangs, one level per parallel loop
//! of the control tree. At each level a thread sees:
//!
//! - `ocomm`: the communicator shared by every thread that reached this level
//!   with the same sub-problem
//! - `n_way` / `work_id`: into how many sub-gangs the level splits, and which
//!   one this thread belongs to
//! - `icomm`: the communicator of its sub-gang (the next level's `ocomm`)
//!
//! All group arithmetic happens once in [`build_gangs`]. During execution,
//! threads only split ranges by `work_id` and synchronize through the
//! communicators' barriers when a packed buffer is shared.

use std::ops::Range;
use std::sync::{Arc, Barrier};

use parking_lot::Mutex;

use crate::{BlisError, Result};

/// Number of gang levels built for every invocation. Deeper trees reuse the
/// last (single-thread) level.
pub const GANG_LEVELS: usize = 6;

/// Barrier plus a one-value mailbox shared by the members of a gang.
pub struct Comm<V> {
    n_threads: usize,
    barrier: Barrier,
    slot: Mutex<Option<V>>,
}

impl<V> std::fmt::Debug for Comm<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Comm")
            .field("n_threads", &self.n_threads)
            .finish_non_exhaustive()
    }
}

impl<V: Clone> Comm<V> {
    pub fn new(n_threads: usize) -> Self {
        Self {
            n_threads,
            barrier: Barrier::new(n_threads.max(1)),
            slot: Mutex::new(None),
        }
    }

    #[inline]
    pub fn n_threads(&self) -> usize {
        self.n_threads
    }

    /// Wait until every member arrives.
    pub fn barrier(&self) {
        if self.n_threads > 1 {
            self.barrier.wait();
        }
    }

    /// Member `rank == 0` produces a value that every member receives.
    ///
    /// Every member must call this the same number of times. The two
    /// barriers are the only points where a gang member blocks.
    pub fn broadcast_from_owner(&self, rank: usize, make: impl FnOnce() -> V) -> V {
        if self.n_threads <= 1 {
            return make();
        }
        if rank == 0 {
            *self.slot.lock() = Some(make());
        }
        self.barrier.wait();
        let value = self.slot.lock().clone();
        self.barrier.wait();
        if rank == 0 {
            self.slot.lock().take();
        }
        match value {
            Some(v) => v,
            None => unreachable!("owner fills the slot before the first barrier"),
        }
    }
}

/// One thread's handle on one level of the gang hierarchy.
#[derive(Debug)]
pub struct Gang<V> {
    ocomm: Arc<Comm<V>>,
    ocomm_id: usize,
    n_way: usize,
    work_id: usize,
    icomm: Arc<Comm<V>>,
    icomm_id: usize,
    sub: Option<Box<Gang<V>>>,
}

impl<V: Clone> Gang<V> {
    /// A gang of one thread, `levels` deep.
    #[cfg(test)]
    pub(crate) fn single(levels: usize) -> Self {
        let mut gangs = build_gangs(&vec![1; levels.max(1)]);
        match gangs.pop() {
            Some(g) => g,
            None => unreachable!("one-way layout yields one gang"),
        }
    }

    #[inline]
    pub fn ocomm(&self) -> &Comm<V> {
        &self.ocomm
    }

    #[inline]
    pub fn ocomm_id(&self) -> usize {
        self.ocomm_id
    }

    #[inline]
    pub fn icomm(&self) -> &Comm<V> {
        &self.icomm
    }

    #[inline]
    pub fn icomm_id(&self) -> usize {
        self.icomm_id
    }

    #[inline]
    pub fn n_way(&self) -> usize {
        self.n_way
    }

    #[inline]
    pub fn work_id(&self) -> usize {
        self.work_id
    }

    /// Handle for the next level; the last level stands in for itself.
    #[inline]
    pub fn sub(&self) -> &Gang<V> {
        self.sub.as_deref().unwrap_or(self)
    }

    /// This thread's sub-gang share of `start..end`.
    pub fn get_range(&self, start: usize, end: usize, align: usize) -> Range<usize> {
        split_range(start, end, align, self.n_way, self.work_id)
    }

    /// This thread's individual share of `start..end` among all `ocomm`
    /// members.
    pub fn get_range_ocomm(&self, start: usize, end: usize, align: usize) -> Range<usize> {
        split_range(start, end, align, self.ocomm.n_threads, self.ocomm_id)
    }

    /// This thread's individual share of `start..end` among its sub-gang.
    pub fn get_range_icomm(&self, start: usize, end: usize, align: usize) -> Range<usize> {
        split_range(start, end, align, self.icomm.n_threads, self.icomm_id)
    }

    /// Produce a value once per sub-gang and hand it to every member.
    pub fn broadcast(&self, make: impl FnOnce() -> V) -> V {
        self.icomm.broadcast_from_owner(self.icomm_id, make)
    }
}

/// Split `start..end` into `n_way` contiguous, near-equal parts and return
/// part `id`. Every boundary except `end` is `start` plus a multiple of
/// `align`.
pub fn split_range(start: usize, end: usize, align: usize, n_way: usize, id: usize) -> Range<usize> {
    if end <= start || n_way <= 1 {
        return start..end.max(start);
    }
    let align = align.max(1);
    let blocks = (end - start).div_ceil(align);
    let per = blocks / n_way;
    let rem = blocks % n_way;
    let b0 = id * per + id.min(rem);
    let b1 = b0 + per + usize::from(id < rem);
    let lo = (start + b0 * align).min(end);
    let hi = (start + b1 * align).min(end);
    lo..hi
}

/// Build one gang chain per thread for the given ways per level.
///
/// The number of threads is the product of `ways`. Shorter layouts are
/// padded with single-way levels up to [`GANG_LEVELS`].
pub fn build_gangs<V: Clone>(ways: &[usize]) -> Vec<Gang<V>> {
    let mut ways: Vec<usize> = ways.iter().map(|&w| w.max(1)).collect();
    while ways.len() < GANG_LEVELS {
        ways.push(1);
    }
    let total: usize = ways.iter().product();

    // group_sizes[l] = threads sharing one ocomm at level l;
    // the entry past the end is the innermost icomm size.
    let mut group_sizes = Vec::with_capacity(ways.len() + 1);
    let mut gs = total;
    group_sizes.push(gs);
    for &w in &ways {
        gs /= w;
        group_sizes.push(gs);
    }

    let comms: Vec<Vec<Arc<Comm<V>>>> = group_sizes
        .iter()
        .map(|&size| {
            (0..total / size)
                .map(|_| Arc::new(Comm::new(size)))
                .collect()
        })
        .collect();

    (0..total)
        .map(|t| {
            // innermost level first, wrapping outwards
            let mut sub: Option<Box<Gang<V>>> = None;
            for level in (0..ways.len()).rev() {
                let osize = group_sizes[level];
                let isize_ = group_sizes[level + 1];
                let ocomm_id = t % osize;
                let gang = Gang {
                    ocomm: Arc::clone(&comms[level][t / osize]),
                    ocomm_id,
                    n_way: ways[level],
                    work_id: ocomm_id / isize_,
                    icomm: Arc::clone(&comms[level + 1][t / isize_]),
                    icomm_id: ocomm_id % isize_,
                    sub,
                };
                sub = Some(Box::new(gang));
            }
            match sub {
                Some(g) => *g,
                None => unreachable!("at least one level is always built"),
            }
        })
        .collect()
}

/// Fixed-size worker pool executing one closure SPMD on every thread.
#[derive(Debug)]
pub struct Workers {
    n_threads: usize,
    #[cfg(feature = "parallel")]
    pool: Option<rayon::ThreadPool>,
}

impl Workers {
    /// Spawn `n_threads` workers. A single thread runs inline.
    pub fn new(n_threads: usize) -> Result<Self> {
        if n_threads == 0 {
            return Err(BlisError::InvalidConfig("thread count must be positive".into()));
        }
        #[cfg(feature = "parallel")]
        {
            let pool = if n_threads > 1 {
                Some(
                    rayon::ThreadPoolBuilder::new()
                        .num_threads(n_threads)
                        .thread_name(|i| format!("strided-blis-{i}"))
                        .build()?,
                )
            } else {
                None
            };
            Ok(Self { n_threads, pool })
        }
        #[cfg(not(feature = "parallel"))]
        {
            if n_threads > 1 {
                return Err(BlisError::InvalidConfig(format!(
                    "{n_threads} threads requested but the `parallel` feature is disabled"
                )));
            }
            Ok(Self { n_threads })
        }
    }

    #[inline]
    pub fn n_threads(&self) -> usize {
        self.n_threads
    }

    /// Run `f` once per gang, each on its own worker, and wait for all.
    ///
    /// `gangs.len()` must equal [`Workers::n_threads`].
    pub fn distribute<V, F>(&self, gangs: &[Gang<V>], f: F)
    where
        V: Clone + Send,
        Gang<V>: Sync,
        F: Fn(&Gang<V>) + Sync,
    {
        debug_assert_eq!(gangs.len(), self.n_threads);
        #[cfg(feature = "parallel")]
        if let Some(pool) = &self.pool {
            pool.broadcast(|ctx| f(&gangs[ctx.index()]));
            return;
        }
        if let Some(g) = gangs.first() {
            f(g);
        }
    }
}
