//! Event pools.
//!
//! Each pool hands out a fixed number of blocks of one size. A block is held
//! by the [`DynamicEvent`](crate::DynamicEvent) it backs and is returned on
//! drop, so an event goes back to its pool exactly when its last reference
//! disappears, whichever mailbox or handler held it.

use core::any::Any;
use core::mem;

use crate::error::{EdsError, EdsResult};
use crate::event::{DynamicEvent, Event};
use crate::signal::Signal;
use crate::sync::{Arc, Mutex};

/// Sizing of one event pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolConfig {
    pub block_size: usize,
    pub blocks: usize,
}

impl PoolConfig {
    pub const fn new(block_size: usize, blocks: usize) -> Self {
        Self { block_size, blocks }
    }
}

/// Usage counters of one pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolStats {
    pub block_size: usize,
    pub total: usize,
    pub free: usize,
    pub used: usize,
    /// Low-water mark of `free` since the pool was created.
    pub min_free: usize,
}

impl PoolStats {
    fn new(config: PoolConfig) -> Self {
        Self {
            block_size: config.block_size,
            total: config.blocks,
            free: config.blocks,
            used: 0,
            min_free: config.blocks,
        }
    }

    fn on_alloc(&mut self) {
        self.free -= 1;
        self.used += 1;
        if self.free < self.min_free {
            self.min_free = self.free;
        }
    }

    fn on_dealloc(&mut self) {
        self.free += 1;
        self.used -= 1;
    }

    /// Current utilisation in percent.
    pub fn utilization(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.used * 100) / self.total) as u8
    }
}

pub struct EventPool {
    config: PoolConfig,
    stats: Mutex<PoolStats>,
}

impl EventPool {
    pub fn new(config: PoolConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            stats: Mutex::new(PoolStats::new(config)),
        })
    }

    pub fn block_size(&self) -> usize {
        self.config.block_size
    }

    pub fn stats(&self) -> PoolStats {
        *self.stats.lock()
    }

    /// Allocates an event carrying `payload` from this pool.
    pub fn alloc<T>(self: &Arc<Self>, signal: Signal, payload: T) -> EdsResult<Event>
    where
        T: Any + Send + Sync,
    {
        let size = mem::size_of::<T>();
        if size > self.config.block_size {
            return Err(EdsError::InvalidSize(size));
        }
        let block = self.reserve().ok_or(EdsError::OutOfMemory)?;
        let event = DynamicEvent::new(signal, Box::new(payload), block);
        Ok(Event::Dynamic(Arc::new(event)))
    }

    fn reserve(self: &Arc<Self>) -> Option<PoolBlock> {
        let mut stats = self.stats.lock();
        if stats.free == 0 {
            return None;
        }
        stats.on_alloc();
        Some(PoolBlock {
            pool: Arc::clone(self),
        })
    }

    fn release(&self) {
        self.stats.lock().on_dealloc();
    }
}

/// Ownership token for one pool block.
pub(crate) struct PoolBlock {
    pool: Arc<EventPool>,
}

impl PoolBlock {
    pub(crate) fn block_size(&self) -> usize {
        self.pool.block_size()
    }
}

impl Drop for PoolBlock {
    fn drop(&mut self) {
        self.pool.release();
    }
}

/// Set of pools ordered by block size.
#[derive(Default)]
pub struct EventPools {
    pools: Vec<Arc<EventPool>>,
}

impl EventPools {
    pub fn new<I>(configs: I) -> Self
    where
        I: IntoIterator<Item = PoolConfig>,
    {
        let mut pools: Vec<_> = configs.into_iter().map(EventPool::new).collect();
        pools.sort_by_key(|pool| pool.block_size());
        Self { pools }
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Allocates from the smallest pool whose blocks fit `T`.
    ///
    /// A larger pool is never borrowed from when the best fit is exhausted.
    pub fn alloc<T>(&self, signal: Signal, payload: T) -> EdsResult<Event>
    where
        T: Any + Send + Sync,
    {
        if signal.is_pseudo() {
            return Err(EdsError::ReservedSignal(signal));
        }
        let size = mem::size_of::<T>();
        let pool = self
            .pools
            .iter()
            .find(|pool| pool.block_size() >= size)
            .ok_or(EdsError::InvalidSize(size))?;
        pool.alloc(signal, payload)
    }

    pub fn stats(&self) -> Vec<PoolStats> {
        self.pools.iter().map(|pool| pool.stats()).collect()
    }
}
