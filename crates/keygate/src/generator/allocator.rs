use core::cmp::Ordering;

use parking_lot::Mutex;
use tracing::instrument;

use crate::{Error, IdGenStatus, Result, SnowflakeId, SystemClock, TimeSource};

/// A lock-based account identifier allocator.
///
/// The last issued [`SnowflakeId`] is the entire allocator state. It lives
/// behind a single [`Mutex`] that is held only while the clock is read and the
/// next value is computed, never across I/O, so one instance can be shared
/// freely through an `Arc` by every request task.
///
/// Within one millisecond the sequence increments; when all 4096 values are
/// spent the allocator reports [`IdGenStatus::Pending`] until the clock
/// advances. A clock that steps backwards is treated the same way: the
/// allocator waits for the clock to catch up with the last issued timestamp
/// rather than reusing it.
///
/// # Example
/// ```
/// use keygate::IdAllocator;
///
/// let allocator = IdAllocator::new(1).unwrap();
/// let a = allocator.allocate();
/// let b = allocator.allocate();
/// assert!(a < b);
/// assert_eq!(a.node_id(), 1);
/// ```
pub struct IdAllocator<T = SystemClock>
where
    T: TimeSource,
{
    state: Mutex<SnowflakeId>,
    time: T,
}

impl IdAllocator<SystemClock> {
    /// Creates an allocator for `node_id` backed by the system clock aligned
    /// to [`KEYGATE_EPOCH`](crate::KEYGATE_EPOCH).
    ///
    /// # Errors
    /// Returns [`Error::InvalidNodeId`] when `node_id` does not fit in 10
    /// bits.
    pub fn new(node_id: u64) -> Result<Self> {
        Self::with_clock(node_id, SystemClock::default())
    }
}

impl<T> IdAllocator<T>
where
    T: TimeSource,
{
    /// Creates an allocator for `node_id` using a custom [`TimeSource`].
    ///
    /// # Errors
    /// Returns [`Error::InvalidNodeId`] when `node_id` does not fit in 10
    /// bits.
    pub fn with_clock(node_id: u64, time: T) -> Result<Self> {
        Self::from_components(0, node_id, 0, time)
    }

    /// Creates an allocator preloaded with explicit state.
    ///
    /// Mostly useful for restoring the last issued value after a restart, or
    /// for driving the allocator into edge states.
    pub fn from_components(timestamp: u64, node_id: u64, sequence: u64, time: T) -> Result<Self> {
        if node_id > SnowflakeId::MAX_NODE_ID {
            return Err(Error::InvalidNodeId {
                node_id,
                max: SnowflakeId::MAX_NODE_ID,
            });
        }
        Ok(Self {
            state: Mutex::new(SnowflakeId::from_components(timestamp, node_id, sequence)),
            time,
        })
    }

    /// The node id encoded in every identifier from this allocator.
    pub fn node_id(&self) -> u64 {
        self.state.lock().node_id()
    }

    /// Attempts to allocate the next identifier without blocking.
    #[instrument(level = "trace", skip(self))]
    pub fn try_allocate(&self) -> IdGenStatus {
        // Read the clock under the lock so successive holders observe
        // non-decreasing readings unless the host clock itself stepped back.
        let mut id = self.state.lock();
        let now = self.time.current_millis();

        let current_ts = id.timestamp();
        match now.cmp(&current_ts) {
            Ordering::Equal => {
                if id.has_sequence_room() {
                    *id = id.increment_sequence();
                    IdGenStatus::Ready { id: *id }
                } else {
                    IdGenStatus::Pending { yield_for: 1 }
                }
            }
            Ordering::Greater => {
                *id = id.rollover_to_timestamp(now);
                IdGenStatus::Ready { id: *id }
            }
            Ordering::Less => Self::cold_clock_behind(now, current_ts),
        }
    }

    /// Allocates the next identifier, spinning while the current millisecond
    /// is exhausted or the clock is behind the last issued timestamp.
    pub fn allocate(&self) -> SnowflakeId {
        loop {
            match self.try_allocate() {
                IdGenStatus::Ready { id } => break id,
                IdGenStatus::Pending { .. } => core::hint::spin_loop(),
            }
        }
    }

    #[cold]
    #[inline(never)]
    fn cold_clock_behind(now: u64, current_ts: u64) -> IdGenStatus {
        let yield_for = current_ts - now;
        tracing::warn!(yield_for, "clock moved backwards, waiting to catch up");
        IdGenStatus::Pending { yield_for }
    }
}
