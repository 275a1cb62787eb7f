use crate::SnowflakeId;

/// Represents the result of attempting to allocate a new account identifier.
///
/// - [`IdGenStatus::Ready`] indicates a new ID was allocated.
/// - [`IdGenStatus::Pending`] means the allocator cannot produce a new ID
///   until the clock advances by at least `yield_for` milliseconds, either
///   because the sequence for the current millisecond is exhausted or because
///   the clock stepped backwards.
///
/// This allows non-blocking allocation loops and clean backoff strategies.
///
/// # Example
///
/// ```
/// use keygate::{IdAllocator, IdGenStatus, TimeSource};
///
/// struct FixedTime;
/// impl TimeSource for FixedTime {
///     fn current_millis(&self) -> u64 {
///         1
///     }
/// }
///
/// let allocator = IdAllocator::with_clock(1, FixedTime).unwrap();
/// match allocator.try_allocate() {
///     IdGenStatus::Ready { id } => println!("ID: {id}"),
///     IdGenStatus::Pending { yield_for } => println!("Back off for: {yield_for}ms"),
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdGenStatus {
    /// A unique ID was allocated and is ready to use.
    Ready {
        /// The allocated identifier.
        id: SnowflakeId,
    },
    /// No ID could be allocated for the current millisecond.
    Pending {
        /// Milliseconds to wait before trying again.
        yield_for: u64,
    },
}
