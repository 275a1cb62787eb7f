use std::cell::Cell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::scope;

use tracing::Dispatch;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use crate::{Error, IdAllocator, IdGenStatus, SnowflakeId, SystemClock, TimeSource};

struct MockTime {
    millis: u64,
}

impl TimeSource for MockTime {
    fn current_millis(&self) -> u64 {
        self.millis
    }
}

#[derive(Clone)]
struct SharedMockStepTime {
    clock: Rc<MockStepTime>,
}

struct MockStepTime {
    values: Vec<u64>,
    index: Cell<usize>,
}

impl TimeSource for SharedMockStepTime {
    fn current_millis(&self) -> u64 {
        self.clock.values[self.clock.index.get()]
    }
}

impl SharedMockStepTime {
    fn new(values: Vec<u64>) -> Self {
        Self {
            clock: Rc::new(MockStepTime {
                values,
                index: Cell::new(0),
            }),
        }
    }

    fn advance(&self) {
        self.clock.index.set(self.clock.index.get() + 1);
    }
}

trait IdGenStatusExt {
    fn unwrap_ready(self) -> SnowflakeId;
    fn unwrap_pending(self) -> u64;
}

impl IdGenStatusExt for IdGenStatus {
    fn unwrap_ready(self) -> SnowflakeId {
        match self {
            Self::Ready { id } => id,
            Self::Pending { yield_for } => {
                panic!("unexpected pending (yield for: {yield_for})")
            }
        }
    }

    fn unwrap_pending(self) -> u64 {
        match self {
            Self::Ready { id } => panic!("unexpected ready ({id})"),
            Self::Pending { yield_for } => yield_for,
        }
    }
}

#[test]
fn sequence_increments_within_same_tick() {
    let allocator = IdAllocator::with_clock(1, MockTime { millis: 42 }).unwrap();

    let id1 = allocator.try_allocate().unwrap_ready();
    let id2 = allocator.try_allocate().unwrap_ready();
    let id3 = allocator.try_allocate().unwrap_ready();

    assert_eq!(id1.timestamp(), 42);
    assert_eq!(id3.timestamp(), 42);
    assert_eq!(id1.sequence(), 0);
    assert_eq!(id2.sequence(), 1);
    assert_eq!(id3.sequence(), 2);
    assert_eq!(id1.node_id(), 1);
    assert!(id1 < id2 && id2 < id3);
}

#[test]
fn pending_when_sequence_exhausted() {
    let allocator = IdAllocator::from_components(
        42,
        1,
        SnowflakeId::MAX_SEQUENCE,
        MockTime { millis: 42 },
    )
    .unwrap();
    assert_eq!(allocator.try_allocate().unwrap_pending(), 1);
}

#[test]
fn rollover_resets_sequence_on_next_millisecond() {
    let time = SharedMockStepTime::new(vec![42, 43]);
    let allocator = IdAllocator::with_clock(1, time.clone()).unwrap();

    for i in 0..=SnowflakeId::MAX_SEQUENCE {
        let id = allocator.try_allocate().unwrap_ready();
        assert_eq!(id.sequence(), i);
        assert_eq!(id.timestamp(), 42);
    }
    assert_eq!(allocator.try_allocate().unwrap_pending(), 1);

    time.advance();

    let id = allocator.try_allocate().unwrap_ready();
    assert_eq!(id.timestamp(), 43);
    assert_eq!(id.sequence(), 0);
}

#[test]
fn waits_out_clock_regression() {
    let time = SharedMockStepTime::new(vec![100, 95, 100]);
    let allocator = IdAllocator::with_clock(1, time.clone()).unwrap();

    let before = allocator.try_allocate().unwrap_ready();
    time.advance();
    assert_eq!(allocator.try_allocate().unwrap_pending(), 5);
    time.advance();
    let after = allocator.try_allocate().unwrap_ready();

    assert!(after > before);
    assert_eq!(after.timestamp(), 100);
    assert_eq!(after.sequence(), 1);
}

#[test]
fn rejects_node_id_out_of_range() {
    assert!(IdAllocator::new(SnowflakeId::MAX_NODE_ID).is_ok());
    let err = IdAllocator::new(SnowflakeId::MAX_NODE_ID + 1)
        .err()
        .unwrap();
    assert!(matches!(
        err,
        Error::InvalidNodeId {
            node_id: 1024,
            max: 1023
        }
    ));
}

#[test]
fn sequential_allocations_strictly_increase() {
    const TOTAL_IDS: usize = 4096 * 64;

    let allocator = IdAllocator::with_clock(1, SystemClock::default()).unwrap();
    let mut last = allocator.allocate();
    for _ in 1..TOTAL_IDS {
        let id = allocator.allocate();
        assert!(id > last, "{id:?} not after {last:?}");
        assert_eq!(id.node_id(), 1);
        last = id;
    }
}

#[test]
fn rendered_ids_are_decimal_and_distinct() {
    let allocator = IdAllocator::new(7).unwrap();
    let rendered: HashSet<String> = (0..10_000)
        .map(|_| allocator.allocate().to_string())
        .collect();
    assert_eq!(rendered.len(), 10_000);
    assert!(
        rendered
            .iter()
            .all(|s| s.bytes().all(|b| b.is_ascii_digit()))
    );
}

#[test]
fn threaded_allocations_are_unique() {
    const THREADS: usize = 8;
    const TOTAL_IDS: usize = 4096 * 64;
    const IDS_PER_THREAD: usize = TOTAL_IDS / THREADS;

    let allocator = Arc::new(IdAllocator::new(0).unwrap());
    let seen_ids = Arc::new(Mutex::new(HashSet::with_capacity(TOTAL_IDS)));

    scope(|s| {
        for _ in 0..THREADS {
            let allocator = Arc::clone(&allocator);
            let seen_ids = Arc::clone(&seen_ids);

            s.spawn(move || {
                for _ in 0..IDS_PER_THREAD {
                    let id = allocator.allocate();
                    assert!(seen_ids.lock().unwrap().insert(id));
                }
            });
        }
    });

    let final_count = seen_ids.lock().unwrap().len();
    assert_eq!(final_count, TOTAL_IDS, "Expected {TOTAL_IDS} unique IDs");
}

/// Counts `WARN` events seen on any thread it is installed on.
struct WarnCounter(Arc<AtomicUsize>);

impl<S: tracing::Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::WARN {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[test]
fn contended_allocation_does_not_report_clock_regression() {
    const THREADS: usize = 8;
    const IDS_PER_THREAD: usize = 50_000;

    let warnings = Arc::new(AtomicUsize::new(0));
    let dispatch = Dispatch::new(
        tracing_subscriber::registry().with(WarnCounter(Arc::clone(&warnings))),
    );
    let allocator = Arc::new(IdAllocator::new(1).unwrap());

    scope(|s| {
        for _ in 0..THREADS {
            let allocator = Arc::clone(&allocator);
            let dispatch = dispatch.clone();

            s.spawn(move || {
                let _guard = tracing::dispatcher::set_default(&dispatch);
                for _ in 0..IDS_PER_THREAD {
                    allocator.allocate();
                }
            });
        }
    });

    assert_eq!(warnings.load(Ordering::Relaxed), 0);
}
