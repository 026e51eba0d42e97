//! Work-queue coverage: a pool of workers over one claim counter handles
//! each published sequence exactly once, with the union of their work
//! covering the whole stream.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use ringline::{
    ClosureWorkHandler, DefaultEventFactory, ProducerType, RingBuffer, WorkHandler, WorkerPool,
    YieldingWaitStrategy,
};

#[derive(Debug, Default)]
struct JobEvent {
    payload: i64,
}

fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        thread::yield_now();
    }
    condition()
}

#[test]
fn four_workers_partition_the_stream_exactly() {
    const PRODUCERS: i64 = 4;
    const PER_PRODUCER: i64 = 2500;
    const TOTAL: i64 = PRODUCERS * PER_PRODUCER;
    const WORKERS: usize = 4;
    const WORK_BATCH_SIZE: i64 = 8;

    let ring = Arc::new(
        RingBuffer::new(
            4096,
            ProducerType::Multi,
            Arc::new(YieldingWaitStrategy::new()),
            DefaultEventFactory::<JobEvent>::new(),
        )
        .unwrap(),
    );

    // Each worker records the sequences it handled.
    let handled: Vec<Arc<Mutex<HashSet<i64>>>> = (0..WORKERS)
        .map(|_| Arc::new(Mutex::new(HashSet::new())))
        .collect();

    let handlers: Vec<Box<dyn WorkHandler<JobEvent>>> = handled
        .iter()
        .map(|set| {
            let set = Arc::clone(set);
            Box::new(ClosureWorkHandler::new(
                move |_event: &mut JobEvent, sequence| {
                    set.lock().insert(sequence);
                    Ok(())
                },
            )) as Box<dyn WorkHandler<JobEvent>>
        })
        .collect();

    let mut pool = WorkerPool::new(&ring, handlers, WORK_BATCH_SIZE).unwrap();
    assert_eq!(pool.worker_count(), WORKERS);
    ring.add_gating_sequences(&pool.worker_sequences());
    pool.start().unwrap();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                for payload in 0..PER_PRODUCER {
                    let sequence = ring.next().unwrap();
                    // SAFETY: claimed by this producer, unpublished.
                    unsafe { (*ring.get_mut(sequence)).payload = payload };
                    ring.publish(sequence);
                }
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }

    assert!(wait_until(Duration::from_secs(30), || {
        handled.iter().map(|set| set.lock().len()).sum::<usize>() == TOTAL as usize
    }));

    pool.halt();
    pool.join();

    // Pairwise disjoint...
    let mut union: HashSet<i64> = HashSet::new();
    let mut total_handled = 0;
    for set in &handled {
        let set = set.lock();
        total_handled += set.len();
        union.extend(set.iter().copied());
    }
    assert_eq!(total_handled, union.len());
    // ...and complete.
    assert_eq!(union, (0..TOTAL).collect::<HashSet<i64>>());
}

#[test]
fn pool_survives_poisoned_events() {
    const TOTAL: i64 = 200;

    let ring = Arc::new(
        RingBuffer::new(
            256,
            ProducerType::Single,
            Arc::new(YieldingWaitStrategy::new()),
            DefaultEventFactory::<JobEvent>::new(),
        )
        .unwrap(),
    );

    let succeeded = Arc::new(AtomicI64::new(0));
    let handlers: Vec<Box<dyn WorkHandler<JobEvent>>> = (0..2)
        .map(|_| {
            let succeeded = Arc::clone(&succeeded);
            Box::new(ClosureWorkHandler::new(
                move |event: &mut JobEvent, _sequence| {
                    if event.payload % 10 == 0 {
                        return Err(ringline::RinglineError::Handler(
                            "payload divisible by ten".into(),
                        ));
                    }
                    succeeded.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                },
            )) as Box<dyn WorkHandler<JobEvent>>
        })
        .collect();

    let mut pool = WorkerPool::new(&ring, handlers, 4).unwrap();
    ring.add_gating_sequences(&pool.worker_sequences());
    pool.start().unwrap();

    for payload in 0..TOTAL {
        let sequence = ring.next().unwrap();
        unsafe { (*ring.get_mut(sequence)).payload = payload };
        ring.publish(sequence);
    }

    // 20 of 200 payloads are rejected; the rest must all get through
    // without the pool wedging on the failures.
    assert!(wait_until(Duration::from_secs(30), || {
        succeeded.load(Ordering::Relaxed) == TOTAL - 20
    }));

    pool.halt();
    pool.join();
    assert_eq!(succeeded.load(Ordering::Relaxed), TOTAL - 20);
}

#[test]
fn work_batch_size_must_be_positive() {
    let ring = Arc::new(
        RingBuffer::new(
            16,
            ProducerType::Multi,
            Arc::new(YieldingWaitStrategy::new()),
            DefaultEventFactory::<JobEvent>::new(),
        )
        .unwrap(),
    );

    let handler: Box<dyn WorkHandler<JobEvent>> =
        Box::new(ClosureWorkHandler::new(|_: &mut JobEvent, _| Ok(())));
    let result = WorkerPool::new(&ring, vec![handler], 0);
    assert!(matches!(
        result,
        Err(ringline::RinglineError::InvalidClaimSize(0))
    ));
}
