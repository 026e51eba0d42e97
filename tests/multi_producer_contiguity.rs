//! Multi-producer coverage: racing producers obtain disjoint sequences and
//! consumers only ever read contiguously published regions.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ringline::{
    BatchEventProcessor, ClosureEventHandler, DefaultEventFactory, EventProcessor, ProducerType,
    RingBuffer, YieldingWaitStrategy,
};

#[derive(Debug, Default)]
struct ProducedEvent {
    producer: i64,
    value: i64,
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
fn three_producers_single_consumer_no_loss_no_duplicates() {
    const PRODUCERS: i64 = 3;
    const PER_PRODUCER: i64 = 10_000;
    const TOTAL: i64 = PRODUCERS * PER_PRODUCER;

    let ring = Arc::new(
        RingBuffer::new(
            4096,
            ProducerType::Multi,
            Arc::new(YieldingWaitStrategy::new()),
            DefaultEventFactory::<ProducedEvent>::new(),
        )
        .unwrap(),
    );

    let count = Arc::new(AtomicI64::new(0));
    let duplicate = Arc::new(AtomicBool::new(false));
    let out_of_order = Arc::new(AtomicBool::new(false));
    let handler = {
        let count = Arc::clone(&count);
        let duplicate = Arc::clone(&duplicate);
        let out_of_order = Arc::clone(&out_of_order);
        let mut last_sequence = -1i64;
        ClosureEventHandler::new(move |_event: &mut ProducedEvent, sequence, _end_of_batch| {
            if sequence <= last_sequence {
                duplicate.store(true, Ordering::Release);
            }
            if sequence != last_sequence + 1 {
                out_of_order.store(true, Ordering::Release);
            }
            last_sequence = sequence;
            count.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
    };

    let processor = Arc::new(BatchEventProcessor::new(
        Arc::clone(&ring),
        ring.new_barrier(Vec::new()),
        Box::new(handler),
    ));
    ring.add_gating_sequences(&[processor.get_sequence()]);

    let consumer = {
        let processor = Arc::clone(&processor);
        thread::spawn(move || processor.run())
    };

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                for value in 0..PER_PRODUCER {
                    let sequence = ring.next().unwrap();
                    // SAFETY: claimed by this producer, unpublished.
                    unsafe {
                        let event = &mut *ring.get_mut(sequence);
                        event.producer = producer;
                        event.value = value;
                    }
                    ring.publish(sequence);
                }
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }

    assert!(wait_until(Duration::from_secs(30), || {
        count.load(Ordering::Relaxed) == TOTAL
    }));
    assert!(wait_until(Duration::from_secs(2), || {
        ring.minimum_gating_sequence() == TOTAL - 1
    }));

    processor.halt();
    consumer.join().unwrap().unwrap();

    assert_eq!(count.load(Ordering::Relaxed), TOTAL);
    assert!(!duplicate.load(Ordering::Acquire));
    assert!(!out_of_order.load(Ordering::Acquire));
    assert_eq!(ring.minimum_gating_sequence(), TOTAL - 1);
}

#[test]
fn consumer_stops_at_publication_gap() {
    let ring: RingBuffer<ProducedEvent> = RingBuffer::new(
        16,
        ProducerType::Multi,
        Arc::new(YieldingWaitStrategy::new()),
        DefaultEventFactory::new(),
    )
    .unwrap();
    let barrier = ring.new_barrier(Vec::new());

    // Claim 0..=3, publish all but 1.
    let high = ring.next_n(4).unwrap();
    assert_eq!(high, 3);
    ring.publish(0);
    ring.publish(2);
    ring.publish(3);

    assert_eq!(barrier.wait_for(0).unwrap(), 0);
    assert!(ring.is_available(0));
    assert!(!ring.is_available(1));

    // Filling the gap releases the whole window.
    ring.publish(1);
    assert_eq!(barrier.wait_for(0).unwrap(), 3);
}

#[test]
fn producers_share_capacity_under_pressure() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: i64 = 2000;

    // Tiny buffer forces constant gating.
    let ring = Arc::new(
        RingBuffer::new(
            32,
            ProducerType::Multi,
            Arc::new(YieldingWaitStrategy::new()),
            DefaultEventFactory::<ProducedEvent>::new(),
        )
        .unwrap(),
    );

    let count = Arc::new(AtomicI64::new(0));
    let handler = {
        let count = Arc::clone(&count);
        ClosureEventHandler::new(move |_event: &mut ProducedEvent, _sequence, _end_of_batch| {
            count.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
    };
    let processor = Arc::new(BatchEventProcessor::new(
        Arc::clone(&ring),
        ring.new_barrier(Vec::new()),
        Box::new(handler),
    ));
    ring.add_gating_sequences(&[processor.get_sequence()]);

    let consumer = {
        let processor = Arc::clone(&processor);
        thread::spawn(move || processor.run())
    };

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                for value in 0..PER_PRODUCER {
                    let sequence = ring.next().unwrap();
                    unsafe { (*ring.get_mut(sequence)).value = value };
                    ring.publish(sequence);
                }
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }

    let total = PRODUCERS as i64 * PER_PRODUCER;
    assert!(wait_until(Duration::from_secs(30), || {
        count.load(Ordering::Relaxed) == total
    }));

    processor.halt();
    consumer.join().unwrap().unwrap();
    assert_eq!(count.load(Ordering::Relaxed), total);
}
