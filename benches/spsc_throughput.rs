//! Single producer, single consumer throughput.
//!
//! Compares the ring against a bounded crossbeam channel for several burst
//! sizes. The consumer publishes the last value it saw into an atomic sink
//! so the producer side can measure end-to-end completion of each burst.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam::channel::{bounded, TryRecvError, TrySendError};
use ringline::{
    BatchEventProcessor, BusySpinWaitStrategy, ClosureEventHandler, DefaultEventFactory,
    EventProcessor, ProducerType, RingBuffer,
};

const BUFFER_SIZE: usize = 128;
const BURST_SIZES: [i64; 3] = [1, 10, 100];

#[derive(Debug, Default, Clone)]
struct Event {
    data: i64,
}

pub fn spsc_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("spsc");

    for burst_size in BURST_SIZES {
        group.throughput(Throughput::Elements(burst_size as u64));
        crossbeam_spsc(&mut group, burst_size);
        ringline_spsc(&mut group, burst_size);
        ringline_spsc_batched(&mut group, burst_size);
    }
    group.finish();
}

fn crossbeam_spsc(group: &mut criterion::BenchmarkGroup<'_, criterion::measurement::WallTime>, burst_size: i64) {
    let sink = Arc::new(AtomicI64::new(0));
    let (sender, receiver) = bounded::<Event>(BUFFER_SIZE);
    let done = Arc::new(AtomicBool::new(false));

    let consumer = {
        let sink = Arc::clone(&sink);
        let done = Arc::clone(&done);
        thread::spawn(move || loop {
            match receiver.try_recv() {
                Ok(event) => sink.store(event.data, Ordering::Release),
                Err(TryRecvError::Empty) => {
                    if done.load(Ordering::Acquire) {
                        break;
                    }
                }
                Err(TryRecvError::Disconnected) => break,
            }
        })
    };

    group.bench_with_input(
        BenchmarkId::new("crossbeam_channel", burst_size),
        &burst_size,
        |b, &size| {
            b.iter_custom(|iters| {
                let start = Instant::now();
                for _ in 0..iters {
                    for data in 1..=size {
                        let mut event = Event {
                            data: black_box(data),
                        };
                        while let Err(TrySendError::Full(returned)) = sender.try_send(event) {
                            event = returned;
                        }
                    }
                    let last = black_box(size);
                    while sink.load(Ordering::Acquire) != last {}
                }
                start.elapsed()
            })
        },
    );

    done.store(true, Ordering::Release);
    drop(sender);
    consumer.join().expect("consumer thread panicked");
}

fn ring_with_sink(sink: Arc<AtomicI64>) -> (Arc<RingBuffer<Event>>, Arc<BatchEventProcessor<Event>>) {
    let ring = Arc::new(
        RingBuffer::new(
            BUFFER_SIZE,
            ProducerType::Single,
            Arc::new(BusySpinWaitStrategy::new()),
            DefaultEventFactory::<Event>::new(),
        )
        .unwrap(),
    );

    let handler = ClosureEventHandler::new(move |event: &mut Event, _sequence, _end_of_batch| {
        sink.store(event.data, Ordering::Release);
        Ok(())
    });
    let processor = Arc::new(BatchEventProcessor::new(
        Arc::clone(&ring),
        ring.new_barrier(Vec::new()),
        Box::new(handler),
    ));
    ring.add_gating_sequences(&[processor.get_sequence()]);

    (ring, processor)
}

fn ringline_spsc(group: &mut criterion::BenchmarkGroup<'_, criterion::measurement::WallTime>, burst_size: i64) {
    let sink = Arc::new(AtomicI64::new(0));
    let (ring, processor) = ring_with_sink(Arc::clone(&sink));

    let consumer = {
        let processor = Arc::clone(&processor);
        thread::spawn(move || processor.run())
    };

    group.bench_with_input(
        BenchmarkId::new("ringline_single_publish", burst_size),
        &burst_size,
        |b, &size| {
            b.iter_custom(|iters| {
                let start = Instant::now();
                for _ in 0..iters {
                    for data in 1..=size {
                        let sequence = ring.next().unwrap();
                        // SAFETY: claimed by this producer, unpublished.
                        unsafe { (*ring.get_mut(sequence)).data = black_box(data) };
                        ring.publish(sequence);
                    }
                    let last = black_box(size);
                    while sink.load(Ordering::Acquire) != last {}
                }
                start.elapsed()
            })
        },
    );

    processor.halt();
    consumer.join().expect("consumer thread panicked").unwrap();
}

fn ringline_spsc_batched(group: &mut criterion::BenchmarkGroup<'_, criterion::measurement::WallTime>, burst_size: i64) {
    let sink = Arc::new(AtomicI64::new(0));
    let (ring, processor) = ring_with_sink(Arc::clone(&sink));

    let consumer = {
        let processor = Arc::clone(&processor);
        thread::spawn(move || processor.run())
    };

    group.bench_with_input(
        BenchmarkId::new("ringline_batch_publish", burst_size),
        &burst_size,
        |b, &size| {
            let mut publisher = ring.batch_publisher(size).unwrap();
            b.iter_custom(|iters| {
                let start = Instant::now();
                for _ in 0..iters {
                    publisher.begin_batch(size).unwrap();
                    for index in 0..size {
                        publisher.get_event(index).data = black_box(index + 1);
                    }
                    publisher.end_batch();

                    let last = black_box(size);
                    while sink.load(Ordering::Acquire) != last {}
                }
                start.elapsed()
            })
        },
    );

    processor.halt();
    consumer.join().expect("consumer thread panicked").unwrap();
}

criterion_group!(spsc, spsc_benchmark);
criterion_main!(spsc);
