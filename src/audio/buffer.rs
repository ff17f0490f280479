//! Lock-free capture ring between the input device thread and the engine
//!
//! The device callback is the single producer and pushes interleaved samples.
//! The engine is the single consumer and drains everything once the capture
//! pass stops. When the ring is full, new samples are dropped and counted
//! rather than blocking the audio thread.

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

#[derive(Debug, Default)]
struct RingStats {
    written: AtomicU64,
    dropped: AtomicU64,
}

/// Producer half (owned by the device callback)
pub struct CaptureProducer {
    producer: ringbuf::HeapProd<f32>,
    stats: Arc<RingStats>,
}

impl CaptureProducer {
    /// Push interleaved samples. Samples that do not fit are dropped.
    #[inline]
    pub fn push_slice(&mut self, samples: &[f32]) {
        let pushed = self.producer.push_slice(samples);
        self.stats.written.fetch_add(pushed as u64, Ordering::Relaxed);
        if pushed < samples.len() {
            self.stats
                .dropped
                .fetch_add((samples.len() - pushed) as u64, Ordering::Relaxed);
        }
    }

    /// Push one sample
    #[inline]
    pub fn push(&mut self, sample: f32) {
        if self.producer.try_push(sample).is_ok() {
            self.stats.written.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Consumer half (owned by the capture collaborator)
pub struct CaptureConsumer {
    consumer: ringbuf::HeapCons<f32>,
    stats: Arc<RingStats>,
}

impl CaptureConsumer {
    /// Take every sample currently in the ring, oldest first
    pub fn drain(&mut self) -> Vec<f32> {
        let mut samples = Vec::with_capacity(self.consumer.occupied_len());
        while let Some(sample) = self.consumer.try_pop() {
            samples.push(sample);
        }
        samples
    }

    pub fn samples_written(&self) -> u64 {
        self.stats.written.load(Ordering::Relaxed)
    }

    pub fn samples_dropped(&self) -> u64 {
        self.stats.dropped.load(Ordering::Relaxed)
    }
}

/// Create a ring holding up to `capacity` samples
pub fn capture_ring(capacity: usize) -> (CaptureProducer, CaptureConsumer) {
    let rb = HeapRb::<f32>::new(capacity.max(1));
    let (producer, consumer) = rb.split();
    let stats = Arc::new(RingStats::default());

    (
        CaptureProducer {
            producer,
            stats: Arc::clone(&stats),
        },
        CaptureConsumer { consumer, stats },
    )
}
