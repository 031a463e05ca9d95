//! Lock-free single-producer/single-consumer sample ring for the playback path.
//!
//! The writer half lives with the event dispatcher (network context), the
//! reader half with the audio-output callback. Neither half blocks or
//! allocates after construction. Writes beyond the free space are dropped,
//! so audio already queued to play is never overwritten.

use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Observer, Producer, Split},
};
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// Counters shared between both halves and any number of monitors.
#[derive(Debug, Default)]
struct RingShared {
    /// Samples accepted by the writer since creation.
    written: AtomicU64,
    /// Samples that left the ring, played or discarded.
    drained: AtomicU64,
    /// Samples rejected because the ring was full.
    dropped: AtomicU64,
    /// Everything written before this count is to be discarded by the reader.
    clear_mark: AtomicU64,
    /// Number of clear requests, so the reader can reset derived state.
    clears: AtomicU64,
}

/// Creates a ring holding at most `capacity` samples.
pub fn sample_ring(capacity: usize) -> (RingWriter, RingReader) {
    let (prod, cons) = HeapRb::<f32>::new(capacity.max(1)).split();
    let shared = Arc::new(RingShared::default());
    (
        RingWriter {
            prod,
            shared: shared.clone(),
        },
        RingReader { cons, shared },
    )
}

/// Producer half.
pub struct RingWriter {
    prod: HeapProd<f32>,
    shared: Arc<RingShared>,
}

impl RingWriter {
    /// Queues as many samples as fit and returns how many were accepted.
    pub fn push(&mut self, samples: &[f32]) -> usize {
        let accepted = self.prod.push_slice(samples);
        self.shared
            .written
            .fetch_add(accepted as u64, Ordering::AcqRel);
        let rejected = samples.len() - accepted;
        if rejected > 0 {
            self.shared
                .dropped
                .fetch_add(rejected as u64, Ordering::Relaxed);
            tracing::debug!(rejected, "Playback ring full, dropping samples.");
        }
        accepted
    }

    pub fn occupied(&self) -> usize {
        self.prod.occupied_len()
    }

    pub fn capacity(&self) -> usize {
        self.prod.capacity().get()
    }

    pub fn monitor(&self) -> RingMonitor {
        RingMonitor {
            shared: self.shared.clone(),
        }
    }
}

/// Consumer half. Safe to drive from a real-time callback.
pub struct RingReader {
    cons: HeapCons<f32>,
    shared: Arc<RingShared>,
}

impl RingReader {
    /// Pops up to `out.len()` samples, returning how many were written.
    pub fn pop(&mut self, out: &mut [f32]) -> usize {
        self.apply_pending_clear();
        let n = self.cons.pop_slice(out);
        self.shared.drained.fetch_add(n as u64, Ordering::AcqRel);
        n
    }

    /// Pops a single sample.
    pub fn pop_one(&mut self) -> Option<f32> {
        self.apply_pending_clear();
        let sample = self.cons.try_pop()?;
        self.shared.drained.fetch_add(1, Ordering::AcqRel);
        Some(sample)
    }

    pub fn occupied(&self) -> usize {
        self.cons.occupied_len()
    }

    pub fn monitor(&self) -> RingMonitor {
        RingMonitor {
            shared: self.shared.clone(),
        }
    }

    /// Discards samples written before the latest clear request. Bounded by
    /// the ring capacity; does not allocate.
    fn apply_pending_clear(&mut self) {
        let mark = self.shared.clear_mark.load(Ordering::Acquire);
        let drained = self.shared.drained.load(Ordering::Acquire);
        if drained >= mark {
            return;
        }
        let wanted = (mark - drained).min(self.cons.occupied_len() as u64) as usize;
        let skipped = self.cons.skip(wanted);
        self.shared
            .drained
            .fetch_add(skipped as u64, Ordering::AcqRel);
    }
}

/// Read-only view of the ring counters plus the clear request, usable from
/// any context.
#[derive(Clone, Debug)]
pub struct RingMonitor {
    shared: Arc<RingShared>,
}

impl RingMonitor {
    pub fn written(&self) -> u64 {
        self.shared.written.load(Ordering::Acquire)
    }

    pub fn drained(&self) -> u64 {
        self.shared.drained.load(Ordering::Acquire)
    }

    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Asks the reader to discard everything queued so far. Samples written
    /// after this call are kept. Takes effect on the reader's next pop.
    pub fn request_clear(&self) {
        let written = self.written();
        self.shared.clear_mark.fetch_max(written, Ordering::AcqRel);
        self.shared.clears.fetch_add(1, Ordering::AcqRel);
    }

    pub fn clears(&self) -> u64 {
        self.shared.clears.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_pop_in_order() {
        let (mut writer, mut reader) = sample_ring(8);
        assert_eq!(writer.push(&[0.1, 0.2, 0.3]), 3);
        let mut out = [0.0; 2];
        assert_eq!(reader.pop(&mut out), 2);
        assert_eq!(out, [0.1, 0.2]);
        assert_eq!(reader.pop_one(), Some(0.3));
        assert_eq!(reader.pop_one(), None);
    }

    #[test]
    fn test_overflow_drops_newest_writes() {
        let (mut writer, mut reader) = sample_ring(4);
        assert_eq!(writer.push(&[1.0, 2.0, 3.0]), 3);
        assert_eq!(writer.push(&[4.0, 5.0, 6.0]), 1);
        assert_eq!(writer.occupied(), 4);
        assert_eq!(writer.monitor().dropped(), 2);

        let mut out = [0.0; 8];
        assert_eq!(reader.pop(&mut out), 4);
        assert_eq!(&out[..4], &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_occupancy_never_exceeds_capacity() {
        let capacity = 64;
        let (mut writer, mut reader) = sample_ring(capacity);
        let mut outstanding = 0usize;
        let mut out = vec![0.0; 50];
        // Deterministic pseudo-random schedule of writes and reads.
        let mut state = 0x2545_f491_u32;
        for _ in 0..2_000 {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let len = (state % 40) as usize;
            if state & 1 == 0 {
                let chunk = vec![0.5; len];
                outstanding += writer.push(&chunk);
            } else {
                let popped = reader.pop(&mut out[..len.min(50)]);
                assert!(popped <= outstanding);
                outstanding -= popped;
            }
            assert!(writer.occupied() <= writer.capacity());
            assert_eq!(writer.occupied(), outstanding);
        }
    }

    #[test]
    fn test_clear_discards_only_earlier_writes() {
        let (mut writer, mut reader) = sample_ring(16);
        writer.push(&[1.0, 2.0, 3.0]);
        writer.monitor().request_clear();
        writer.push(&[9.0]);

        let mut out = [0.0; 4];
        assert_eq!(reader.pop(&mut out), 1);
        assert_eq!(out[0], 9.0);
        assert_eq!(reader.monitor().drained(), 4);
        assert_eq!(reader.monitor().written(), 4);
    }
}
