//! Fragment queue between the emulation thread and the playback thread
//!
//! The queue is bounded. Enqueueing never waits for the consumer: when the
//! queue is full the oldest fragment is dropped and counted as an overflow.
//! Fragment buffers circulate through a small pool so that steady state
//! operation does not allocate.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::warn;

use super::resampler::FragmentSource;

struct QueueState {
    fragments: VecDeque<Vec<i16>>,
    pool: Vec<Vec<i16>>,
    overflows: u64,
    ignore_overflows: bool,
}

/// Bounded ring of fixed-size PCM fragments
pub struct AudioQueue {
    fragment_size: usize,
    capacity: usize,
    stereo: bool,
    state: Mutex<QueueState>,
}

impl fmt::Debug for AudioQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioQueue")
            .field("fragment_size", &self.fragment_size)
            .field("capacity", &self.capacity)
            .field("stereo", &self.stereo)
            .field("size", &self.size())
            .finish()
    }
}

impl AudioQueue {
    /// Create a queue of `capacity` fragments, each `fragment_size` frames
    pub fn new(fragment_size: usize, capacity: usize, stereo: bool) -> Self {
        let capacity = capacity.max(1);

        AudioQueue {
            fragment_size,
            capacity,
            stereo,
            state: Mutex::new(QueueState {
                fragments: VecDeque::with_capacity(capacity),
                pool: Vec::new(),
                overflows: 0,
                ignore_overflows: true,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Samples in one fragment (frames times channels)
    pub fn fragment_len(&self) -> usize {
        self.fragment_size * if self.stereo { 2 } else { 1 }
    }

    /// Frames per fragment
    pub fn fragment_size(&self) -> usize {
        self.fragment_size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_stereo(&self) -> bool {
        self.stereo
    }

    /// Fragments waiting for the consumer
    pub fn size(&self) -> usize {
        self.lock().fragments.len()
    }

    /// Fragments dropped because the consumer fell behind
    pub fn overflow_count(&self) -> u64 {
        self.lock().overflows
    }

    /// Suppress overflow warnings (they are still counted)
    pub fn ignore_overflows(&self, ignore: bool) {
        self.lock().ignore_overflows = ignore;
    }

    /// Whether overflows are logged
    pub fn reports_overflows(&self) -> bool {
        !self.lock().ignore_overflows
    }

    /// Buffer for the producer to fill
    pub fn acquire(&self) -> Vec<i16> {
        let len = self.fragment_len();
        let mut state = self.lock();
        Self::take_buffer(&mut state, len)
    }

    fn take_buffer(state: &mut QueueState, len: usize) -> Vec<i16> {
        match state.pool.pop() {
            Some(mut buffer) => {
                buffer.resize(len, 0);
                buffer
            }
            None => vec![0; len],
        }
    }

    /// Queue a full fragment and get an empty buffer back
    pub fn enqueue(&self, fragment: Vec<i16>) -> Vec<i16> {
        let len = self.fragment_len();
        let mut state = self.lock();

        if state.fragments.len() >= self.capacity {
            if let Some(dropped) = state.fragments.pop_front() {
                state.pool.push(dropped);
            }
            state.overflows += 1;

            if !state.ignore_overflows {
                warn!("audio buffer overflow");
            }
        }

        state.fragments.push_back(fragment);
        Self::take_buffer(&mut state, len)
    }

    /// Oldest queued fragment. `recycled` is a consumed fragment handed back
    /// for reuse.
    pub fn dequeue(&self, recycled: Option<Vec<i16>>) -> Option<Vec<i16>> {
        let mut state = self.lock();

        if let Some(buffer) = recycled {
            state.pool.push(buffer);
        }

        state.fragments.pop_front()
    }

    /// Return the consumer's last fragment when playback shuts down
    pub fn close_sink(&self, fragment: Option<Vec<i16>>) {
        if let Some(buffer) = fragment {
            self.lock().pool.push(buffer);
        }
    }
}

/// Playback-side view of a queue with prebuffering
///
/// After an underrun nothing is dequeued until `prebuffer` fragments are
/// waiting, so playback resumes with a cushion instead of stuttering.
pub struct QueueSource {
    queue: Arc<AudioQueue>,
    prebuffer: usize,
    underrun: bool,
    spare: Option<Vec<i16>>,
}

impl QueueSource {
    pub fn new(queue: Arc<AudioQueue>, prebuffer: usize) -> Self {
        QueueSource {
            queue,
            prebuffer,
            underrun: true,
            spare: None,
        }
    }

    pub fn is_underrun(&self) -> bool {
        self.underrun
    }
}

impl FragmentSource for QueueSource {
    fn next_fragment(&mut self) -> Option<Vec<i16>> {
        if self.underrun {
            if self.queue.size() < self.prebuffer {
                return None;
            }
            self.underrun = false;
        }

        let next = self.queue.dequeue(self.spare.take());
        self.underrun = next.is_none();
        next
    }

    fn recycle(&mut self, fragment: Vec<i16>) {
        if let Some(older) = self.spare.replace(fragment) {
            self.queue.close_sink(Some(older));
        }
    }
}

impl Drop for QueueSource {
    fn drop(&mut self) {
        self.queue.close_sink(self.spare.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(queue: &AudioQueue, value: i16) -> Vec<i16> {
        let mut fragment = queue.acquire();
        fragment.fill(value);
        fragment
    }

    #[test]
    fn test_fifo_order() {
        let queue = AudioQueue::new(4, 3, false);
        queue.enqueue(filled(&queue, 1));
        queue.enqueue(filled(&queue, 2));
        assert_eq!(queue.size(), 2);

        assert_eq!(queue.dequeue(None), Some(vec![1; 4]));
        assert_eq!(queue.dequeue(None), Some(vec![2; 4]));
        assert_eq!(queue.dequeue(None), None);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let queue = AudioQueue::new(2, 2, true);
        assert_eq!(queue.fragment_len(), 4);

        for value in 1..=4 {
            let returned = queue.enqueue(filled(&queue, value));
            assert_eq!(returned.len(), 4);
        }

        assert_eq!(queue.size(), 2);
        assert_eq!(queue.overflow_count(), 2);
        assert_eq!(queue.dequeue(None), Some(vec![3; 4]));
        assert_eq!(queue.dequeue(None), Some(vec![4; 4]));
    }

    #[test]
    fn test_overflow_reporting_is_opt_in() {
        let queue = AudioQueue::new(2, 1, false);
        assert!(!queue.reports_overflows());

        queue.ignore_overflows(false);
        assert!(queue.reports_overflows());
        queue.enqueue(filled(&queue, 1));
        queue.enqueue(filled(&queue, 2));
        assert_eq!(queue.overflow_count(), 1);
        assert!(format!("{:?}", queue).contains("size: 1"));
    }

    #[test]
    fn test_buffers_are_recycled() {
        let queue = AudioQueue::new(8, 4, false);
        let first = filled(&queue, 7);
        let ptr = first.as_ptr();
        queue.enqueue(first);

        let consumed = queue.dequeue(None);
        assert!(consumed.is_some());
        queue.dequeue(consumed);

        // The consumed buffer comes back to the producer
        let reused = queue.acquire();
        assert_eq!(reused.as_ptr(), ptr);
    }

    #[test]
    fn test_queue_source_prebuffers() {
        let queue = Arc::new(AudioQueue::new(2, 8, false));
        let mut source = QueueSource::new(Arc::clone(&queue), 2);

        queue.enqueue(filled(&queue, 1));
        assert_eq!(source.next_fragment(), None);
        assert!(source.is_underrun());

        queue.enqueue(filled(&queue, 2));
        assert_eq!(source.next_fragment(), Some(vec![1; 2]));
        assert_eq!(source.next_fragment(), Some(vec![2; 2]));

        // Running dry flips back into prebuffering
        assert_eq!(source.next_fragment(), None);
        assert!(source.is_underrun());
        queue.enqueue(filled(&queue, 3));
        assert_eq!(source.next_fragment(), None);
    }
}
