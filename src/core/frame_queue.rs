// # Frame Queue
//
// Bounded hand-off between the camera callback and the uploader.
//
// ## Overview
//
// The queue solves the producer-consumer problem for a real-time pipeline
// where the consumer is network bound:
// - **Producer**: the camera callback, which must never block
// - **Consumer**: the uploader loop, which may stall on a slow network
// - **Buffer**: a small fixed capacity N so memory cannot grow without bound
//
// ```text
// ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
// │ Camera callback │───▶│   Frame Queue   │───▶│    Uploader     │
// │   (Producer)    │    │  N newest only  │    │   (Consumer)    │
// └─────────────────┘    └─────────────────┘    └─────────────────┘
// ```
//
// ## Overflow Policy
//
// Drop-oldest: when full, the oldest queued frame is evicted and the new frame
// is kept. Evictions are counted in `evicted()`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::core::frame::Frame;

#[derive(Debug)]
struct Slots {
    frames: VecDeque<Frame>,
    closed: bool,
}

/// Bounded, drop-oldest frame queue for one producer and one consumer.
#[derive(Debug)]
pub struct FrameQueue {
    slots: Mutex<Slots>,
    capacity: usize,
    available: Notify,
    evicted: AtomicU64,
}

impl FrameQueue {
    /// Creates a queue holding at most `capacity` frames (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Mutex::new(Slots {
                frames: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            available: Notify::new(),
            evicted: AtomicU64::new(0),
        }
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a frame, never blocking.
    ///
    /// Returns `true` when the frame was queued without loss. Returns `false`
    /// when an older frame had to be evicted to make room, or when the queue
    /// is closed and the frame was discarded.
    pub fn enqueue(&self, frame: Frame) -> bool {
        let lossless = {
            let mut slots = self.slots();
            if slots.closed {
                return false;
            }
            let mut lossless = true;
            while slots.frames.len() >= self.capacity {
                slots.frames.pop_front();
                self.evicted.fetch_add(1, Ordering::Relaxed);
                lossless = false;
            }
            slots.frames.push_back(frame);
            lossless
        };
        self.available.notify_one();
        lossless
    }

    /// Takes the oldest queued frame, if any.
    pub fn dequeue(&self) -> Option<Frame> {
        self.slots().frames.pop_front()
    }

    /// Waits for the next frame. Returns `None` once the queue is closed.
    ///
    /// Frames still queued at close time are not handed out; teardown
    /// discards them with [`FrameQueue::drain`].
    pub async fn next(&self) -> Option<Frame> {
        loop {
            {
                let mut slots = self.slots();
                if slots.closed {
                    return None;
                }
                if let Some(frame) = slots.frames.pop_front() {
                    return Some(frame);
                }
            }
            self.available.notified().await;
        }
    }

    /// Stops accepting frames and wakes the consumer.
    pub fn close(&self) {
        self.slots().closed = true;
        self.available.notify_one();
    }

    /// Discards every queued frame, returning how many were dropped.
    pub fn drain(&self) -> usize {
        let mut slots = self.slots();
        let n = slots.frames.len();
        slots.frames.clear();
        n
    }

    pub fn is_closed(&self) -> bool {
        self.slots().closed
    }

    pub fn len(&self) -> usize {
        self.slots().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames lost to the drop-oldest policy so far.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Sequences currently queued, oldest first.
    pub fn sequences(&self) -> Vec<u64> {
        self.slots().frames.iter().map(|f| f.sequence).collect()
    }
}
