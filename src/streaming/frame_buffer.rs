//! Single-slot latest-frame buffer.
//!
//! This is the synchronization point between the client's network thread and
//! its consumer threads. The buffer holds at most one frame plus a dirty
//! flag; the writer overwrites unconditionally, so a consumer that polls
//! slower than the producer streams silently observes only the newest frame.
//!
//! Exactly one writer (the receive loop) and any number of readers share the
//! buffer. Readers always get a deep copy, never a reference into the slot,
//! so the writer is free to overwrite at any time. Partially received frames
//! never appear here: publication happens only after a frame has been fully
//! read off the wire and decoded.
//!
//! Wakeups use a condvar rather than sleep-and-recheck; the observable
//! contract of the blocking accessors is just "returns once a new frame
//! exists or the stop flag is raised".

use crate::frame::Frame;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Re-check interval for the stop flag while blocked on the condvar
const WAIT_SLICE: Duration = Duration::from_millis(100);

#[derive(Default)]
struct Slot {
    current: Option<Frame>,
    dirty: bool,
}

/// Shared single-slot buffer holding the most recent decoded frame
#[derive(Default)]
pub struct FrameBuffer {
    slot: Mutex<Slot>,
    available: Condvar,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        // A poisoned slot still holds a structurally valid frame; keep going.
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the current frame and mark it unconsumed.
    ///
    /// Called by the network thread once per fully decoded frame.
    pub fn publish(&self, frame: Frame) {
        let mut slot = self.lock();
        slot.current = Some(frame);
        slot.dirty = true;
        self.available.notify_all();
    }

    /// Copy of the current frame, dirty flag untouched.
    ///
    /// Non-blocking; `None` until the first frame arrives.
    pub fn latest(&self) -> Option<Frame> {
        self.lock().current.clone()
    }

    /// Copy of the current frame if it has not been consumed yet, clearing
    /// the dirty flag. `None` when nothing new has arrived.
    pub fn take_new(&self) -> Option<Frame> {
        let mut slot = self.lock();
        if slot.dirty {
            slot.dirty = false;
            slot.current.clone()
        } else {
            None
        }
    }

    /// Block until an unconsumed frame exists, returning a copy and leaving
    /// the dirty flag set (poll contract: the latest frame stays
    /// retrievable, at the cost of possibly reading it twice).
    ///
    /// Returns `None` once `stop` is raised.
    pub fn wait_new(&self, stop: &AtomicBool) -> Option<Frame> {
        self.wait_inner(stop, false)
    }

    /// Block until an unconsumed frame exists, returning a copy and clearing
    /// the dirty flag (push contract: each frame is handed out once).
    ///
    /// Returns `None` once `stop` is raised.
    pub fn wait_take(&self, stop: &AtomicBool) -> Option<Frame> {
        self.wait_inner(stop, true)
    }

    fn wait_inner(&self, stop: &AtomicBool, clear: bool) -> Option<Frame> {
        let mut slot = self.lock();
        loop {
            if stop.load(Ordering::Relaxed) {
                return None;
            }
            if slot.dirty {
                if clear {
                    slot.dirty = false;
                }
                return slot.current.clone();
            }
            // Timed wait so a missed notify during teardown cannot hang us
            let (guard, _) = self
                .available
                .wait_timeout(slot, WAIT_SLICE)
                .unwrap_or_else(|e| e.into_inner());
            slot = guard;
        }
    }

    /// Wake all blocked waiters so they can observe a raised stop flag.
    pub fn notify_all(&self) {
        self.available.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn tagged(tag: u8) -> Frame {
        Frame::new(1, 1, vec![tag, 0, 0]).unwrap()
    }

    #[test]
    fn test_empty_buffer() {
        let buffer = FrameBuffer::new();
        assert!(buffer.latest().is_none());
        assert!(buffer.take_new().is_none());
    }

    #[test]
    fn test_only_latest_frame_is_retained() {
        let buffer = FrameBuffer::new();
        buffer.publish(tagged(1));
        buffer.publish(tagged(2));
        buffer.publish(tagged(3));
        assert_eq!(buffer.latest(), Some(tagged(3)));
    }

    #[test]
    fn test_take_new_clears_dirty_once() {
        let buffer = FrameBuffer::new();
        buffer.publish(tagged(7));
        assert_eq!(buffer.take_new(), Some(tagged(7)));
        assert!(buffer.take_new().is_none());
        // Frame itself stays retrievable
        assert_eq!(buffer.latest(), Some(tagged(7)));
    }

    #[test]
    fn test_wait_new_leaves_dirty_set() {
        let buffer = FrameBuffer::new();
        let stop = AtomicBool::new(false);
        buffer.publish(tagged(9));
        assert_eq!(buffer.wait_new(&stop), Some(tagged(9)));
        // Poll contract: same frame can be read again
        assert_eq!(buffer.wait_new(&stop), Some(tagged(9)));
        // Push contract: consumed exactly once
        assert_eq!(buffer.wait_take(&stop), Some(tagged(9)));
        assert!(buffer.take_new().is_none());
    }

    #[test]
    fn test_wait_new_unblocks_on_publish() {
        let buffer = Arc::new(FrameBuffer::new());
        let stop = Arc::new(AtomicBool::new(false));

        let reader = {
            let buffer = Arc::clone(&buffer);
            let stop = Arc::clone(&stop);
            thread::spawn(move || buffer.wait_new(&stop))
        };

        thread::sleep(Duration::from_millis(20));
        buffer.publish(tagged(4));
        assert_eq!(reader.join().unwrap(), Some(tagged(4)));
    }

    #[test]
    fn test_wait_new_unblocks_on_stop() {
        let buffer = Arc::new(FrameBuffer::new());
        let stop = Arc::new(AtomicBool::new(false));

        let reader = {
            let buffer = Arc::clone(&buffer);
            let stop = Arc::clone(&stop);
            thread::spawn(move || buffer.wait_new(&stop))
        };

        thread::sleep(Duration::from_millis(20));
        stop.store(true, Ordering::Relaxed);
        buffer.notify_all();
        assert!(reader.join().unwrap().is_none());
    }
}
