//! Surface-state tracking and the frame task queue connecting the
//! submission path to the output worker.
//!
//! A fixed pool of hardware surfaces cycles between two states: `Free`
//! (available for the next raw-frame upload) and `InFlight` (submitted to
//! the accelerator, coded data not yet drained). Submission blocks on the
//! target slot until the worker returns it, which bounds the number of
//! frames in flight to the pool size and provides natural backpressure
//! against a capture source running ahead of the accelerator.

use std::sync::{Condvar, Mutex};

use crossbeam_channel::{bounded, Receiver, Sender};

/// Size of the surface / coded-buffer pool.
pub const SURFACE_COUNT: usize = 16;

/// State of one surface slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    /// Available for the next raw-frame upload.
    Free,
    /// Submitted to the accelerator, awaiting coded-data retrieval.
    InFlight,
}

/// Cross-thread state of the surface pool.
///
/// The submission thread waits for a slot to come free; the output worker
/// returns slots after draining their coded data. Both sides go through
/// the same mutex, so a "freed" transition can never race a "is it free"
/// check.
#[derive(Debug)]
pub struct SurfaceTracker {
    states: Mutex<Vec<SurfaceState>>,
    freed: Condvar,
}

impl SurfaceTracker {
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            states: Mutex::new(vec![SurfaceState::Free; count]),
            freed: Condvar::new(),
        }
    }

    /// Block until `slot` is free.
    pub fn wait_free(&self, slot: usize) {
        let mut states = self.states.lock().unwrap();
        while states[slot] != SurfaceState::Free {
            states = self.freed.wait(states).unwrap();
        }
    }

    /// Block until every slot is free (used by flush/teardown).
    pub fn wait_all_free(&self) {
        let mut states = self.states.lock().unwrap();
        while states.iter().any(|&s| s != SurfaceState::Free) {
            states = self.freed.wait(states).unwrap();
        }
    }

    /// Mark `slot` as submitted to the accelerator.
    pub fn mark_in_flight(&self, slot: usize) {
        let mut states = self.states.lock().unwrap();
        debug_assert_eq!(states[slot], SurfaceState::Free, "slot reused while in flight");
        states[slot] = SurfaceState::InFlight;
    }

    /// Return `slot` to the pool and wake any blocked submitter.
    pub fn mark_free(&self, slot: usize) {
        let mut states = self.states.lock().unwrap();
        states[slot] = SurfaceState::Free;
        self.freed.notify_all();
    }

    /// Number of slots currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.states
            .lock()
            .unwrap()
            .iter()
            .filter(|&&s| s == SurfaceState::InFlight)
            .count()
    }

    /// Whether `slot` is free right now (test and teardown convenience;
    /// the submission path uses [`wait_free`](Self::wait_free)).
    #[must_use]
    pub fn is_free(&self, slot: usize) -> bool {
        self.states.lock().unwrap()[slot] == SurfaceState::Free
    }
}

/// One submitted frame awaiting coded-data retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTask {
    /// Display order of the frame; selects the surface slot and coded
    /// buffer.
    pub display_order: u64,
    /// Encoding order, for logging and output accounting.
    pub encode_order: u64,
    /// Whether the coded picture is an intra (IDR or I) picture.
    pub keyframe: bool,
}

impl FrameTask {
    /// Pool slot owning this frame's surface and coded buffer.
    #[must_use]
    pub fn slot(&self, pool_size: usize) -> usize {
        (self.display_order % pool_size as u64) as usize
    }
}

/// Create the bounded task channel connecting submission to the worker.
/// Capacity matches the pool, so the channel itself can never hold more
/// tasks than there are surfaces.
#[must_use]
pub fn task_channel(pool_size: usize) -> (Sender<FrameTask>, Receiver<FrameTask>) {
    bounded(pool_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_tracker_starts_all_free() {
        let tracker = SurfaceTracker::new(4);
        assert_eq!(tracker.in_flight(), 0);
        for slot in 0..4 {
            assert!(tracker.is_free(slot));
        }
    }

    #[test]
    fn test_in_flight_bounded_by_pool() {
        let tracker = SurfaceTracker::new(4);
        for slot in 0..4 {
            tracker.wait_free(slot);
            tracker.mark_in_flight(slot);
        }
        assert_eq!(tracker.in_flight(), 4);
        tracker.mark_free(2);
        assert_eq!(tracker.in_flight(), 3);
        assert!(tracker.is_free(2));
    }

    #[test]
    fn test_submission_blocks_until_drained() {
        let tracker = Arc::new(SurfaceTracker::new(2));
        tracker.mark_in_flight(0);
        tracker.mark_in_flight(1);

        let blocked = Arc::new(AtomicBool::new(true));
        let submitter = {
            let tracker = Arc::clone(&tracker);
            let blocked = Arc::clone(&blocked);
            thread::spawn(move || {
                // Re-using slot 0 must wait for the worker to drain it.
                tracker.wait_free(0);
                blocked.store(false, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(blocked.load(Ordering::SeqCst), "submitter ran before drain");

        tracker.mark_free(0);
        submitter.join().unwrap();
        assert!(!blocked.load(Ordering::SeqCst));
    }

    #[test]
    fn test_wait_all_free_unblocks_on_last_slot() {
        let tracker = Arc::new(SurfaceTracker::new(3));
        tracker.mark_in_flight(0);
        tracker.mark_in_flight(2);

        let waiter = {
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || tracker.wait_all_free())
        };
        tracker.mark_free(0);
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());
        tracker.mark_free(2);
        waiter.join().unwrap();
    }

    #[test]
    fn test_task_slot_wraps_pool() {
        let task = FrameTask {
            display_order: 21,
            encode_order: 21,
            keyframe: false,
        };
        assert_eq!(task.slot(SURFACE_COUNT), 5);
    }

    #[test]
    fn test_task_channel_drains_in_order() {
        let (tx, rx) = task_channel(4);
        for encode_order in 0..4 {
            tx.send(FrameTask {
                display_order: encode_order,
                encode_order,
                keyframe: encode_order == 0,
            })
            .unwrap();
        }
        drop(tx);
        let drained: Vec<u64> = rx.iter().map(|t| t.encode_order).collect();
        assert_eq!(drained, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_full_pipeline_backpressure_with_worker() {
        // Submission keeps at most pool-size frames in flight even when
        // the worker drains slowly.
        let pool = 4;
        let tracker = Arc::new(SurfaceTracker::new(pool));
        let (tx, rx) = task_channel(pool);

        let worker = {
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || {
                let mut max_seen = 0;
                for task in rx.iter() {
                    max_seen = max_seen.max(tracker.in_flight());
                    thread::sleep(Duration::from_millis(5));
                    tracker.mark_free(task.slot(pool));
                }
                max_seen
            })
        };

        for display_order in 0..32u64 {
            let slot = (display_order % pool as u64) as usize;
            tracker.wait_free(slot);
            tracker.mark_in_flight(slot);
            tx.send(FrameTask {
                display_order,
                encode_order: display_order,
                keyframe: false,
            })
            .unwrap();
        }
        drop(tx);

        let max_in_flight = worker.join().unwrap();
        assert!(max_in_flight <= pool);
        tracker.wait_all_free();
        assert_eq!(tracker.in_flight(), 0);
    }
}
