use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// The most recent frame, as seen under the [`SharedFrame`] lock.
#[derive(Debug, Default)]
pub struct FrameSlot {
    data: Vec<u8>,
    /// Bumped on every publish. 0 means nothing was published yet.
    generation: u64,
}

impl FrameSlot {
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Latest-frame mailbox shared between one producer and one consumer.
///
/// The producer overwrites the slot and signals the condition variable; the
/// consumer waits for a generation it has not seen yet, copies the bytes and
/// drops the guard. Frames published while the consumer is busy are
/// superseded: only the freshest one is ever observed.
///
/// The stop flag is process-wide: once raised, every waiter wakes up and
/// should wind down.
#[derive(Debug, Default)]
pub struct SharedFrame {
    slot: Mutex<FrameSlot>,
    update: Condvar,
    stop: AtomicBool,
}

impl SharedFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame and wake the consumer. Returns the new generation.
    pub fn publish(&self, frame: &[u8]) -> Result<u64, FrameError> {
        let mut slot = self.lock()?;
        slot.data.clear();
        slot.data.extend_from_slice(frame);
        slot.generation = slot.generation.wrapping_add(1);
        let generation = slot.generation;
        drop(slot);
        self.update.notify_all();
        Ok(generation)
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, FrameSlot>, FrameError> {
        self.slot.lock().map_err(|_| FrameError::Poisoned)
    }

    pub fn generation(&self) -> Result<u64, FrameError> {
        Ok(self.lock()?.generation)
    }

    /// Block until a generation other than `last_seen` is published, the stop
    /// flag is raised, or `cancelled` reports true. The guard is held again on return.
    ///
    /// Whoever flips the state behind `cancelled` must call [`SharedFrame::interrupt`]
    /// afterwards, otherwise the waiter sleeps until the next publish.
    pub fn wait_for_frame<'a, F>(
        &'a self,
        guard: MutexGuard<'a, FrameSlot>,
        last_seen: u64,
        cancelled: F,
    ) -> Result<MutexGuard<'a, FrameSlot>, FrameError>
    where
        F: Fn() -> bool,
    {
        self.update
            .wait_while(guard, |slot| {
                slot.generation == last_seen && !self.is_stopped() && !cancelled()
            })
            .map_err(|_| FrameError::Poisoned)
    }

    /// Raise the process-wide stop flag and wake every waiter.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.interrupt();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Wake every waiter so it re-evaluates its exit conditions.
    ///
    /// The lock is taken first so a waiter that already checked its condition
    /// is guaranteed to be parked on the condvar before the notification.
    pub fn interrupt(&self) {
        let _slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        self.update.notify_all();
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("shared frame lock poisoned by a panicking holder")]
    Poisoned,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn publish_replaces_frame_and_bumps_generation() {
        let shared = SharedFrame::new();
        assert_eq!(shared.generation().unwrap(), 0);

        assert_eq!(shared.publish(&[1, 2, 3, 4]).unwrap(), 1);
        assert_eq!(shared.publish(&[9]).unwrap(), 2);

        let slot = shared.lock().unwrap();
        assert_eq!(slot.data(), &[9u8]);
        assert_eq!(slot.len(), 1);
        assert_eq!(slot.generation(), 2);
    }

    #[test]
    fn waiter_wakes_on_publish() {
        let shared = Arc::new(SharedFrame::new());
        let producer = Arc::clone(&shared);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.publish(b"jpeg").unwrap();
        });

        let guard = shared.lock().unwrap();
        let guard = shared.wait_for_frame(guard, 0, || false).unwrap();
        assert_eq!(guard.generation(), 1);
        assert_eq!(guard.data(), b"jpeg");
        drop(guard);
        handle.join().unwrap();
    }

    #[test]
    fn already_published_frame_returns_immediately() {
        let shared = SharedFrame::new();
        shared.publish(b"a").unwrap();
        shared.publish(b"b").unwrap();

        let guard = shared.lock().unwrap();
        let guard = shared.wait_for_frame(guard, 1, || false).unwrap();
        assert_eq!(guard.data(), b"b");
    }

    #[test]
    fn request_stop_wakes_waiter() {
        let shared = Arc::new(SharedFrame::new());
        let host = Arc::clone(&shared);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            host.request_stop();
        });

        let guard = shared.lock().unwrap();
        let guard = shared.wait_for_frame(guard, 0, || false).unwrap();
        assert_eq!(guard.generation(), 0);
        assert!(shared.is_stopped());
        drop(guard);
        handle.join().unwrap();
    }

    #[test]
    fn interrupt_wakes_cancelled_waiter() {
        let shared = Arc::new(SharedFrame::new());
        let cancelled = Arc::new(AtomicBool::new(false));

        let handle = {
            let shared = Arc::clone(&shared);
            let cancelled = Arc::clone(&cancelled);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                cancelled.store(true, Ordering::SeqCst);
                shared.interrupt();
            })
        };

        let guard = shared.lock().unwrap();
        let guard = shared
            .wait_for_frame(guard, 0, || cancelled.load(Ordering::SeqCst))
            .unwrap();
        assert_eq!(guard.generation(), 0);
        assert!(!shared.is_stopped());
        drop(guard);
        handle.join().unwrap();
    }
}
