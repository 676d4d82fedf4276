use core::sync::atomic::{AtomicI32, Ordering};

/// Counting semaphore.
///
/// Each ATA channel owns one as its completion object: the interrupt
/// handler posts it, the thread that issued the command acquires it. At
/// most one caller ever waits on a given instance (transfers are globally
/// serialized), so a waiter list is unnecessary and acquisition spins.
pub struct Semaphore {
    count: AtomicI32,
}

impl Semaphore {
    pub const fn new(count: i32) -> Self {
        Self {
            count: AtomicI32::new(count),
        }
    }

    /// Increment the count, releasing one waiter. Safe to call from
    /// interrupt context.
    pub fn post(&self) {
        self.count.fetch_add(1, Ordering::Release);
    }

    /// Decrement the count, waiting until it is positive.
    ///
    /// Interrupts must be enabled when this can only be satisfied by an
    /// interrupt handler posting, or the wait never ends.
    pub fn acquire(&self) {
        while !self.try_acquire() {
            core::hint::spin_loop();
        }
    }

    /// Attempt to decrement the count without waiting.
    pub fn try_acquire(&self) -> bool {
        let mut current = self.count.load(Ordering::Acquire);
        while current > 0 {
            match self.count.compare_exchange_weak(
                current,
                current - 1,
                Ordering::Acquire,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
        false
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn post_then_acquire() {
        let sem = Semaphore::new(0);
        assert!(!sem.try_acquire());
        sem.post();
        assert!(sem.try_acquire());
        assert!(!sem.try_acquire());
    }

    #[test]
    fn acquire_waits_for_post() {
        use std::sync::Arc;

        let sem = Arc::new(Semaphore::new(0));
        let poster = Arc::clone(&sem);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(10));
            poster.post();
        });
        sem.acquire();
        handle.join().expect("poster thread panicked");
    }
}
