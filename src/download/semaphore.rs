use std::sync::{Condvar, Mutex};

/// Counting semaphore bounding simultaneous asset transfers process-wide.
///
/// Acquisition blocks the calling worker until a permit is free; there is no
/// fairness or starvation protection. Permits are released when the guard is
/// dropped, including on panic.
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

pub struct SemaphorePermit<'a> {
    semaphore: &'a Semaphore,
}

impl Semaphore {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Mutex::new(capacity.max(1)),
            available: Condvar::new(),
        }
    }

    pub fn acquire(&self) -> SemaphorePermit<'_> {
        let mut permits = self.permits.lock().unwrap();
        while *permits == 0 {
            permits = self.available.wait(permits).unwrap();
        }
        *permits -= 1;
        SemaphorePermit { semaphore: self }
    }
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        let mut permits = self.semaphore.permits.lock().unwrap();
        *permits += 1;
        self.semaphore.available.notify_one();
    }
}
