//! Counting permits bounding concurrent network calls.

use parking_lot::{Condvar, Mutex};

/// A counting semaphore owned by one engine.
///
/// Each network call holds a [`Permit`] from request until the response
/// (or the final failure) is known.
#[derive(Debug)]
pub struct PermitPool {
    capacity: usize,
    available: Mutex<usize>,
    released: Condvar,
}

impl PermitPool {
    /// Creates a pool with `capacity` permits (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            available: Mutex::new(capacity),
            released: Condvar::new(),
        }
    }

    /// Blocks until a permit is free and takes it.
    pub fn acquire(&self) -> Permit<'_> {
        let mut available = self.available.lock();
        while *available == 0 {
            self.released.wait(&mut available);
        }
        *available -= 1;
        Permit { pool: self }
    }

    /// Takes a permit if one is free.
    #[cfg(test)]
    fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut available = self.available.lock();
        if *available == 0 {
            return None;
        }
        *available -= 1;
        Some(Permit { pool: self })
    }

    /// Total permits.
    #[cfg(test)]
    fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently free.
    #[cfg(test)]
    fn available(&self) -> usize {
        *self.available.lock()
    }

    fn release(&self) {
        let mut available = self.available.lock();
        *available += 1;
        self.released.notify_one();
    }
}

/// A held permit; released on drop.
#[derive(Debug)]
pub struct Permit<'a> {
    pool: &'a PermitPool,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.pool.release();
    }
}
