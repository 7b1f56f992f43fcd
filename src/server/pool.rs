// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Bounded worker pool: one mutex + condition variable pair guarding the
// active count. Admission blocks until a slot frees up (back-pressure, never
// an error); the resize protocol blocks on full quiescence.

use std::sync::{Condvar, Mutex};

struct PoolState {
    active: usize,
    peak: usize,
}

/// Admission control for worker tasks.
///
/// At most `limit` workers run concurrently. [`admit`](Self::admit) blocks
/// the submitter while the pool is full; [`depart`](Self::depart) frees a
/// slot and wakes both blocked submitters and anyone waiting in
/// [`quiesce`](Self::quiesce).
pub struct WorkerPool {
    limit: usize,
    state: Mutex<PoolState>,
    cond: Condvar,
}

impl WorkerPool {
    pub fn new(limit: usize) -> Self {
        assert!(limit > 0, "worker pool limit must be positive");
        Self {
            limit,
            state: Mutex::new(PoolState { active: 0, peak: 0 }),
            cond: Condvar::new(),
        }
    }

    /// Maximum concurrency.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Claim a worker slot, blocking until one is free.
    pub fn admit(&self) {
        let mut st = self.state.lock().unwrap();
        while st.active >= self.limit {
            st = self.cond.wait(st).unwrap();
        }
        st.active += 1;
        if st.active > st.peak {
            st.peak = st.active;
        }
    }

    /// Release a worker slot.
    pub fn depart(&self) {
        let mut st = self.state.lock().unwrap();
        st.active -= 1;
        self.cond.notify_all();
    }

    /// Block until no workers are active.
    pub fn quiesce(&self) {
        let mut st = self.state.lock().unwrap();
        while st.active != 0 {
            st = self.cond.wait(st).unwrap();
        }
    }

    /// Currently active workers.
    pub fn active(&self) -> usize {
        self.state.lock().unwrap().active
    }

    /// High-water mark of concurrently active workers.
    pub fn peak(&self) -> usize {
        self.state.lock().unwrap().peak
    }
}
