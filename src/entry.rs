// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Shared-memory entry layout and the result-publication protocol.
//
// A client's segment is a plain array of `SharedEntry`. Ownership of one
// entry alternates between the client (building a request, harvesting a
// result) and exactly one server worker (between dispatch and completion).
// The completion flag transitions 0→1 once per request with release/acquire
// ordering, so a reader that observes 1 also observes the fully written
// result slot; the spin lock serialises the worker's write against a reader
// polling the same entry. The all-zeroes bit pattern is a valid pristine
// entry, so freshly truncated segment pages need no construction, and the
// lock state survives the byte-for-byte copy a resize performs.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::spin_lock::SpinLock;
use crate::wire::ServiceArg;

/// Completion flag values.
pub const FLAG_PENDING: u8 = 0;
pub const FLAG_DONE: u8 = 1;

/// One fixed-size slot in a client's shared-memory segment.
#[repr(C)]
pub struct SharedEntry {
    /// Request argument payload.
    arg: ServiceArg,
    /// Result slot.
    res: i32,
    /// Distinguished failure marker (1 = the request could not be served).
    fault: u8,
    /// Completion flag byte: 0 = pending, 1 = done.
    done: AtomicU8,
    _pad: [u8; 2],
    /// Per-entry mutual exclusion, valid for cross-process use.
    lock: SpinLock,
}

/// Size of one entry; segment size is always `capacity * ENTRY_SIZE`.
pub const ENTRY_SIZE: usize = std::mem::size_of::<SharedEntry>();

/// A borrowed view of one entry inside a mapped segment.
///
/// The pointer stays valid for as long as the mapping it was resolved from:
/// workers resolve it after the pool admits them and before the pool count
/// drops, which is exactly the window the resize protocol excludes.
#[derive(Clone, Copy)]
pub struct EntryRef {
    ptr: *mut SharedEntry,
}

unsafe impl Send for EntryRef {}

impl EntryRef {
    /// Resolve entry `idx` from a segment base pointer.
    ///
    /// # Safety
    /// `base` must point to a live mapping of at least `(idx + 1) * ENTRY_SIZE`
    /// bytes.
    pub unsafe fn at(base: *mut u8, idx: u32) -> Self {
        Self {
            ptr: base.add(idx as usize * ENTRY_SIZE) as *mut SharedEntry,
        }
    }

    fn entry(&self) -> &SharedEntry {
        unsafe { &*self.ptr }
    }

    /// Client side: stage a request argument and clear the completion state.
    /// The caller must own the entry (it came off the free list).
    pub fn write_request(&self, arg: ServiceArg) {
        let e = self.entry();
        e.lock.lock();
        unsafe {
            (*self.ptr).arg = arg;
            (*self.ptr).res = 0;
            (*self.ptr).fault = 0;
        }
        e.done.store(FLAG_PENDING, Ordering::Release);
        e.lock.unlock();
    }

    /// The request argument as staged by the client.
    pub fn arg(&self) -> ServiceArg {
        let e = self.entry();
        e.lock.lock();
        let arg = e.arg;
        e.lock.unlock();
        arg
    }

    /// Worker side: publish the result (or the failure marker) and set the
    /// completion flag. The flag store is the release point: a reader that
    /// observes it sees the full result slot.
    pub fn publish_result(&self, res: i32, fault: bool) {
        let e = self.entry();
        e.lock.lock();
        unsafe {
            (*self.ptr).res = res;
            (*self.ptr).fault = if fault { 1 } else { 0 };
        }
        e.done.store(FLAG_DONE, Ordering::Release);
        e.lock.unlock();
    }

    /// Whether the completion flag is set (acquire side of publication).
    pub fn is_done(&self) -> bool {
        self.entry().done.load(Ordering::Acquire) == FLAG_DONE
    }

    /// Client side: read the published result. Returns `(result, fault)`.
    /// Only meaningful after [`is_done`](Self::is_done) returned true.
    pub fn take_result(&self) -> (i32, bool) {
        let e = self.entry();
        e.lock.lock();
        let pair = (e.res, e.fault != 0);
        e.lock.unlock();
        pair
    }

    /// Client side: clear the completion flag as the entry returns to the
    /// free list.
    pub fn reset(&self) {
        self.entry().done.store(FLAG_PENDING, Ordering::Release);
    }
}
