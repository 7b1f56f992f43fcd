// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Fixed-record POSIX message queue.
// Delegates to platform::PlatformQueue.

use std::io;

use crate::platform::{PlatformQueue, QueueMode};

/// Queue depth for every channel in the system. Must stay ≤ 10 so
/// unprivileged processes can create the queue.
pub const QUEUE_DEPTH: usize = 10;

/// A named message queue carrying fixed-size records.
///
/// Every channel in the system (registry, per-client request, per-client
/// response) is one of these, created with a message size equal to the size
/// of the one record type it carries.
pub struct MessageQueue {
    inner: PlatformQueue,
}

impl MessageQueue {
    /// Create a queue for `msg_size`-byte records. Fails if the name exists.
    pub fn create(name: &str, msg_size: usize) -> io::Result<Self> {
        let inner = PlatformQueue::open(name, msg_size, QUEUE_DEPTH, QueueMode::Create)?;
        Ok(Self { inner })
    }

    /// Open an existing queue; the record size comes from its attributes.
    pub fn open(name: &str) -> io::Result<Self> {
        let inner = PlatformQueue::open(name, 0, 0, QueueMode::Open)?;
        Ok(Self { inner })
    }

    /// Record size fixed at creation.
    pub fn msg_size(&self) -> usize {
        self.inner.msg_size()
    }

    /// The platform name used to open the queue.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Send one record (blocks if the queue is full).
    pub fn send(&self, data: &[u8]) -> io::Result<()> {
        self.inner.send(data, 1)
    }

    /// Send one record, giving up after `timeout_ms`. Returns `Ok(false)` on
    /// timeout. Used where the peer may have stopped draining (a dead client
    /// must not wedge a server worker).
    pub fn send_timeout(&self, data: &[u8], timeout_ms: u64) -> io::Result<bool> {
        self.inner.send_timeout(data, 1, timeout_ms)
    }

    /// Receive one record, waiting at most `timeout_ms`. Returns `Ok(None)`
    /// on timeout. `buf` must be at least [`msg_size`](Self::msg_size) bytes.
    pub fn recv_timeout(&self, buf: &mut [u8], timeout_ms: u64) -> io::Result<Option<usize>> {
        self.inner.recv_timeout(buf, timeout_ms)
    }

    /// Remove the queue name. Open descriptors stay usable until closed.
    pub fn unlink(&self) {
        self.inner.unlink();
    }

    /// Remove a named queue without needing an open handle.
    pub fn unlink_by_name(name: &str) {
        PlatformQueue::unlink_by_name(name);
    }
}
