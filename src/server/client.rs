// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Per-client server-side state. Created by the registry task on REGISTER,
// shared with the client's dispatcher and with workers, dropped after the
// dispatcher has stopped and in-flight work has drained.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::queue::MessageQueue;
use crate::shm::SegmentHandle;

/// How long unregistration waits for in-flight workers before giving up on a
/// clean drain. Handlers are pure and finite and response sends are
/// timeout-bounded, so this only trips if something is badly wrong.
const DRAIN_DEADLINE: Duration = Duration::from_secs(5);

pub(crate) struct ClientRecord {
    pub pid: i32,
    /// Client→server; the dispatcher is the sole receiver.
    pub request_queue: MessageQueue,
    /// Server→client; workers and the resize protocol send here.
    pub response_queue: MessageQueue,
    /// The client's segment as mapped into this process. Swapped under the
    /// lock by the resize protocol; workers copy the base pointer out while
    /// they hold a pool slot.
    pub segment: Mutex<SegmentHandle>,
    pub shm_name: String,
    /// Observed by the dispatcher between bounded-timeout receives.
    pub stop: AtomicBool,
    /// Requests dispatched for this client and not yet completed.
    pub inflight: AtomicUsize,
    pub dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl ClientRecord {
    /// Signal the dispatcher to stop and join it. Idempotent.
    pub fn stop_dispatcher(&self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.dispatcher.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    /// Wait for in-flight workers to drain, up to [`DRAIN_DEADLINE`].
    pub fn drain_inflight(&self) {
        let deadline = Instant::now() + DRAIN_DEADLINE;
        while self.inflight.load(Ordering::Acquire) != 0 {
            if Instant::now() >= deadline {
                eprintln!(
                    "gtipc server: giving up waiting for {} in-flight request(s) of client {}",
                    self.inflight.load(Ordering::Acquire),
                    self.pid
                );
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}
