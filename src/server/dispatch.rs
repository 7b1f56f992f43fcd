// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Per-client dispatcher: one task per registered client owning that client's
// request queue. It routes data records into the worker pool and runs the
// segment-switch protocol for resize notifications; it never executes service
// logic itself. The bounded receive timeout is what lets it observe its stop
// flag and exit without unsafe cancellation.

use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::entry::EntryRef;
use crate::shm::SegmentHandle;
use crate::wire::{RequestRecord, ResponseRecord, ServiceId, CONTROL_ID};

use super::client::ClientRecord;
use super::pool::WorkerPool;
use super::services;

/// Receive timeout for the dispatcher (and the other long-running loops):
/// short enough that stop flags are observed promptly.
pub(crate) const RECV_TIMEOUT_MS: u64 = 10;

/// How long a worker tries to deliver a response before declaring the client
/// gone. A dead client must not hold a pool slot forever.
const RESPONSE_SEND_TIMEOUT_MS: u64 = 1000;

pub(crate) fn dispatcher_loop(client: Arc<ClientRecord>, pool: Arc<WorkerPool>) {
    let mut buf = vec![0u8; client.request_queue.msg_size().max(RequestRecord::WIRE_SIZE)];

    while !client.stop.load(Ordering::Acquire) {
        let received = match client.request_queue.recv_timeout(&mut buf, RECV_TIMEOUT_MS) {
            Ok(Some(n)) => n,
            Ok(None) => continue,
            Err(e) => {
                eprintln!(
                    "gtipc server: request receive failed for client {}: {e}",
                    client.pid
                );
                continue;
            }
        };

        let req = match RequestRecord::from_bytes(&buf[..received]) {
            Some(r) => r,
            None => {
                eprintln!(
                    "gtipc server: dropping malformed request ({received} bytes) from client {}",
                    client.pid
                );
                continue;
            }
        };

        if req.request_id == CONTROL_ID {
            if let Err(e) = switch_segment(&client, &pool) {
                eprintln!(
                    "gtipc server: segment switch failed for client {}: {e}",
                    client.pid
                );
            }
            continue;
        }

        if client.stop.load(Ordering::Acquire) {
            // Unregistration in progress: refuse new work, let in-flight finish.
            break;
        }

        // Blocks while the pool is full; this is the back-pressure point.
        pool.admit();
        client.inflight.fetch_add(1, Ordering::AcqRel);

        let worker_client = Arc::clone(&client);
        let worker_pool = Arc::clone(&pool);
        std::thread::spawn(move || serve_request(worker_client, worker_pool, req));
    }
}

/// One worker: run the handler, publish into the entry, notify the client.
fn serve_request(client: Arc<ClientRecord>, pool: Arc<WorkerPool>, req: RequestRecord) {
    // The base pointer stays valid for the whole run: the resize protocol
    // cannot swap the mapping while this worker holds its pool slot.
    let (base, capacity) = {
        let seg = client.segment.lock().unwrap();
        (seg.as_mut_ptr(), (seg.size() / crate::entry::ENTRY_SIZE) as u32)
    };

    if req.entry_idx >= capacity {
        eprintln!(
            "gtipc server: request {} of client {} names entry {} beyond capacity {}; skipped",
            req.request_id, req.pid, req.entry_idx, capacity
        );
        client.inflight.fetch_sub(1, Ordering::AcqRel);
        pool.depart();
        return;
    }

    let entry = unsafe { EntryRef::at(base, req.entry_idx) };
    let arg = entry.arg();

    let (res, fault) = match ServiceId::from_u32(req.service) {
        Some(service) => (services::run(service, &arg), false),
        None => {
            eprintln!(
                "gtipc server: unknown service selector {} from client {}",
                req.service, req.pid
            );
            (0, true)
        }
    };

    // Result before flag before response: the client may observe completion
    // through either the entry or the response record.
    entry.publish_result(res, fault);

    let resp = ResponseRecord {
        request_id: req.request_id,
        entry_idx: req.entry_idx,
    };
    match client
        .response_queue
        .send_timeout(resp.as_bytes(), RESPONSE_SEND_TIMEOUT_MS)
    {
        Ok(true) => {}
        Ok(false) => eprintln!(
            "gtipc server: response queue of client {} full; request {} notice dropped",
            client.pid, req.request_id
        ),
        Err(e) => eprintln!(
            "gtipc server: response send failed for client {}: {e}",
            client.pid
        ),
    }

    client.inflight.fetch_sub(1, Ordering::AcqRel);
    pool.depart();
}

/// Resize protocol, server half: re-open the enlarged object, wait for pool
/// quiescence (no worker may write through the stale mapping), carry the old
/// contents over, swap the record's segment, acknowledge.
fn switch_segment(client: &ClientRecord, pool: &WorkerPool) -> io::Result<()> {
    let new_seg = SegmentHandle::open(&client.shm_name)?;

    pool.quiesce();

    {
        let mut seg = client.segment.lock().unwrap();
        let old_len = seg.size().min(new_seg.size());
        unsafe {
            std::ptr::copy_nonoverlapping(seg.as_ptr(), new_seg.as_mut_ptr(), old_len);
        }
        *seg = new_seg; // old mapping is released here
    }

    let ack = ResponseRecord::resize_done();
    match client
        .response_queue
        .send_timeout(ack.as_bytes(), RESPONSE_SEND_TIMEOUT_MS)
    {
        Ok(true) => Ok(()),
        Ok(false) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "resize acknowledgement could not be delivered",
        )),
        Err(e) => Err(e),
    }
}
