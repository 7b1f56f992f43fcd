// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Client-side request engine: entry allocation, request/response correlation
// against the shared-memory segment, the resize handshake, and the public
// synchronous/asynchronous API.
//
// Lock discipline: one mutex guards the whole client state (segment view,
// free list, key table, resize flags). The allocator holds it across the
// entire resize handshake (grow, notify, await acknowledgement), with the
// condvar releasing it only inside the wait, so no data request can be
// enqueued between the resize notice and the resize-complete acknowledgement.
// The response demultiplexer takes the lock only to signal completion.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;

use crate::entry::{EntryRef, ENTRY_SIZE};
use crate::error::{Error, Result};
use crate::queue::MessageQueue;
use crate::shm::SegmentHandle;
use crate::wire::{
    RegistryCommand, RegistryRecord, RequestKey, RequestRecord, ResponseRecord, ServiceArg,
    ServiceId, CONTROL_ID, CTRL_RESIZE_DONE, CTRL_SERVER_CLOSE,
};

/// Receive timeout for the demultiplexer loop.
const RECV_TIMEOUT_MS: u64 = 10;

/// Process-local sequence so several sessions in one process get distinct
/// kernel object names.
static CLIENT_SEQ: AtomicU32 = AtomicU32::new(0);

/// Client tuning knobs.
pub struct ClientConfig {
    /// Well-known registry channel name the server listens on.
    pub registry_name: String,
    /// Entry capacity of the freshly created segment.
    pub initial_capacity: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            registry_name: "/gtipc_registry".to_owned(),
            initial_capacity: 32,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state between API callers and the demultiplexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowStatus {
    Pending,
    Done,
    /// The server shut down before this request completed.
    Closed,
}

/// Key-table row: where the request lives and how to wait for it.
#[derive(Clone)]
struct PendingRow {
    entry_idx: u32,
    wake: Arc<(Mutex<RowStatus>, Condvar)>,
}

impl PendingRow {
    fn signal(&self, status: RowStatus) {
        let (lock, cvar) = &*self.wake;
        *lock.lock().unwrap() = status;
        cvar.notify_all();
    }
}

struct ClientState {
    segment: SegmentHandle,
    capacity: u32,
    free_list: Vec<u32>,
    keys: HashMap<i32, PendingRow>,
    next_id: i32,
    resize_in_progress: bool,
    resize_acked: bool,
    closed: bool,
}

struct ClientShared {
    state: Mutex<ClientState>,
    /// Signalled for resize acknowledgements and session close.
    cond: Condvar,
}

// ---------------------------------------------------------------------------
// ComputeClient
// ---------------------------------------------------------------------------

/// One session with the compute server.
///
/// The session owns two message queues and one shared-memory segment, all
/// named after this process. Dropping the session (or calling
/// [`detach`](Self::detach)) unregisters from the server and removes the
/// kernel objects.
pub struct ComputeClient {
    pid: i32,
    req_name: String,
    rsp_name: String,
    shm_name: String,
    registry: MessageQueue,
    request_queue: MessageQueue,
    shared: Arc<ClientShared>,
    stop: Arc<AtomicBool>,
    demux: Option<JoinHandle<()>>,
}

impl ComputeClient {
    /// Create the per-session kernel objects, register with the server, and
    /// start the response demultiplexer.
    pub fn attach(config: ClientConfig) -> Result<Self> {
        let pid = std::process::id() as i32;
        let seq = CLIENT_SEQ.fetch_add(1, Ordering::Relaxed);
        let req_name = format!("/gtipc_req_{pid}_{seq}");
        let rsp_name = format!("/gtipc_rsp_{pid}_{seq}");
        let shm_name = format!("/gtipc_shm_{pid}_{seq}");

        let capacity = config.initial_capacity.max(1);

        let request_queue =
            MessageQueue::create(&req_name, RequestRecord::WIRE_SIZE).map_err(Error::Init)?;
        let response_queue = match MessageQueue::create(&rsp_name, ResponseRecord::WIRE_SIZE) {
            Ok(q) => q,
            Err(e) => {
                request_queue.unlink();
                return Err(Error::Init(e));
            }
        };
        let segment = match SegmentHandle::create(&shm_name, capacity as usize * ENTRY_SIZE) {
            Ok(s) => s,
            Err(e) => {
                request_queue.unlink();
                response_queue.unlink();
                return Err(Error::Shm(e));
            }
        };

        let registry = match MessageQueue::open(&config.registry_name) {
            Ok(q) => q,
            Err(e) => {
                request_queue.unlink();
                response_queue.unlink();
                segment.unlink();
                return Err(Error::Init(e));
            }
        };

        let reg = RegistryRecord::new(
            RegistryCommand::Register,
            pid,
            &req_name,
            &rsp_name,
            &shm_name,
            capacity,
        );
        if let Err(e) = registry.send(reg.as_bytes()) {
            request_queue.unlink();
            response_queue.unlink();
            segment.unlink();
            return Err(Error::Send(e));
        }

        let shared = Arc::new(ClientShared {
            state: Mutex::new(ClientState {
                segment,
                capacity,
                free_list: (0..capacity).collect(),
                keys: HashMap::new(),
                next_id: 0,
                resize_in_progress: false,
                resize_acked: false,
                closed: false,
            }),
            cond: Condvar::new(),
        });

        let stop = Arc::new(AtomicBool::new(false));
        let demux_shared = Arc::clone(&shared);
        let demux_stop = Arc::clone(&stop);
        let demux =
            std::thread::spawn(move || demux_loop(response_queue, demux_shared, demux_stop));

        Ok(Self {
            pid,
            req_name,
            rsp_name,
            shm_name,
            registry,
            request_queue,
            shared,
            stop,
            demux: Some(demux),
        })
    }

    /// Synchronous call: submit, wait, return the result.
    pub fn call(&self, service: ServiceId, x: i32, y: i32) -> Result<i32> {
        let key = self.submit(service, x, y)?;
        self.wait(key)
    }

    /// Submit a request asynchronously; harvest later with
    /// [`wait`](Self::wait) or [`join`](Self::join).
    pub fn submit(&self, service: ServiceId, x: i32, y: i32) -> Result<RequestKey> {
        let arg = ServiceArg { x, y };

        let (id, entry_idx) = {
            let mut st = self.shared.state.lock().unwrap();

            loop {
                if st.closed {
                    return Err(Error::Fatal("server closed the session"));
                }
                if st.resize_in_progress {
                    // Another thread is mid-handshake; wait for it to finish.
                    st = self.shared.cond.wait(st).unwrap();
                    continue;
                }
                if !st.free_list.is_empty() {
                    break;
                }
                st = self.grow_segment(st)?;
            }

            let entry_idx = st.free_list.pop().unwrap();
            let id = st.next_id;
            st.next_id += 1;

            let entry = unsafe { EntryRef::at(st.segment.as_mut_ptr(), entry_idx) };
            entry.write_request(arg);

            let row = PendingRow {
                entry_idx,
                wake: Arc::new((Mutex::new(RowStatus::Pending), Condvar::new())),
            };
            st.keys.insert(id, row);

            (id, entry_idx)
        };

        let rec = RequestRecord {
            request_id: id,
            service: service as u32,
            entry_idx,
            pid: self.pid,
        };
        if let Err(e) = self.request_queue.send(rec.as_bytes()) {
            // The server never saw the id; take the row back.
            let mut st = self.shared.state.lock().unwrap();
            st.keys.remove(&id);
            st.free_list.push(entry_idx);
            return Err(Error::Send(e));
        }

        Ok(RequestKey { id, entry_idx })
    }

    /// Block until the request behind `key` completes, harvest its result,
    /// and return the entry to the free list.
    pub fn wait(&self, key: RequestKey) -> Result<i32> {
        let row = {
            let st = self.shared.state.lock().unwrap();
            match st.keys.get(&key.id) {
                Some(row) => row.clone(),
                None => return Err(Error::Fatal("unknown request key")),
            }
        };

        let status = {
            let (lock, cvar) = &*row.wake;
            let mut status = lock.lock().unwrap();
            while *status == RowStatus::Pending {
                status = cvar.wait(status).unwrap();
            }
            *status
        };

        let mut st = self.shared.state.lock().unwrap();
        st.keys.remove(&key.id);

        if status == RowStatus::Closed {
            return Err(Error::Fatal("server closed the session"));
        }

        let entry = unsafe { EntryRef::at(st.segment.as_mut_ptr(), row.entry_idx) };
        let (res, fault) = entry.take_result();
        entry.reset();
        st.free_list.push(row.entry_idx);

        if fault {
            return Err(Error::Fatal("request could not be served"));
        }
        Ok(res)
    }

    /// Join on a group of requests. Completes only when every constituent
    /// has completed; results are in key order.
    pub fn join(&self, keys: &[RequestKey]) -> Result<Vec<i32>> {
        let mut results = Vec::with_capacity(keys.len());
        for &key in keys {
            results.push(self.wait(key)?);
        }
        Ok(results)
    }

    /// Current entry capacity of the local segment. Grows (never shrinks)
    /// as resize handshakes complete.
    pub fn capacity(&self) -> u32 {
        self.shared.state.lock().unwrap().capacity
    }

    /// Unregister from the server and remove the per-session kernel objects.
    /// Also runs on drop.
    pub fn detach(mut self) -> Result<()> {
        self.detach_impl();
        Ok(())
    }

    /// Resize handshake, client half. Runs with the state lock held (the
    /// condvar wait is the only point where it is released, and every other
    /// allocator blocks on `resize_in_progress` meanwhile).
    fn grow_segment<'a>(
        &self,
        mut st: MutexGuard<'a, ClientState>,
    ) -> Result<MutexGuard<'a, ClientState>> {
        st.resize_in_progress = true;
        st.resize_acked = false;

        let old_capacity = st.capacity;
        let new_capacity = old_capacity * 2;

        if let Err(e) = st.segment.grow(new_capacity as usize * ENTRY_SIZE) {
            st.resize_in_progress = false;
            self.shared.cond.notify_all();
            return Err(Error::Shm(e));
        }

        let notice = RequestRecord::resize_notice(self.pid);
        if let Err(e) = self.request_queue.send(notice.as_bytes()) {
            st.resize_in_progress = false;
            self.shared.cond.notify_all();
            return Err(Error::Send(e));
        }

        while !st.resize_acked && !st.closed {
            st = self.shared.cond.wait(st).unwrap();
        }

        if st.closed {
            st.resize_in_progress = false;
            self.shared.cond.notify_all();
            return Err(Error::Fatal("server closed the session"));
        }

        st.capacity = new_capacity;
        st.free_list.extend(old_capacity..new_capacity);
        st.resize_in_progress = false;
        self.shared.cond.notify_all();
        Ok(st)
    }

    fn detach_impl(&mut self) {
        let Some(handle) = self.demux.take() else {
            return;
        };

        let reg = RegistryRecord::new(
            RegistryCommand::Unregister,
            self.pid,
            &self.req_name,
            &self.rsp_name,
            &self.shm_name,
            0,
        );
        if let Err(e) = self.registry.send(reg.as_bytes()) {
            eprintln!("gtipc client: unregister notice failed: {e}");
        }

        self.stop.store(true, Ordering::Release);
        let _ = handle.join();

        // Names are client-owned; the server's descriptors for these objects
        // stay valid until its unregister path closes them.
        self.request_queue.unlink();
        MessageQueue::unlink_by_name(&self.rsp_name);
        self.shared.state.lock().unwrap().segment.unlink();
    }
}

impl Drop for ComputeClient {
    fn drop(&mut self) {
        self.detach_impl();
    }
}

// ---------------------------------------------------------------------------
// Response demultiplexer
// ---------------------------------------------------------------------------

fn demux_loop(queue: MessageQueue, shared: Arc<ClientShared>, stop: Arc<AtomicBool>) {
    let mut buf = vec![0u8; queue.msg_size().max(ResponseRecord::WIRE_SIZE)];

    while !stop.load(Ordering::Acquire) {
        let received = match queue.recv_timeout(&mut buf, RECV_TIMEOUT_MS) {
            Ok(Some(n)) => n,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("gtipc client: response receive failed: {e}");
                continue;
            }
        };

        let resp = match ResponseRecord::from_bytes(&buf[..received]) {
            Some(r) => r,
            None => {
                eprintln!("gtipc client: dropping malformed response ({received} bytes)");
                continue;
            }
        };

        if resp.request_id == CONTROL_ID {
            match resp.entry_idx {
                CTRL_RESIZE_DONE => {
                    let mut st = shared.state.lock().unwrap();
                    st.resize_acked = true;
                    shared.cond.notify_all();
                }
                CTRL_SERVER_CLOSE => {
                    let mut st = shared.state.lock().unwrap();
                    st.closed = true;
                    for row in st.keys.values() {
                        row.signal(RowStatus::Closed);
                    }
                    shared.cond.notify_all();
                }
                other => {
                    eprintln!("gtipc client: unknown control code {other} on response channel");
                }
            }
            continue;
        }

        let st = shared.state.lock().unwrap();
        match st.keys.get(&resp.request_id) {
            Some(row) => row.signal(RowStatus::Done),
            None => {
                eprintln!(
                    "gtipc client: response for unknown request id {}",
                    resp.request_id
                );
            }
        }
    }
}
