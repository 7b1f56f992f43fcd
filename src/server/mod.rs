// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Server-side coordination engine: registry intake, the active-client set,
// and shutdown. The registry task is the sole mutator of the client set;
// everything a REGISTER needs (queues, mapping, dispatcher) is in place
// before the record becomes visible, so no request is dispatched for a
// half-registered client.

mod client;
mod dispatch;
mod pool;
pub mod services;

pub use pool::WorkerPool;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::entry::ENTRY_SIZE;
use crate::queue::MessageQueue;
use crate::shm::SegmentHandle;
use crate::wire::{RegistryCommand, RegistryRecord, ResponseRecord};

use client::ClientRecord;
use dispatch::RECV_TIMEOUT_MS;

/// How long shutdown tries to hand each client its close notice.
const CLOSE_NOTICE_TIMEOUT_MS: u64 = 100;

/// Server tuning knobs.
pub struct ServerConfig {
    /// Well-known registry channel name.
    pub registry_name: String,
    /// Maximum concurrently running workers (W).
    pub max_workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            registry_name: "/gtipc_registry".to_owned(),
            max_workers: 100,
        }
    }
}

type ClientSet = Arc<Mutex<Vec<Arc<ClientRecord>>>>;

/// The long-lived compute server.
///
/// [`start`](Self::start) creates the registry channel and spawns the intake
/// task; clients then attach and detach on their own. Dropping the server
/// (or calling [`shutdown`](Self::shutdown)) notifies registered clients,
/// drains in-flight work, and removes the registry channel.
pub struct ComputeServer {
    clients: ClientSet,
    pool: Arc<WorkerPool>,
    stop: Arc<AtomicBool>,
    registry_thread: Option<JoinHandle<()>>,
    registry_name: String,
}

impl ComputeServer {
    /// Create the registry channel and start accepting registrations.
    ///
    /// A stale registry queue left behind by a crashed server is unlinked and
    /// re-created; any other failure to create the channel is fatal.
    pub fn start(config: ServerConfig) -> io::Result<Self> {
        let registry = match MessageQueue::create(&config.registry_name, RegistryRecord::WIRE_SIZE)
        {
            Ok(q) => q,
            Err(e) if e.raw_os_error() == Some(libc::EEXIST) => {
                MessageQueue::unlink_by_name(&config.registry_name);
                MessageQueue::create(&config.registry_name, RegistryRecord::WIRE_SIZE)?
            }
            Err(e) => return Err(e),
        };

        let clients: ClientSet = Arc::new(Mutex::new(Vec::new()));
        let pool = Arc::new(WorkerPool::new(config.max_workers));
        let stop = Arc::new(AtomicBool::new(false));

        let thread_clients = Arc::clone(&clients);
        let thread_pool = Arc::clone(&pool);
        let thread_stop = Arc::clone(&stop);
        let registry_thread = std::thread::spawn(move || {
            registry_loop(registry, thread_clients, thread_pool, thread_stop)
        });

        Ok(Self {
            clients,
            pool,
            stop,
            registry_thread: Some(registry_thread),
            registry_name: config.registry_name,
        })
    }

    /// Number of currently registered clients.
    pub fn client_count(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    /// High-water mark of concurrently active workers.
    pub fn worker_peak(&self) -> usize {
        self.pool.peak()
    }

    /// Stop intake, notify and release every registered client, and remove
    /// the registry channel. Also runs on drop.
    pub fn shutdown(self) {
        drop(self);
    }

    fn stop_impl(&mut self) {
        let Some(handle) = self.registry_thread.take() else {
            return;
        };
        self.stop.store(true, Ordering::Release);
        let _ = handle.join();

        // The intake task is stopped, so this task is now the only mutator.
        let records: Vec<Arc<ClientRecord>> = self.clients.lock().unwrap().drain(..).collect();
        for record in records {
            release_client(&record, true);
        }

        MessageQueue::unlink_by_name(&self.registry_name);
    }
}

impl Drop for ComputeServer {
    fn drop(&mut self) {
        self.stop_impl();
    }
}

// ---------------------------------------------------------------------------
// Registry intake
// ---------------------------------------------------------------------------

fn registry_loop(
    registry: MessageQueue,
    clients: ClientSet,
    pool: Arc<WorkerPool>,
    stop: Arc<AtomicBool>,
) {
    let mut buf = vec![0u8; registry.msg_size().max(RegistryRecord::WIRE_SIZE)];

    while !stop.load(Ordering::Acquire) {
        let received = match registry.recv_timeout(&mut buf, RECV_TIMEOUT_MS) {
            Ok(Some(n)) => n,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("gtipc server: registry receive failed: {e}");
                continue;
            }
        };

        let reg = match RegistryRecord::from_bytes(&buf[..received]) {
            Some(r) => r,
            None => {
                eprintln!("gtipc server: dropping malformed registry record ({received} bytes)");
                continue;
            }
        };

        match RegistryCommand::from_u32(reg.cmd) {
            Some(RegistryCommand::Register) => register_client(&reg, &clients, &pool),
            Some(RegistryCommand::Unregister) | Some(RegistryCommand::ClientClose) => {
                unregister_client(&reg, &clients)
            }
            Some(RegistryCommand::ServerClose) => {
                // Outbound-only command; nothing to do if a client echoes it.
            }
            None => {
                eprintln!(
                    "gtipc server: unknown registry command {} from client {}",
                    reg.cmd, reg.pid
                );
            }
        }
    }
}

/// REGISTER: open the client's channels and segment, publish the record,
/// start its dispatcher. Any OS-level failure abandons the registration and
/// cleans up the partial state; it never takes the server down.
fn register_client(reg: &RegistryRecord, clients: &ClientSet, pool: &Arc<WorkerPool>) {
    let request_queue = match MessageQueue::open(reg.send_queue_str()) {
        Ok(q) => q,
        Err(e) => {
            eprintln!(
                "gtipc server: cannot open request queue '{}' for client {}: {e}",
                reg.send_queue_str(),
                reg.pid
            );
            return;
        }
    };
    let response_queue = match MessageQueue::open(reg.recv_queue_str()) {
        Ok(q) => q,
        Err(e) => {
            eprintln!(
                "gtipc server: cannot open response queue '{}' for client {}: {e}",
                reg.recv_queue_str(),
                reg.pid
            );
            return;
        }
    };
    let segment = match SegmentHandle::open(reg.shm_str()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!(
                "gtipc server: cannot map segment '{}' for client {}: {e}",
                reg.shm_str(),
                reg.pid
            );
            return;
        }
    };

    let capacity = (segment.size() / ENTRY_SIZE) as u32;
    if capacity != reg.initial_capacity {
        eprintln!(
            "gtipc server: capacity mismatch for client {}: announced {} but segment holds {}",
            reg.pid, reg.initial_capacity, capacity
        );
    }

    let record = Arc::new(ClientRecord {
        pid: reg.pid,
        request_queue,
        response_queue,
        shm_name: reg.shm_str().to_owned(),
        segment: Mutex::new(segment),
        stop: AtomicBool::new(false),
        inflight: std::sync::atomic::AtomicUsize::new(0),
        dispatcher: Mutex::new(None),
    });

    clients.lock().unwrap().push(Arc::clone(&record));

    let dispatcher_client = Arc::clone(&record);
    let dispatcher_pool = Arc::clone(pool);
    let handle =
        std::thread::spawn(move || dispatch::dispatcher_loop(dispatcher_client, dispatcher_pool));
    *record.dispatcher.lock().unwrap() = Some(handle);
}

/// UNREGISTER / CLIENT_CLOSE: locate the client by pid (several clients may
/// share a pid when one process opens multiple sessions, so the request-queue
/// name carried in the record breaks ties), remove it from the active set,
/// and release its resources.
fn unregister_client(reg: &RegistryRecord, clients: &ClientSet) {
    let record = {
        let mut set = clients.lock().unwrap();
        let wanted_queue = reg.send_queue_str();
        let pos = set
            .iter()
            .position(|c| {
                c.pid == reg.pid
                    && (wanted_queue.is_empty()
                        || c.request_queue.name() == crate::shm_name::make_ipc_name(wanted_queue))
            })
            .or_else(|| set.iter().position(|c| c.pid == reg.pid));
        match pos {
            Some(i) => set.remove(i),
            None => return,
        }
    };

    release_client(&record, false);
}

/// Stop the dispatcher, let in-flight work drain, optionally deliver the
/// shutdown notice, and drop the record (closing channels and unmapping the
/// segment).
fn release_client(record: &Arc<ClientRecord>, server_closing: bool) {
    record.stop_dispatcher();
    record.drain_inflight();

    if server_closing {
        let pill = ResponseRecord::server_close();
        match record
            .response_queue
            .send_timeout(pill.as_bytes(), CLOSE_NOTICE_TIMEOUT_MS)
        {
            Ok(true) => {}
            Ok(false) => eprintln!(
                "gtipc server: close notice to client {} timed out",
                record.pid
            ),
            Err(e) => eprintln!(
                "gtipc server: could not deliver close notice to client {}: {e}",
                record.pid
            ),
        }
    }
}
