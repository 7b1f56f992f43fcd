// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// End-to-end session tests over real kernel objects: a server and one or
// more clients in the same test process, each test on its own registry
// channel so parallel tests never collide.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use gtipc::wire::{RegistryCommand, RegistryRecord, RequestRecord, ResponseRecord};
use gtipc::{
    ClientConfig, ComputeClient, ComputeServer, EntryRef, Error, MessageQueue, SegmentHandle,
    ServerConfig, ServiceArg, ServiceId, ENTRY_SIZE,
};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_name(tag: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("/gtipc_{tag}_{n}_{}", std::process::id())
}

fn start_server(tag: &str, max_workers: usize) -> (ComputeServer, String) {
    let registry = unique_name(tag);
    let server = ComputeServer::start(ServerConfig {
        registry_name: registry.clone(),
        max_workers,
    })
    .expect("server start");
    (server, registry)
}

fn attach(registry: &str, initial_capacity: u32) -> ComputeClient {
    ComputeClient::attach(ClientConfig {
        registry_name: registry.to_owned(),
        initial_capacity,
    })
    .expect("client attach")
}

fn wait_until(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

// ===========================================================================
// Basic round-trips
// ===========================================================================

#[test]
fn sync_add_roundtrip() {
    let (server, registry) = start_server("sync", 100);
    let client = attach(&registry, 32);

    assert_eq!(client.call(ServiceId::Add, 3, 4).expect("call"), 7);

    client.detach().expect("detach");
    assert!(
        wait_until(|| server.client_count() == 0, Duration::from_secs(2)),
        "unregister must empty the client set"
    );
    server.shutdown();
}

#[test]
fn registration_is_effective_before_first_call() {
    // No settling sleep: the first call may only be dispatched once the
    // client record and dispatcher exist, so it must simply work.
    let (server, registry) = start_server("reg", 100);
    let client = attach(&registry, 8);
    assert_eq!(client.call(ServiceId::Mul, 6, 7).expect("call"), 42);
    drop(client);
    drop(server);
}

#[test]
fn sync_equals_submit_then_wait() {
    let (_server, registry) = start_server("law_sync", 100);
    let client = attach(&registry, 8);

    let direct = client.call(ServiceId::Mul, 12, 11).expect("call");
    let key = client.submit(ServiceId::Mul, 12, 11).expect("submit");
    let via_wait = client.wait(key).expect("wait");
    assert_eq!(direct, via_wait);
}

// ===========================================================================
// Asynchronous batches
// ===========================================================================

#[test]
fn async_batch_respects_worker_cap() {
    const REQUESTS: i32 = 200;
    let (server, registry) = start_server("batch", 100);
    let client = attach(&registry, 256);

    let mut keys = Vec::new();
    for i in 0..REQUESTS {
        keys.push(client.submit(ServiceId::Add, i, i + 1).expect("submit"));
    }

    let results = client.join(&keys).expect("join");
    assert_eq!(results.len(), REQUESTS as usize);
    for (i, res) in results.iter().enumerate() {
        assert_eq!(*res, 2 * i as i32 + 1);
    }

    assert!(
        server.worker_peak() <= 100,
        "peak {} exceeds the worker cap",
        server.worker_peak()
    );
}

#[test]
fn join_equals_sequential_waits_in_any_order() {
    let (_server, registry) = start_server("law_join", 100);
    let client = attach(&registry, 32);

    let mut keys = Vec::new();
    for i in 0..10 {
        keys.push(client.submit(ServiceId::Add, i, 100).expect("submit"));
    }

    // Harvest in reverse order; each key still yields its own result.
    for (i, key) in keys.into_iter().enumerate().rev() {
        assert_eq!(client.wait(key).expect("wait"), i as i32 + 100);
    }
}

#[test]
fn keys_are_unique_within_a_session() {
    let (_server, registry) = start_server("keys", 100);
    let client = attach(&registry, 64);

    let mut keys = Vec::new();
    for i in 0..50 {
        keys.push(client.submit(ServiceId::Add, i, 0).expect("submit"));
    }
    for (i, a) in keys.iter().enumerate() {
        for b in &keys[i + 1..] {
            assert_ne!(a, b, "two live keys must never be equal");
        }
    }
    client.join(&keys).expect("join");
}

// ===========================================================================
// Resize
// ===========================================================================

#[test]
fn resize_is_transparent_to_results() {
    let (_server, registry) = start_server("resize", 100);
    let client = attach(&registry, 4);

    // The 5th allocation (and again the 9th) finds the free list empty and
    // forces a resize handshake mid-workload.
    let mut keys = Vec::new();
    for i in 2..=11 {
        keys.push(client.submit(ServiceId::Mul, i, 3).expect("submit"));
    }

    let results = client.join(&keys).expect("join");
    assert_eq!(results, vec![6, 9, 12, 15, 18, 21, 24, 27, 30, 33]);
    assert_eq!(client.capacity(), 16, "4 → 8 → 16 after two resizes");
}

#[test]
fn entries_are_reused_after_harvest() {
    let (_server, registry) = start_server("reuse", 100);
    let client = attach(&registry, 2);

    // Ten sequential calls through a two-entry segment: every harvest must
    // return its entry to the free list, so no resize ever happens.
    for i in 0..10 {
        assert_eq!(client.call(ServiceId::Add, i, i).expect("call"), 2 * i);
    }
    assert_eq!(client.capacity(), 2);
}

// ===========================================================================
// Multiple clients
// ===========================================================================

#[test]
fn two_clients_do_not_see_each_others_responses() {
    const PER_CLIENT: i32 = 50;
    let (server, registry) = start_server("pair", 100);
    let client_a = attach(&registry, 64);
    let client_b = attach(&registry, 64);

    // Disjoint argument ranges: A sums around 1000, B around 5000.
    let mut keys_a = Vec::new();
    let mut keys_b = Vec::new();
    for i in 0..PER_CLIENT {
        keys_a.push(client_a.submit(ServiceId::Add, 1000 + i, i).expect("a"));
        keys_b.push(client_b.submit(ServiceId::Add, 5000 + i, i).expect("b"));
    }

    let results_a = client_a.join(&keys_a).expect("join a");
    let results_b = client_b.join(&keys_b).expect("join b");

    for (i, res) in results_a.iter().enumerate() {
        assert_eq!(*res, 1000 + 2 * i as i32);
    }
    for (i, res) in results_b.iter().enumerate() {
        assert_eq!(*res, 5000 + 2 * i as i32);
    }

    client_a.detach().expect("detach a");
    assert!(
        wait_until(|| server.client_count() == 1, Duration::from_secs(2)),
        "detaching A must leave B registered"
    );
    client_b.detach().expect("detach b");
}

// ===========================================================================
// Failure paths
// ===========================================================================

/// A minimal hand-rolled client speaking the wire protocol directly, for the
/// paths the public API cannot express (bad selectors, abrupt exits).
struct RawClient {
    req_name: String,
    rsp_name: String,
    shm_name: String,
    request_queue: MessageQueue,
    response_queue: MessageQueue,
    segment: SegmentHandle,
    registry: MessageQueue,
}

impl RawClient {
    fn register(registry_name: &str, capacity: u32) -> Self {
        let tag = unique_name("raw");
        let req_name = format!("{tag}_req");
        let rsp_name = format!("{tag}_rsp");
        let shm_name = format!("{tag}_shm");

        let request_queue =
            MessageQueue::create(&req_name, RequestRecord::WIRE_SIZE).expect("raw req queue");
        let response_queue =
            MessageQueue::create(&rsp_name, ResponseRecord::WIRE_SIZE).expect("raw rsp queue");
        let segment =
            SegmentHandle::create(&shm_name, capacity as usize * ENTRY_SIZE).expect("raw segment");
        let registry = MessageQueue::open(registry_name).expect("raw registry");

        let reg = RegistryRecord::new(
            RegistryCommand::Register,
            std::process::id() as i32,
            &req_name,
            &rsp_name,
            &shm_name,
            capacity,
        );
        registry.send(reg.as_bytes()).expect("raw register");

        Self {
            req_name,
            rsp_name,
            shm_name,
            request_queue,
            response_queue,
            segment,
            registry,
        }
    }

    fn entry(&self, idx: u32) -> EntryRef {
        unsafe { EntryRef::at(self.segment.as_mut_ptr(), idx) }
    }

    fn recv_response(&self, timeout: Duration) -> Option<ResponseRecord> {
        let mut buf = [0u8; ResponseRecord::WIRE_SIZE];
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(Some(n)) = self.response_queue.recv_timeout(&mut buf, 50) {
                return ResponseRecord::from_bytes(&buf[..n]);
            }
        }
        None
    }

    fn unlink_all(&self) {
        self.request_queue.unlink();
        self.response_queue.unlink();
        self.segment.unlink();
    }
}

#[test]
fn unknown_selector_marks_the_entry_failed() {
    let (_server, registry) = start_server("badsvc", 100);
    let raw = RawClient::register(&registry, 4);

    let entry = raw.entry(0);
    entry.write_request(ServiceArg { x: 1, y: 2 });

    let req = RequestRecord {
        request_id: 0,
        service: 99, // no such service
        entry_idx: 0,
        pid: std::process::id() as i32,
    };
    raw.request_queue.send(req.as_bytes()).expect("send");

    let resp = raw
        .recv_response(Duration::from_secs(2))
        .expect("the server must still answer an unknown selector");
    assert_eq!(resp.request_id, 0);
    assert_eq!(resp.entry_idx, 0);
    assert!(entry.is_done());
    let (_, fault) = entry.take_result();
    assert!(fault, "the entry must carry the failure marker");

    let unreg = RegistryRecord::new(
        RegistryCommand::Unregister,
        std::process::id() as i32,
        &raw.req_name,
        &raw.rsp_name,
        &raw.shm_name,
        0,
    );
    raw.registry.send(unreg.as_bytes()).expect("unregister");
    raw.unlink_all();
}

#[test]
fn fatal_surfaces_through_the_client_api() {
    let (_server, registry) = start_server("fatal", 100);
    let client = attach(&registry, 8);

    let key = client.submit(ServiceId::Add, 1, 1).expect("submit");
    assert_eq!(client.wait(key).expect("wait"), 2);

    // Waiting on a retired key is a client-side protocol error → Fatal.
    match client.wait(key) {
        Err(Error::Fatal(_)) => {}
        other => panic!("expected Fatal for a retired key, got {other:?}"),
    }
}

#[test]
fn abrupt_client_exit_does_not_poison_the_server() {
    let (server, registry) = start_server("abrupt", 100);

    // A client that vanishes mid-flight: register, submit, then drop all
    // handles without unregistering. The server may log a transport error
    // but must keep serving new registrations.
    {
        let raw = RawClient::register(&registry, 4);
        let entry = raw.entry(0);
        entry.write_request(ServiceArg { x: 7, y: 8 });
        let req = RequestRecord {
            request_id: 0,
            service: ServiceId::Add as u32,
            entry_idx: 0,
            pid: std::process::id() as i32,
        };
        raw.request_queue.send(req.as_bytes()).expect("send");
        raw.unlink_all();
        // handles drop here; the response is never harvested
    }

    let client = attach(&registry, 8);
    assert_eq!(client.call(ServiceId::Add, 20, 22).expect("call"), 42);
    client.detach().expect("detach");
    drop(server);
}

#[test]
fn server_shutdown_surfaces_fatal_to_waiters() {
    let (server, registry) = start_server("close", 100);
    let client = attach(&registry, 8);

    assert_eq!(client.call(ServiceId::Add, 1, 2).expect("call"), 3);
    server.shutdown();

    // The close notice reaches the demultiplexer within a few receive
    // windows; after that every call fails fast with Fatal.
    let failed = wait_until(
        || matches!(client.call(ServiceId::Add, 1, 1), Err(Error::Fatal(_))),
        Duration::from_secs(2),
    );
    assert!(failed, "calls after server shutdown must surface Fatal");
}
