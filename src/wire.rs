// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Wire records exchanged over the message queues. Every record is a
// `#[repr(C)]` struct copied byte-for-byte into a queue message whose size
// equals the record size, so the layouts here are the cross-process contract.
//
// The request id value -1 (`CONTROL_ID`) is reserved on both per-client
// channels: a request record carrying it is a resize notification, and a
// response record carrying it is a control acknowledgement whose `entry_idx`
// holds one of the `CTRL_*` codes below.

use std::mem::size_of;

/// Maximum length of an object name carried in a registry record,
/// including the NUL terminator.
pub const MAX_NAME_LEN: usize = 64;

/// Reserved request id distinguishing control records from data records.
pub const CONTROL_ID: i32 = -1;

/// Control code (in `ResponseRecord::entry_idx`): the segment switch after a
/// resize is complete and the client may resume submitting.
pub const CTRL_RESIZE_DONE: u32 = 0;

/// Control code (in `ResponseRecord::entry_idx`): the server is shutting
/// down; no further responses will arrive.
pub const CTRL_SERVER_CLOSE: u32 = u32::MAX;

// ---------------------------------------------------------------------------
// Registry commands and service selectors
// ---------------------------------------------------------------------------

/// Command carried by a [`RegistryRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RegistryCommand {
    Register = 0,
    Unregister = 1,
    ClientClose = 2,
    /// Only delivered to clients by the server during shutdown; ignored if
    /// received inbound on the registry channel.
    ServerClose = 3,
}

impl RegistryCommand {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Register),
            1 => Some(Self::Unregister),
            2 => Some(Self::ClientClose),
            3 => Some(Self::ServerClose),
            _ => None,
        }
    }
}

/// Service selector. The wire representation is the stable small integer
/// per service; unknown values take the failure-marker path on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ServiceId {
    Add = 0,
    Mul = 1,
}

impl ServiceId {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Add),
            1 => Some(Self::Mul),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Argument to a service call. Lives in the shared-memory entry, never on
/// the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct ServiceArg {
    pub x: i32,
    pub y: i32,
}

/// Registration message on the well-known registry channel.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct RegistryRecord {
    pub cmd: u32,
    pub pid: i32,
    /// Client→server request queue name (NUL-terminated).
    pub send_queue_name: [u8; MAX_NAME_LEN],
    /// Server→client response queue name (NUL-terminated).
    pub recv_queue_name: [u8; MAX_NAME_LEN],
    /// Shared-memory object name (NUL-terminated).
    pub shm_name: [u8; MAX_NAME_LEN],
    /// Entry capacity of the segment at registration time.
    pub initial_capacity: u32,
}

/// One computation request on a client's request channel. The argument
/// itself lives in the shared-memory entry named by `entry_idx`.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct RequestRecord {
    /// Client-local monotonic id; [`CONTROL_ID`] marks a resize notification.
    pub request_id: i32,
    pub service: u32,
    pub entry_idx: u32,
    pub pid: i32,
}

/// Completion notice on a client's response channel.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct ResponseRecord {
    /// Echo of the request id; [`CONTROL_ID`] marks a control acknowledgement
    /// with a `CTRL_*` code in `entry_idx`.
    pub request_id: i32,
    pub entry_idx: u32,
}

/// Opaque handle correlating an asynchronous submission with its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestKey {
    pub(crate) id: i32,
    pub(crate) entry_idx: u32,
}

// ---------------------------------------------------------------------------
// Byte-copy codec
// ---------------------------------------------------------------------------

macro_rules! record_bytes {
    ($ty:ty) => {
        impl $ty {
            pub const WIRE_SIZE: usize = size_of::<$ty>();

            /// View the record as the exact bytes placed in a queue message.
            pub fn as_bytes(&self) -> &[u8] {
                unsafe {
                    std::slice::from_raw_parts(self as *const $ty as *const u8, Self::WIRE_SIZE)
                }
            }

            /// Reconstruct a record from a received queue message. Returns
            /// `None` if the message size does not match the record size.
            pub fn from_bytes(buf: &[u8]) -> Option<Self> {
                if buf.len() != Self::WIRE_SIZE {
                    return None;
                }
                let mut rec = std::mem::MaybeUninit::<$ty>::uninit();
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        buf.as_ptr(),
                        rec.as_mut_ptr() as *mut u8,
                        Self::WIRE_SIZE,
                    );
                    Some(rec.assume_init())
                }
            }
        }
    };
}

record_bytes!(RegistryRecord);
record_bytes!(RequestRecord);
record_bytes!(ResponseRecord);

// ---------------------------------------------------------------------------
// Name-field helpers
// ---------------------------------------------------------------------------

/// Copy `src` into a fixed name field, truncating to fit and always
/// NUL-terminating.
pub fn copy_name(dst: &mut [u8; MAX_NAME_LEN], src: &str) {
    let bytes = src.as_bytes();
    let len = bytes.len().min(MAX_NAME_LEN - 1);
    dst[..len].copy_from_slice(&bytes[..len]);
    dst[len] = 0;
}

/// Read a NUL-terminated name field back as a `&str`.
pub fn name_str(field: &[u8; MAX_NAME_LEN]) -> &str {
    let end = field.iter().position(|&b| b == 0).unwrap_or(MAX_NAME_LEN);
    std::str::from_utf8(&field[..end]).unwrap_or("")
}

impl RegistryRecord {
    /// Build a record with the given command and names.
    pub fn new(
        cmd: RegistryCommand,
        pid: i32,
        send_queue: &str,
        recv_queue: &str,
        shm: &str,
        initial_capacity: u32,
    ) -> Self {
        let mut rec: Self = unsafe { std::mem::zeroed() };
        rec.cmd = cmd as u32;
        rec.pid = pid;
        copy_name(&mut rec.send_queue_name, send_queue);
        copy_name(&mut rec.recv_queue_name, recv_queue);
        copy_name(&mut rec.shm_name, shm);
        rec.initial_capacity = initial_capacity;
        rec
    }

    pub fn send_queue_str(&self) -> &str {
        name_str(&self.send_queue_name)
    }

    pub fn recv_queue_str(&self) -> &str {
        name_str(&self.recv_queue_name)
    }

    pub fn shm_str(&self) -> &str {
        name_str(&self.shm_name)
    }
}

impl ResponseRecord {
    /// Control acknowledgement: resize complete, segment switched.
    pub fn resize_done() -> Self {
        Self {
            request_id: CONTROL_ID,
            entry_idx: CTRL_RESIZE_DONE,
        }
    }

    /// Control notice: the server is shutting down.
    pub fn server_close() -> Self {
        Self {
            request_id: CONTROL_ID,
            entry_idx: CTRL_SERVER_CLOSE,
        }
    }
}

impl RequestRecord {
    /// Resize notification: the client has enlarged its segment.
    pub fn resize_notice(pid: i32) -> Self {
        Self {
            request_id: CONTROL_ID,
            service: 0,
            entry_idx: 0,
            pid,
        }
    }
}
