// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Multi-client local compute service over POSIX message queues and shared
// memory. A long-lived server process accepts registrations from client
// processes, runs short computational services in a bounded worker pool, and
// publishes results through a per-client shared-memory segment.

pub mod shm_name;

mod platform;

mod spin_lock;
pub use spin_lock::SpinLock;

mod shm;
pub use shm::SegmentHandle;

mod queue;
pub use queue::MessageQueue;

pub mod wire;
pub use wire::{RegistryCommand, RequestKey, ServiceArg, ServiceId};

mod entry;
pub use entry::{EntryRef, SharedEntry, ENTRY_SIZE};

mod error;
pub use error::{Error, Result};

pub mod server;
pub use server::{ComputeServer, ServerConfig};

mod client;
pub use client::{ClientConfig, ComputeClient};
