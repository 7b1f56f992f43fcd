// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Platform backends. The transport is POSIX message queues + POSIX shared
// memory, so only the unix backend exists.

#[cfg(unix)]
pub mod posix;

#[cfg(unix)]
pub use posix::{PlatformQueue, PlatformShm, QueueMode, ShmMode};
