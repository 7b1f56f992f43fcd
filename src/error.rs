// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Client-facing error codes. The internals work in `std::io::Result`; the
// public API narrows everything to these five coarse kinds.

use std::fmt;
use std::io;

/// Result alias for the public client API.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error codes surfaced by the client API.
#[derive(Debug)]
pub enum Error {
    /// Attach-time failure: registry unreachable or local IPC objects could
    /// not be created.
    Init(io::Error),
    /// Unrecoverable session state: the request was marked failed by the
    /// server, or the server shut down underneath the session.
    Fatal(&'static str),
    /// Receive failure on the response channel.
    Recv(io::Error),
    /// Send failure on the request or registry channel.
    Send(io::Error),
    /// Shared-memory segment creation or resize failure.
    Shm(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Init(e) => write!(f, "init error: {e}"),
            Error::Fatal(msg) => write!(f, "fatal error: {msg}"),
            Error::Recv(e) => write!(f, "receive error: {e}"),
            Error::Send(e) => write!(f, "send error: {e}"),
            Error::Shm(e) => write!(f, "shared memory error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Init(e) | Error::Recv(e) | Error::Send(e) | Error::Shm(e) => Some(e),
            Error::Fatal(_) => None,
        }
    }
}
