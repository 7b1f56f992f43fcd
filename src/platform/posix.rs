// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// POSIX implementation of the shared-memory segment and message-queue
// primitives: shm_open/ftruncate/mmap on the memory side, mq_open/mq_send/
// mq_timedreceive on the queue side.

use std::ffi::CString;
use std::io;
use std::ptr;

use crate::shm_name;

fn c_name(name: &str) -> io::Result<CString> {
    CString::new(shm_name::make_ipc_name(name).into_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

/// Absolute CLOCK_REALTIME deadline `timeout_ms` from now, normalised.
fn deadline_from_now(timeout_ms: u64) -> libc::timespec {
    let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
    unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts) };
    let ns_total = ts.tv_nsec as u64 + (timeout_ms % 1000) * 1_000_000;
    ts.tv_sec += (timeout_ms / 1000) as libc::time_t + (ns_total / 1_000_000_000) as libc::time_t;
    ts.tv_nsec = (ns_total % 1_000_000_000) as libc::c_long;
    ts
}

// ---------------------------------------------------------------------------
// PlatformShm — POSIX shared memory
// ---------------------------------------------------------------------------

/// Open mode for shared memory segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmMode {
    /// Create exclusively with the given size — fail if already exists.
    Create,
    /// Open existing — size is taken from the object, fail if missing.
    Open,
}

pub struct PlatformShm {
    mem: *mut u8,
    size: usize,
    name: String, // POSIX name (with leading '/')
}

// Safety: the shared memory region is process-shared by design.
unsafe impl Send for PlatformShm {}
unsafe impl Sync for PlatformShm {}

impl PlatformShm {
    /// Acquire a named shared memory region.
    ///
    /// With [`ShmMode::Create`] the object is created exclusively and sized
    /// to `size` bytes. With [`ShmMode::Open`] an existing object is opened
    /// and `size` is ignored — the mapped length comes from `fstat`.
    pub fn acquire(name: &str, size: usize, mode: ShmMode) -> io::Result<Self> {
        if name.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "name is empty"));
        }
        if mode == ShmMode::Create && size == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "size is 0"));
        }

        let posix_name = shm_name::make_ipc_name(name);
        let c_name = CString::new(posix_name.as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let perms: libc::mode_t = 0o666;

        let (fd, map_size) = match mode {
            ShmMode::Create => {
                let f = unsafe {
                    libc::shm_open(
                        c_name.as_ptr(),
                        libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
                        perms as libc::c_uint,
                    )
                };
                if f == -1 {
                    return Err(io::Error::last_os_error());
                }
                unsafe { libc::fchmod(f, perms) };
                let ret = unsafe { libc::ftruncate(f, size as libc::off_t) };
                if ret != 0 {
                    let err = io::Error::last_os_error();
                    unsafe { libc::close(f) };
                    return Err(err);
                }
                (f, size)
            }
            ShmMode::Open => {
                let f =
                    unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, perms as libc::c_uint) };
                if f == -1 {
                    return Err(io::Error::last_os_error());
                }
                let mut st: libc::stat = unsafe { std::mem::zeroed() };
                if unsafe { libc::fstat(f, &mut st) } != 0 {
                    let err = io::Error::last_os_error();
                    unsafe { libc::close(f) };
                    return Err(err);
                }
                (f, st.st_size as usize)
            }
        };

        Self::mmap_and_finish(fd, map_size, posix_name)
    }

    fn mmap_and_finish(fd: i32, size: usize, posix_name: String) -> io::Result<Self> {
        let mem = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };

        if mem == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            mem: mem as *mut u8,
            size,
            name: posix_name,
        })
    }

    /// Enlarge the backing object to `new_size` bytes and remap.
    ///
    /// The old mapping is released; existing contents are preserved by the
    /// kernel (`ftruncate` extension zero-fills the new tail). Only the
    /// segment's creator calls this; other processes re-open by name to see
    /// the new size.
    pub fn grow(&mut self, new_size: usize) -> io::Result<()> {
        if new_size <= self.size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "segments never shrink",
            ));
        }

        let c_name = CString::new(self.name.as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let perms: libc::mode_t = 0o666;

        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, perms as libc::c_uint) };
        if fd == -1 {
            return Err(io::Error::last_os_error());
        }
        if unsafe { libc::ftruncate(fd, new_size as libc::off_t) } != 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }

        let mem = unsafe {
            libc::mmap(
                ptr::null_mut(),
                new_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };
        if mem == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        unsafe { libc::munmap(self.mem as *mut libc::c_void, self.size) };
        self.mem = mem as *mut u8;
        self.size = new_size;
        Ok(())
    }

    /// Pointer to the start of the mapped region.
    pub fn as_ptr(&self) -> *const u8 {
        self.mem
    }

    /// Mutable pointer to the start of the mapped region.
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.mem
    }

    /// Mapped size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// POSIX name (with leading '/').
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Force-remove the backing object (shm_unlink). Does NOT release the
    /// mapping; live mappings in other processes stay valid.
    pub fn unlink(&self) {
        if let Ok(c_name) = CString::new(self.name.as_bytes()) {
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
        }
    }

    /// Unlink a named shm segment by name (static helper).
    pub fn unlink_by_name(name: &str) {
        if let Ok(c_name) = c_name(name) {
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
        }
    }
}

impl Drop for PlatformShm {
    fn drop(&mut self) {
        if self.mem.is_null() {
            return;
        }
        // Unlinking is explicit (the segment's creator decides); dropping a
        // handle only releases this process's mapping.
        unsafe { libc::munmap(self.mem as *mut libc::c_void, self.size) };
    }
}

// ---------------------------------------------------------------------------
// PlatformQueue — POSIX message queue
// ---------------------------------------------------------------------------

/// Open mode for message queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    /// Create exclusively with fixed message size and depth.
    Create,
    /// Open existing — message size is read back via `mq_getattr`.
    Open,
}

pub struct PlatformQueue {
    mqd: libc::mqd_t,
    msg_size: usize,
    name: String,
}

// Safety: an mqd_t may be used from multiple threads; mq_send/mq_receive are
// atomic per message.
unsafe impl Send for PlatformQueue {}
unsafe impl Sync for PlatformQueue {}

impl PlatformQueue {
    /// Open a named message queue.
    ///
    /// With [`QueueMode::Create`] the queue is created exclusively with
    /// exactly `msg_size`-byte messages and `depth` slots (must be ≤ 10 for
    /// unprivileged processes). With [`QueueMode::Open`] the attributes come
    /// from the existing queue.
    pub fn open(name: &str, msg_size: usize, depth: usize, mode: QueueMode) -> io::Result<Self> {
        if name.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "name is empty"));
        }

        let posix_name = shm_name::make_ipc_name(name);
        let c_name = CString::new(posix_name.as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let perms: libc::mode_t = 0o666;

        let (mqd, msg_size) = match mode {
            QueueMode::Create => {
                let mut attr: libc::mq_attr = unsafe { std::mem::zeroed() };
                attr.mq_maxmsg = depth as libc::c_long;
                attr.mq_msgsize = msg_size as libc::c_long;

                let q = unsafe {
                    libc::mq_open(
                        c_name.as_ptr(),
                        libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
                        perms as libc::c_uint,
                        &mut attr as *mut libc::mq_attr,
                    )
                };
                if q == -1 {
                    return Err(io::Error::last_os_error());
                }
                (q, msg_size)
            }
            QueueMode::Open => {
                let q = unsafe { libc::mq_open(c_name.as_ptr(), libc::O_RDWR) };
                if q == -1 {
                    return Err(io::Error::last_os_error());
                }
                let mut attr: libc::mq_attr = unsafe { std::mem::zeroed() };
                if unsafe { libc::mq_getattr(q, &mut attr) } != 0 {
                    let err = io::Error::last_os_error();
                    unsafe { libc::mq_close(q) };
                    return Err(err);
                }
                (q, attr.mq_msgsize as usize)
            }
        };

        Ok(Self {
            mqd,
            msg_size,
            name: posix_name,
        })
    }

    /// Message size fixed at queue creation.
    pub fn msg_size(&self) -> usize {
        self.msg_size
    }

    /// POSIX name (with leading '/').
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send one message (blocking if the queue is full). Retries on EINTR.
    pub fn send(&self, data: &[u8], prio: u32) -> io::Result<()> {
        loop {
            let ret = unsafe {
                libc::mq_send(
                    self.mqd,
                    data.as_ptr() as *const libc::c_char,
                    data.len(),
                    prio,
                )
            };
            if ret == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(err);
        }
    }

    /// Send one message, giving up after `timeout_ms`. Returns `Ok(false)`
    /// on timeout. Retries on EINTR.
    pub fn send_timeout(&self, data: &[u8], prio: u32, timeout_ms: u64) -> io::Result<bool> {
        let ts = deadline_from_now(timeout_ms);
        loop {
            let ret = unsafe {
                libc::mq_timedsend(
                    self.mqd,
                    data.as_ptr() as *const libc::c_char,
                    data.len(),
                    prio,
                    &ts,
                )
            };
            if ret == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::ETIMEDOUT) => return Ok(false),
                Some(libc::EINTR) => continue,
                _ => return Err(err),
            }
        }
    }

    /// Receive one message with an absolute-deadline timeout of `timeout_ms`
    /// from now. Returns `Ok(None)` on timeout. `buf` must be at least
    /// [`msg_size`](Self::msg_size) bytes (mq_receive rejects shorter buffers).
    pub fn recv_timeout(&self, buf: &mut [u8], timeout_ms: u64) -> io::Result<Option<usize>> {
        let ts = deadline_from_now(timeout_ms);
        loop {
            let received = unsafe {
                libc::mq_timedreceive(
                    self.mqd,
                    buf.as_mut_ptr() as *mut libc::c_char,
                    buf.len(),
                    ptr::null_mut(),
                    &ts,
                )
            };
            if received >= 0 {
                return Ok(Some(received as usize));
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::ETIMEDOUT) => return Ok(None),
                Some(libc::EINTR) => continue,
                _ => return Err(err),
            }
        }
    }

    /// Force-remove the queue name. Open descriptors stay usable until closed.
    pub fn unlink(&self) {
        if let Ok(c_name) = CString::new(self.name.as_bytes()) {
            unsafe { libc::mq_unlink(c_name.as_ptr()) };
        }
    }

    /// Unlink a named queue by name (static helper).
    pub fn unlink_by_name(name: &str) {
        if let Ok(c_name) = c_name(name) {
            unsafe { libc::mq_unlink(c_name.as_ptr()) };
        }
    }
}

impl Drop for PlatformQueue {
    fn drop(&mut self) {
        unsafe { libc::mq_close(self.mqd) };
    }
}
