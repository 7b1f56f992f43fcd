// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named, resizable shared-memory segment.
// Delegates to platform::PlatformShm.

use std::io;

use crate::platform::{PlatformShm, ShmMode};

/// A named, inter-process shared memory segment.
///
/// A client creates its segment with [`create`](Self::create) and owns the
/// name; the server maps the same object with [`open`](Self::open). Segments
/// grow (never shrink) over a client's lifetime: the creator enlarges with
/// [`grow`](Self::grow), peers pick up the new size by re-opening.
pub struct SegmentHandle {
    inner: PlatformShm,
}

impl SegmentHandle {
    /// Create a named segment of exactly `size` bytes. Fails if the name is
    /// already taken. Fresh pages are zero-filled by the kernel.
    pub fn create(name: &str, size: usize) -> io::Result<Self> {
        let inner = PlatformShm::acquire(name, size, ShmMode::Create)?;
        Ok(Self { inner })
    }

    /// Map an existing named segment; the mapped length is the object's
    /// current size.
    pub fn open(name: &str) -> io::Result<Self> {
        let inner = PlatformShm::acquire(name, 0, ShmMode::Open)?;
        Ok(Self { inner })
    }

    /// Enlarge the backing object and remap. The previous contents are
    /// preserved; the new tail is zero-filled. Creator only.
    pub fn grow(&mut self, new_size: usize) -> io::Result<()> {
        self.inner.grow(new_size)
    }

    /// Pointer to the start of the mapped region.
    pub fn as_ptr(&self) -> *const u8 {
        self.inner.as_ptr()
    }

    /// Mutable pointer to the start of the mapped region.
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.inner.as_mut_ptr()
    }

    /// Mapped size in bytes.
    pub fn size(&self) -> usize {
        self.inner.size()
    }

    /// The platform name used to open the segment.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Remove the backing object. Live mappings stay valid until unmapped.
    pub fn unlink(&self) {
        self.inner.unlink();
    }

    /// Remove a named segment without needing an open handle.
    pub fn unlink_by_name(name: &str) {
        PlatformShm::unlink_by_name(name);
    }
}
