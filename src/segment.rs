// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! POSIX shared-memory segment lifecycle: create, open, unlink.

use std::ffi::CString;
use std::io;

use crate::error::{Result, ShmError};

/// A mapped POSIX shared-memory segment.
///
/// Owns the mapping for its lifetime; `Drop` unmaps but does not unlink the
/// underlying shared-memory object, since other processes may still be
/// attached. Call [`ShmSegment::unlink`] explicitly during an intentional
/// teardown.
pub struct ShmSegment {
    ptr: *mut libc::c_void,
    size: usize,
    name: String,
}

impl ShmSegment {
    /// Validates a POSIX shared-memory object name: must start with `/`,
    /// contain no further `/`, and be non-empty after the leading slash.
    pub fn validate_name(name: &str) -> Result<()> {
        if !name.starts_with('/') || name.len() < 2 || name[1..].contains('/') {
            return Err(ShmError::InvalidParam("shm segment name must be of the form /name"));
        }
        Ok(())
    }

    /// Creates a new shared-memory segment of `size` bytes, or attaches to
    /// an already-existing one of the same name and size.
    ///
    /// Returns `(segment, created)` where `created` is `true` only if this
    /// call performed first-time initialization (i.e. won the race to
    /// create the object with `O_EXCL`).
    pub fn create_or_open(name: &str, size: usize) -> Result<(Self, bool)> {
        Self::validate_name(name)?;
        if size == 0 {
            return Err(ShmError::InvalidParam("shm segment size must be nonzero"));
        }
        let c_name = CString::new(name).map_err(|_| ShmError::InvalidParam("shm name contains NUL"))?;

        let mut created = true;
        let mut fd = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                0o666,
            )
        };
        if fd < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::AlreadyExists {
                return Err(ShmError::Init(format!("shm_open(O_CREAT|O_EXCL) failed: {err}")));
            }
            created = false;
            fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0o666) };
            if fd < 0 {
                return Err(ShmError::Init(format!(
                    "shm_open(existing) failed: {}",
                    io::Error::last_os_error()
                )));
            }
        }

        if created {
            // SAFETY: fd is a valid, just-opened file descriptor.
            let rc = unsafe { libc::ftruncate(fd, size as libc::off_t) };
            if rc != 0 {
                let err = io::Error::last_os_error();
                unsafe { libc::close(fd) };
                return Err(ShmError::Init(format!("ftruncate failed: {err}")));
            }
            log::debug!("created shm segment {name} ({size} bytes)");
        } else {
            log::debug!("attached to existing shm segment {name}");
        }

        // SAFETY: fd refers to a shared-memory object sized to at least
        // `size` bytes (either just truncated, or created by a prior
        // initializer that truncated it identically).
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };

        if ptr == libc::MAP_FAILED {
            return Err(ShmError::Init(format!("mmap failed: {}", io::Error::last_os_error())));
        }

        Ok((
            ShmSegment {
                ptr,
                size,
                name: name.to_string(),
            },
            created,
        ))
    }

    /// Unlinks the segment's name from the filesystem namespace.
    ///
    /// Existing mappings (including this one, until dropped) remain valid;
    /// no new process can `shm_open` the name afterwards.
    pub fn unlink(name: &str) -> Result<()> {
        Self::validate_name(name)?;
        let c_name = CString::new(name).map_err(|_| ShmError::InvalidParam("shm name contains NUL"))?;
        let rc = unsafe { libc::shm_unlink(c_name.as_ptr()) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::NotFound {
                return Err(ShmError::Init(format!("shm_unlink failed: {err}")));
            }
        }
        Ok(())
    }

    pub fn as_ptr(&self) -> *mut libc::c_void {
        self.ptr
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ShmSegment {
    fn drop(&mut self) {
        // SAFETY: `self.ptr`/`self.size` describe the mapping created in
        // `create_or_open` and have not been altered since.
        unsafe {
            libc::munmap(self.ptr, self.size);
        }
    }
}
