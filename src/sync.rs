// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-shared mutex and condition variable wrappers.
//!
//! `std::sync::Mutex` is backed by a futex on Linux but makes no guarantee
//! that it can live inside memory shared across independent `mmap`s in
//! different processes. These wrappers embed raw `libc::pthread_mutex_t` /
//! `libc::pthread_cond_t` values directly and initialize them with the
//! `PTHREAD_PROCESS_SHARED` attribute, the same approach
//! `can_shm_init` takes in the original reference implementation.

use std::time::Duration;

use crate::error::{Result, ShmError};

/// A `pthread_mutex_t` meant to live inside a shared-memory region.
///
/// # SAFETY
/// This type is `Send + Sync` because the memory it wraps is, by
/// construction, mapped at the same address range (or an equivalent one) in
/// every process that touches it, and `pthread_mutex_t` is designed to be
/// operated on concurrently from multiple threads/processes. Callers must
/// only construct one via [`RawMutex::init_in_place`] on memory that will
/// outlive every attached process, and must never move the value once
/// initialized.
#[repr(transparent)]
pub struct RawMutex(libc::pthread_mutex_t);

unsafe impl Send for RawMutex {}
unsafe impl Sync for RawMutex {}

impl RawMutex {
    /// Initializes a process-shared mutex in place.
    ///
    /// Must be called exactly once per mutex, by the process that created
    /// the region, before any other process attaches to it.
    ///
    /// # Safety
    /// `ptr` must point to valid, writable memory at least
    /// `size_of::<RawMutex>()` bytes wide, held alive for as long as any
    /// process may reference it.
    pub unsafe fn init_in_place(ptr: *mut RawMutex) -> Result<()> {
        let mut attr: libc::pthread_mutexattr_t = std::mem::zeroed();
        let rc = libc::pthread_mutexattr_init(&mut attr);
        if rc != 0 {
            return Err(ShmError::MutexFailed(rc));
        }
        let rc = libc::pthread_mutexattr_setpshared(&mut attr, libc::PTHREAD_PROCESS_SHARED);
        if rc != 0 {
            libc::pthread_mutexattr_destroy(&mut attr);
            return Err(ShmError::MutexFailed(rc));
        }
        let rc = libc::pthread_mutex_init(std::ptr::addr_of_mut!((*ptr).0), &attr);
        libc::pthread_mutexattr_destroy(&mut attr);
        if rc != 0 {
            return Err(ShmError::MutexFailed(rc));
        }
        Ok(())
    }

    pub fn lock(&self) -> Result<MutexGuard<'_>> {
        let rc = unsafe { libc::pthread_mutex_lock(self.raw()) };
        if rc != 0 {
            return Err(ShmError::MutexFailed(rc));
        }
        Ok(MutexGuard { mutex: self })
    }

    fn raw(&self) -> *mut libc::pthread_mutex_t {
        &self.0 as *const _ as *mut _
    }
}

/// RAII guard releasing a [`RawMutex`] on drop.
pub struct MutexGuard<'a> {
    mutex: &'a RawMutex,
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_mutex_unlock(self.mutex.raw());
        }
    }
}

/// A `pthread_cond_t` meant to live inside a shared-memory region.
///
/// # SAFETY
/// Same rationale as [`RawMutex`]: constructed once in place, never moved,
/// and `CLOCK_MONOTONIC` is selected at init time so that timed waits are
/// immune to wall-clock adjustments across processes.
#[repr(transparent)]
pub struct RawCondvar(libc::pthread_cond_t);

unsafe impl Send for RawCondvar {}
unsafe impl Sync for RawCondvar {}

impl RawCondvar {
    /// # Safety
    /// Same contract as [`RawMutex::init_in_place`].
    pub unsafe fn init_in_place(ptr: *mut RawCondvar) -> Result<()> {
        let mut attr: libc::pthread_condattr_t = std::mem::zeroed();
        let rc = libc::pthread_condattr_init(&mut attr);
        if rc != 0 {
            return Err(ShmError::MutexFailed(rc));
        }
        let rc = libc::pthread_condattr_setpshared(&mut attr, libc::PTHREAD_PROCESS_SHARED);
        if rc != 0 {
            libc::pthread_condattr_destroy(&mut attr);
            return Err(ShmError::MutexFailed(rc));
        }
        #[cfg(target_os = "linux")]
        {
            let rc = libc::pthread_condattr_setclock(&mut attr, libc::CLOCK_MONOTONIC);
            if rc != 0 {
                libc::pthread_condattr_destroy(&mut attr);
                return Err(ShmError::MutexFailed(rc));
            }
        }
        let rc = libc::pthread_cond_init(std::ptr::addr_of_mut!((*ptr).0), &attr);
        libc::pthread_condattr_destroy(&mut attr);
        if rc != 0 {
            return Err(ShmError::MutexFailed(rc));
        }
        Ok(())
    }

    /// Blocks on `guard`'s mutex until notified or `timeout` elapses.
    ///
    /// `timeout = None` waits indefinitely. Returns `Ok(true)` if notified,
    /// `Ok(false)` on timeout.
    pub fn wait_timeout(&self, guard: &MutexGuard<'_>, timeout: Option<Duration>) -> Result<bool> {
        let mutex_ptr = guard.mutex.raw();
        let cond_ptr = &self.0 as *const _ as *mut libc::pthread_cond_t;

        let rc = match timeout {
            None => unsafe { libc::pthread_cond_wait(cond_ptr, mutex_ptr) },
            Some(dur) => {
                let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
                #[cfg(target_os = "linux")]
                unsafe {
                    libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
                }
                #[cfg(not(target_os = "linux"))]
                unsafe {
                    libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts);
                }
                let mut secs = ts.tv_sec + dur.as_secs() as i64;
                let mut nsecs = ts.tv_nsec + dur.subsec_nanos() as i64;
                if nsecs >= 1_000_000_000 {
                    secs += 1;
                    nsecs -= 1_000_000_000;
                }
                ts.tv_sec = secs;
                ts.tv_nsec = nsecs;
                unsafe { libc::pthread_cond_timedwait(cond_ptr, mutex_ptr, &ts) }
            }
        };

        match rc {
            0 => Ok(true),
            libc::ETIMEDOUT => Ok(false),
            other => Err(ShmError::MutexFailed(other)),
        }
    }

    pub fn notify_all(&self) -> Result<()> {
        let rc = unsafe {
            libc::pthread_cond_broadcast(&self.0 as *const _ as *mut libc::pthread_cond_t)
        };
        if rc != 0 {
            return Err(ShmError::MutexFailed(rc));
        }
        Ok(())
    }
}
