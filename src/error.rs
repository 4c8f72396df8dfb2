// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error taxonomy for the CAN shared-memory store.

use std::fmt;
use std::io;

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, ShmError>;

/// Errors returned by store operations.
///
/// Variants map to the stable integer codes documented on [`ShmError::code`];
/// callers that need to interoperate with the original C error codes
/// (`CANShmResult`) should use that method rather than matching on variants,
/// since variant names may grow over time.
#[derive(Debug)]
pub enum ShmError {
    /// A CAN identifier was outside the valid 29-bit range.
    InvalidId(u32),
    /// No record exists for the requested identifier.
    NotFound,
    /// A blocking wait exceeded its deadline.
    Timeout,
    /// An argument was structurally invalid (bad DLC, zero-sized region, etc).
    InvalidParam(&'static str),
    /// Region creation or attachment failed.
    Init(String),
    /// A `pthread_mutex_*`/`pthread_cond_*` call returned a nonzero errno.
    MutexFailed(i32),
    /// The bucket table is full and linear probing could not find a slot.
    ///
    /// The original C implementation returned `NOT_FOUND` here; this is the
    /// distinct code called for by keeping set/insert failures
    /// distinguishable from genuine lookup misses.
    TableFull,
    /// A seqlock read exceeded its bounded retry budget.
    Busy,
    /// The mapped region's magic number or fixed layout fields did not match.
    Corruption(&'static str),
}

impl ShmError {
    /// Stable integer code, matching `CANShmResult` in the original
    /// reference implementation plus one addition (`TABLE_FULL`).
    pub fn code(&self) -> i32 {
        match self {
            ShmError::InvalidId(_) => -1,
            ShmError::NotFound => -2,
            ShmError::Timeout => -3,
            ShmError::InvalidParam(_) => -4,
            ShmError::Init(_) => -5,
            ShmError::MutexFailed(_) => -6,
            ShmError::TableFull => -7,
            ShmError::Busy => -8,
            ShmError::Corruption(_) => -9,
        }
    }
}

impl fmt::Display for ShmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShmError::InvalidId(id) => write!(f, "invalid CAN identifier: 0x{id:X}"),
            ShmError::NotFound => write!(f, "no record for requested CAN identifier"),
            ShmError::Timeout => write!(f, "operation timed out"),
            ShmError::InvalidParam(what) => write!(f, "invalid parameter: {what}"),
            ShmError::Init(msg) => write!(f, "region initialization failed: {msg}"),
            ShmError::MutexFailed(errno) => write!(f, "pthread sync primitive failed, errno {errno}"),
            ShmError::TableFull => write!(f, "bucket table is full, no slot available"),
            ShmError::Busy => write!(f, "seqlock read exceeded retry budget"),
            ShmError::Corruption(what) => write!(f, "region corruption detected: {what}"),
        }
    }
}

impl std::error::Error for ShmError {}

impl From<io::Error> for ShmError {
    fn from(e: io::Error) -> Self {
        ShmError::Init(e.to_string())
    }
}
