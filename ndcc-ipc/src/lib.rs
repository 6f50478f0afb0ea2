// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Defines the primitives that the network driver communication core assumes
//! are provided by the surrounding microkernel environment: endpoint
//! identifiers, memory grants, and an asynchronous, reply-suppressed message
//! send.
//!
//! Nothing in this crate is implemented here. It is the seam between the
//! core (in the `ndcc` crate) and whatever IPC transport a given deployment
//! actually has: a real microkernel send primitive in production, or an
//! in-memory mock in tests.

#![forbid(unsafe_code)]

use std::fmt;

/// Endpoint identifies a driver process to the underlying IPC primitive.
///
/// Endpoints are opaque and have no ordering or arithmetic; they are only
/// ever compared for equality.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Endpoint(pub i32);

/// Direction describes which party may access a grant's backing memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// The remote driver may read the region; the core has already
    /// written it (used by Send requests and the Configure multicast
    /// list).
    ReadOnly,

    /// The remote driver may write the region; the core will read it
    /// once the reply arrives (used by Receive requests).
    WriteOnly,
}

/// Grant is an opaque capability authorizing a remote endpoint to read or
/// write one contiguous region of this process's memory, for the lifetime
/// of the grant.
///
/// `Grant::INVALID` is a sentinel distinct from any value returned by
/// [`GrantSpace::allocate`]; it marks unused slots in a descriptor's grant
/// array and terminates iteration over the valid prefix of that array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Grant(u32);

impl Grant {
    /// INVALID is the sentinel grant value. It is never returned by
    /// [`GrantSpace::allocate`].
    pub const INVALID: Grant = Grant(u32::MAX);

    /// Wraps a raw grant handle. Callers outside this crate should only
    /// ever see values produced by [`GrantSpace::allocate`].
    pub fn from_raw(raw: u32) -> Self {
        Grant(raw)
    }

    /// Returns whether this is the invalid sentinel.
    pub fn is_valid(&self) -> bool {
        *self != Grant::INVALID
    }

    /// Returns the raw handle value, including the sentinel
    /// (`u32::MAX`) if this grant is invalid. Used by the wire protocol
    /// encoder, which needs the bit pattern rather than a formatted
    /// string.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "grant#{}", self.0)
        } else {
            write!(f, "grant#<invalid>")
        }
    }
}

/// GrantError is returned when the grant space cannot satisfy an
/// [`GrantSpace::allocate`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrantError {
    /// The preallocated grant handle space is exhausted.
    Exhausted,
}

/// GrantSpace abstracts the memory-grant capability primitive.
///
/// A real implementation preallocates `capacity` handles at startup (see
/// the `ndcc::Config::iov_max` / pool sizing discussion) to avoid runtime
/// allocation on the data path; revocation must be idempotent-adjacent in
/// the sense that the core never revokes a handle it has not most recently
/// allocated, but implementations are free to assert on a double-revoke to
/// catch core bugs.
pub trait GrantSpace {
    /// Allocates a capability on the contiguous region `[ptr, ptr+len)`
    /// for use by `grantee`, in the given `direction`.
    fn allocate(
        &mut self,
        grantee: Endpoint,
        direction: Direction,
        ptr: usize,
        len: usize,
    ) -> Result<Grant, GrantError>;

    /// Revokes a previously allocated grant. Revoking [`Grant::INVALID`]
    /// is a programmer error in the caller and may panic.
    fn revoke(&mut self, grant: Grant);
}

/// TransportError indicates the async-send primitive itself failed.
///
/// Per the surrounding runtime's contract, this indicates the environment
/// is broken (the microkernel guarantees async-send to a live endpoint
/// succeeds), so callers are expected to treat this as fatal rather than
/// attempt recovery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransportError(pub i32);

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "asynchronous send failed: {}", self.0)
    }
}

impl std::error::Error for TransportError {}

/// Transport abstracts the asynchronous, reply-suppressed message send
/// primitive used to dispatch requests to driver endpoints and, in the
/// status-reply case, back from the core to a driver.
///
/// `message` is an opaque, pre-encoded wire payload; encoding lives in the
/// `ndcc` crate's protocol module, not here, since the wire format is a
/// property of NDCC's own protocol rather than of the IPC substrate.
pub trait Transport {
    /// Sends `message` to `to`, without expecting or awaiting a reply.
    fn send(&mut self, to: Endpoint, message: Vec<u8>) -> Result<(), TransportError>;
}
