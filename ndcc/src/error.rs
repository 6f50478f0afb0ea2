// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! The error type returned across the request-submission boundary.

use std::fmt;

/// The set of errors that can occur when submitting a request to a driver.
///
/// Neither variant is exceptional: both are expected outcomes of normal
/// backpressure and are meant to be handled by the caller, typically by
/// retrying once a completion callback fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// Admission was denied by the queue's hard cap or by spare-pool
    /// exhaustion. The caller should retry later, e.g. on the next
    /// completion callback for this slot.
    Busy,

    /// Grant allocation failed partway through building a multi-segment
    /// request. Any partial grants have already been revoked and the
    /// request was not sent.
    OutOfMemory,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Busy => write!(f, "driver queue has no room for this request"),
            Error::OutOfMemory => write!(f, "failed to allocate a memory grant for this request"),
        }
    }
}

impl std::error::Error for Error {}

/// Result alias for the request-submission boundary.
pub type Result<T> = std::result::Result<T, Error>;
