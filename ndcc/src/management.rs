// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! The single read-only management attribute this core exposes.
//!
//! Full MIB tree registration is out of scope; this is just enough of
//! a typed surface for a host process to mount `pending` under
//! whatever management namespace it uses, without the core depending on
//! any particular registry implementation.

/// The path under which the initializing-driver counter is published.
pub const PENDING_ATTRIBUTE_PATH: &str = "minix.lwip.drivers.pending";

/// A read-only view of the management-visible attribute set.
///
/// Borrows from [`crate::core::Core`] rather than owning a copy, since
/// `pending` changes on every slot transition and a snapshot would go
/// stale immediately.
#[derive(Clone, Copy, Debug)]
pub struct ManagementView {
    pending: usize,
}

impl ManagementView {
    pub(crate) fn new(pending: usize) -> Self {
        ManagementView { pending }
    }

    /// The number of driver slots currently in the Initializing state.
    pub fn pending(&self) -> usize {
        self.pending
    }
}
