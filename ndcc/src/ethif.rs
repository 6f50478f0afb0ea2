// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! The upper-layer (ethif) interface: the calls the core makes upward,
//! and the calls ethif makes down into the core.
//!
//! This module only defines the upward trait; the downward calls
//! (`conf`, `send`, `can_recv`, `recv`) are inherent methods on
//! [`crate::core::Core`] since they are the core's own public API.

use crate::slot::EthifHandle;

/// Link state as reported by a driver's Status message or Init reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Down,
    Up,
}

/// The calls the core makes upward into the TCP/IP stack.
///
/// A real implementation adapts these onto smoltcp (or an equivalent)
/// interface lifecycle; tests substitute a small recording mock.
pub trait EthIf {
    /// Registers a brand-new interface. `name` is only ever `Some` the
    /// first time a given slot succeeds at Init; restarts of an
    /// already-registered interface go straight to `enable`.
    fn add(&mut self, slot_id: usize, name: &str, caps: u32) -> Option<EthifHandle>;

    /// Enables (or re-enables, across a restart) a registered
    /// interface. `name` is `None` on restart, `Some` the first time.
    fn enable(
        &mut self,
        handle: EthifHandle,
        name: Option<&str>,
        hw_addr: &[u8],
        caps: u32,
        link: LinkState,
        media: u32,
    ) -> bool;

    /// Disables an interface, e.g. because its driver is restarting.
    fn disable(&mut self, handle: EthifHandle);

    /// Permanently removes an interface, e.g. because its driver is
    /// gone for good.
    fn remove(&mut self, handle: EthifHandle);

    /// Reports the result of a prior `conf` call.
    fn configured(&mut self, handle: EthifHandle, result: i32);

    /// Reports the result of a prior `send` call.
    fn sent(&mut self, handle: EthifHandle, result: i32);

    /// Reports the result of a prior `recv` call.
    fn received(&mut self, handle: EthifHandle, result: i32);

    /// Reports an unsolicited status update from the driver.
    fn status(
        &mut self,
        handle: EthifHandle,
        link: LinkState,
        media: u32,
        oerror: u32,
        coll: u32,
        ierror: u32,
        iqdrop: u32,
    );
}
