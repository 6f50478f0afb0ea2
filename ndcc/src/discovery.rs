// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! The discovery adapter: turns naming-service events into slot
//! state-machine transitions.
//!
//! The naming service itself is an external collaborator (see the
//! out-of-scope list in the crate's design notes); this module only defines the narrow interface
//! the core needs from it, and the bookkeeping to translate its events
//! into up/down calls. The actual transition logic lives on
//! [`crate::core::Core`], since it needs mutable access to the driver
//! table, request pool and transport together.

use ndcc_ipc::Endpoint;

use crate::slot::Label;

const DISCOVERY_PREFIX: &str = "drv.net.";

/// The status a naming-service entry can report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverStatus {
    Up,
    Down,
    Other,
}

/// One status-change entry as returned by [`NamingService::poll_changes`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeEvent {
    pub key: String,
    pub endpoint: Option<Endpoint>,
    pub status: DriverStatus,
}

/// The two primitives the discovery adapter needs from an external
/// naming service.
pub trait NamingService {
    /// Drains and returns every status change observed since the last
    /// call.
    fn poll_changes(&mut self) -> Vec<ChangeEvent>;

    /// Looks up the endpoint currently registered for `label`, if any.
    fn lookup_by_label(&self, label: &Label) -> Option<Endpoint>;
}

/// Extracts and validates a driver label from a naming-service key,
/// iff it carries the `drv.net.` prefix this core cares about.
///
/// Rejects keys whose suffix is empty or longer than `LABEL_MAX`, the
/// same bound enforced by [`Label::new`].
pub fn label_from_key(key: &str) -> Option<Label> {
    let suffix = key.strip_prefix(DISCOVERY_PREFIX)?;
    Label::new(suffix.as_bytes())
}
