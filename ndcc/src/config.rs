// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Runtime-tunable sizing for the driver table and per-driver queues.
//!
//! Bounds that are wired into fixed-size arrays on the wire or in
//! descriptor layout (label length, hardware address length, segment
//! count) are compile-time constants below rather than `Config` fields,
//! since changing them would change the protocol itself.

/// Maximum length, in bytes, of a driver label such as `"e1000#0"`.
pub const LABEL_MAX: usize = 16;

/// Maximum length, in bytes, of a hardware (link-layer) address.
pub const HW_ADDR_MAX: usize = 16;

/// Maximum number of scatter/gather segments in a single Send or Receive
/// request.
pub const IOV_MAX: usize = 4;

/// Config describes the resource bounds the core is willing to extend to
/// the driver fleet. Use [`Config::builder`] to construct one; defaults
/// match the historical MINIX lwIP network driver core.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    max_drivers: usize,
    min_send_queue: usize,
    min_recv_queue: usize,
    spare_requests: usize,
}

impl Config {
    /// Starts building a `Config`, seeded with the historical defaults.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Upper bound on the number of driver slots the table may grow to.
    pub fn max_drivers(&self) -> usize {
        self.max_drivers
    }

    /// Reserved minimum size of a slot's send queue.
    pub fn min_send_queue(&self) -> usize {
        self.min_send_queue
    }

    /// Hard cap on a slot's receive queue.
    pub fn min_recv_queue(&self) -> usize {
        self.min_recv_queue
    }

    /// Size of the shared spare-descriptor pool available to send queues
    /// beyond their reserved minimum.
    pub fn spare_requests(&self) -> usize {
        self.spare_requests
    }

    /// Total number of request descriptors the core preallocates:
    /// `max_drivers * (min_send_queue + min_recv_queue) + spare_requests`.
    pub fn total_requests(&self) -> usize {
        self.max_drivers * (self.min_send_queue + self.min_recv_queue) + self.spare_requests
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::builder().build()
    }
}

/// Builder for [`Config`]. Consumes and returns `self` at each step so
/// calls can be chained.
#[derive(Clone, Copy, Debug)]
pub struct ConfigBuilder {
    max_drivers: usize,
    min_send_queue: usize,
    min_recv_queue: usize,
    spare_requests: usize,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        ConfigBuilder {
            max_drivers: 8,
            min_send_queue: 2,
            min_recv_queue: 2,
            spare_requests: 8,
        }
    }
}

impl ConfigBuilder {
    /// Sets the upper bound on the number of driver slots.
    pub fn set_max_drivers(mut self, max_drivers: usize) -> Self {
        self.max_drivers = max_drivers;
        self
    }

    /// Sets the reserved minimum send queue depth per slot.
    pub fn set_min_send_queue(mut self, min_send_queue: usize) -> Self {
        self.min_send_queue = min_send_queue;
        self
    }

    /// Sets the hard cap on receive queue depth per slot.
    pub fn set_min_recv_queue(mut self, min_recv_queue: usize) -> Self {
        self.min_recv_queue = min_recv_queue;
        self
    }

    /// Sets the size of the shared spare-descriptor pool.
    pub fn set_spare_requests(mut self, spare_requests: usize) -> Self {
        self.spare_requests = spare_requests;
        self
    }

    /// Builds the `Config`.
    pub fn build(self) -> Config {
        Config {
            max_drivers: self.max_drivers,
            min_send_queue: self.min_send_queue,
            min_recv_queue: self.min_recv_queue,
            spare_requests: self.spare_requests,
        }
    }
}
