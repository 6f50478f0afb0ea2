// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! The network driver communication core: multiplexes ethif requests
//! over a fleet of out-of-process network device drivers.
//!
//! This crate mediates between an in-process TCP/IP stack (ethif) and
//! driver processes reachable only through asynchronous message
//! passing. It tracks per-driver lifecycle across restarts, enforces
//! bounded send/receive queues with a shared spare pool, manages
//! zero-copy buffer grants, and demultiplexes replies by endpoint, kind
//! and sequence number.
//!
//! The IPC and grant primitives this crate assumes are defined in the
//! sibling `ndcc-ipc` crate rather than here, so a deployment can swap
//! in whatever its environment actually provides.

mod config;
mod core;
mod discovery;
mod error;
mod ethif;
mod management;
mod protocol;
mod queue;
mod request;
mod slot;
mod table;

pub use config::{Config, ConfigBuilder, HW_ADDR_MAX, IOV_MAX, LABEL_MAX};
pub use core::{Buffer, ConfigureRequest, Core};
pub use discovery::{label_from_key, ChangeEvent, DriverStatus, NamingService};
pub use error::{Error, Result};
pub use ethif::{EthIf, LinkState};
pub use management::{ManagementView, PENDING_ATTRIBUTE_PATH};
pub use protocol::ConfigureSet;
pub use slot::{EthifHandle, Label, SlotState};
