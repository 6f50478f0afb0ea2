// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! A single driver's record: endpoint, label, queue pair, and the
//! upper-layer handle once it exists.
//!
//! A slot's state (Initializing vs Active) is never stored directly; it
//! is derived from `send_queue.max()`, per the design note that a
//! slot's own fields are the only source of truth.

use std::fmt;

use ndcc_ipc::Endpoint;

use crate::config::LABEL_MAX;
use crate::queue::Queue;

/// A short ASCII driver name, at most `LABEL_MAX` bytes, never containing
/// an interior NUL.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label {
    bytes: [u8; LABEL_MAX],
    len: u8,
}

impl Label {
    /// Builds a label from a byte slice. Returns `None` if `raw` is
    /// empty or longer than `LABEL_MAX`.
    pub fn new(raw: &[u8]) -> Option<Label> {
        if raw.is_empty() || raw.len() > LABEL_MAX {
            return None;
        }
        let mut bytes = [0u8; LABEL_MAX];
        bytes[..raw.len()].copy_from_slice(raw);
        Some(Label { bytes, len: raw.len() as u8 })
    }

    /// The label's bytes, excluding any trailing padding.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Label({:?})", String::from_utf8_lossy(self.as_bytes()))
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.as_bytes()))
    }
}

/// Opaque handle to an upper-layer (ethif) interface instance.
///
/// Wraps the owning slot's table index, so the upper layer can hand it
/// straight back to the core without the core needing a reverse lookup
/// or a back-pointer graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EthifHandle(pub usize);

/// The three states a slot can be in. Never stored; always computed
/// from the slot's own fields via [`Slot::state`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    Initializing,
    Active,
}

/// A live driver record. A vacant slot is simply absent from the
/// driver table (see `table.rs`), not represented by this type.
#[derive(Debug)]
pub struct Slot {
    pub endpoint: Endpoint,
    pub label: Label,
    pub ethif_handle: Option<EthifHandle>,
    pub send_queue: Queue,
    pub recv_queue: Queue,
}

impl Slot {
    /// Births a brand-new slot at table index `index`, seeding both
    /// queue heads with the per-slot sequence spread so that misdelivery
    /// across slots cannot plausibly collide.
    pub fn birth(index: usize, label: Label, endpoint: Endpoint) -> Slot {
        let seed = (index as u32) << 24;
        Slot {
            endpoint,
            label,
            ethif_handle: None,
            send_queue: Queue::new(seed),
            recv_queue: Queue::new(seed),
        }
    }

    /// The slot's derived state: Active iff the send queue has been
    /// given a nonzero cap by a successful Init reply.
    pub fn state(&self) -> SlotState {
        if self.send_queue.max() > 0 {
            SlotState::Active
        } else {
            SlotState::Initializing
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == SlotState::Active
    }

    pub fn is_initializing(&self) -> bool {
        self.state() == SlotState::Initializing
    }
}
