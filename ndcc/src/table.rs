// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! The fixed-capacity driver table: an array of optional slots plus a
//! high-water mark, the smallest index past which every slot is vacant.
//!
//! A driver slot is addressed by its numeric index; the upper-layer
//! handle stores this index directly rather than a pointer, so the
//! table never needs a reverse lookup.

use ndcc_ipc::Endpoint;

use crate::slot::{Label, Slot};

/// The driver table and the process-wide initializing-driver counter.
pub struct Table {
    slots: Vec<Option<Slot>>,
    high_water: usize,
    pending: usize,
    table_exhausted: bool,
}

impl Table {
    /// Builds an empty table with room for `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Table { slots, high_water: 0, pending: 0, table_exhausted: false }
    }

    /// Fixed capacity (`NR_NDEV`).
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots currently in the Initializing sub-state.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Whether the table is (or, more precisely, was at last check)
    /// saturated. Exposed for tests; logging happens at the call site
    /// in `discovery.rs`.
    pub fn is_exhausted(&self) -> bool {
        self.table_exhausted
    }

    pub fn get(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Slot> {
        self.slots.get_mut(index).and_then(|s| s.as_mut())
    }

    /// Linear scan for the slot whose endpoint matches, over the live
    /// prefix `0..high_water`.
    pub fn find_by_endpoint(&self, endpoint: Endpoint) -> Option<usize> {
        self.slots[..self.high_water]
            .iter()
            .position(|slot| matches!(slot, Some(s) if s.endpoint == endpoint))
    }

    /// Linear scan for the slot whose label matches, over the live
    /// prefix `0..high_water`.
    pub fn find_by_label(&self, label: &Label) -> Option<usize> {
        self.slots[..self.high_water]
            .iter()
            .position(|slot| matches!(slot, Some(s) if &s.label == label))
    }

    /// Iterates every currently-live (non-vacant) slot, with its index.
    pub fn iter_live(&self) -> impl Iterator<Item = (usize, &Slot)> {
        self.slots[..self.high_water]
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|slot| (i, slot)))
    }

    /// Finds the first vacant index within the live prefix, or grows
    /// `high_water` by one if there is capacity remaining.
    ///
    /// Returns `None`, and marks the table exhausted, if every slot is
    /// occupied and the table is at capacity. The exhausted flag is
    /// edge-triggered: set on the overflow transition, cleared the
    /// moment `high_water` next drops below capacity, so a later
    /// overflow after recovery is reported again.
    fn find_vacant_or_grow(&mut self) -> Option<usize> {
        if let Some(index) = self.slots[..self.high_water].iter().position(|s| s.is_none()) {
            return Some(index);
        }
        if self.high_water < self.capacity() {
            let index = self.high_water;
            self.high_water += 1;
            return Some(index);
        }
        self.table_exhausted = true;
        None
    }

    /// Births a brand-new slot for `label` at `endpoint`. Returns the
    /// new slot's index, or `None` if the table is full (in which case
    /// the caller should log table exhaustion exactly once; see
    /// [`Table::is_exhausted`]).
    pub fn birth(&mut self, label: Label, endpoint: Endpoint) -> Option<usize> {
        let index = self.find_vacant_or_grow()?;
        self.slots[index] = Some(Slot::birth(index, label, endpoint));
        self.pending += 1;
        Some(index)
    }

    /// Frees a slot (death: invalid Init reply, or discovery-down),
    /// shrinking `high_water` back over any now-vacant trailing run and
    /// clearing the exhausted flag if that brings the table back under
    /// capacity.
    pub fn free(&mut self, index: usize) {
        self.slots[index] = None;
        while self.high_water > 0 && self.slots[self.high_water - 1].is_none() {
            self.high_water -= 1;
        }
        if self.high_water < self.capacity() {
            self.table_exhausted = false;
        }
    }

    /// Increments the initializing-driver counter, e.g. on slot birth
    /// or on an Active slot restarting back into Initializing.
    pub fn inc_pending(&mut self) {
        self.pending += 1;
    }

    /// Decrements the initializing-driver counter, e.g. on a successful
    /// Init reply or on an Initializing slot's death.
    pub fn dec_pending(&mut self) {
        debug_assert!(self.pending > 0);
        self.pending = self.pending.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(s: &[u8]) -> Label {
        Label::new(s).unwrap()
    }

    #[test]
    fn birth_reuses_freed_slots_before_growing() {
        let mut table = Table::new(2);
        let a = table.birth(label(b"e0"), Endpoint(1)).unwrap();
        let _b = table.birth(label(b"e1"), Endpoint(2)).unwrap();
        assert!(table.birth(label(b"e2"), Endpoint(3)).is_none());
        assert!(table.is_exhausted());

        table.free(a);
        assert!(!table.is_exhausted());
        let c = table.birth(label(b"e2"), Endpoint(3)).unwrap();
        assert_eq!(c, a, "freed slot is reused before growing high_water");
    }

    #[test]
    fn pending_tracks_births_and_deaths() {
        let mut table = Table::new(4);
        let a = table.birth(label(b"e0"), Endpoint(1)).unwrap();
        assert_eq!(table.pending(), 1);
        table.free(a);
        assert_eq!(table.pending(), 1, "free alone does not touch pending; callers decrement explicitly");
        table.dec_pending();
        assert_eq!(table.pending(), 0);
    }

    #[test]
    fn find_by_label_only_scans_live_prefix() {
        let mut table = Table::new(4);
        table.birth(label(b"e0"), Endpoint(1)).unwrap();
        assert_eq!(table.find_by_label(&label(b"e0")), Some(0));
        assert_eq!(table.find_by_label(&label(b"missing")), None);
    }
}
