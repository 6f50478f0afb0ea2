// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! The bounded, sequence-numbered driver queue.
//!
//! Each driver owns two of these: one for outbound send-class requests
//! (Init, Configure, Send) and one for Receive. They differ only in
//! their admission policy, which lives in `Pool::acquire`, not here.

use std::collections::VecDeque;

use crate::request::{Pool, RequestKind};

/// A FIFO of in-flight request descriptor indices, with a monotonic
/// head sequence number.
///
/// Invariant: the sequence id of the *i*-th pending descriptor is
/// `head + i`. `count <= max` whenever `max > 0`; `max == 0` means the
/// owning driver is not yet active for this queue's traffic class.
#[derive(Clone, Debug, Default)]
pub struct Queue {
    head: u32,
    max: usize,
    items: VecDeque<usize>,
}

impl Queue {
    /// Builds a freshly-born queue, seeding `head` to `seed` (the
    /// per-slot sequence spread) and leaving it inactive (`max == 0`)
    /// until the driver's Init reply establishes a real cap.
    pub fn new(seed: u32) -> Self {
        Queue { head: seed, max: 0, items: VecDeque::new() }
    }

    /// Current sequence number at the head of the queue (or of the next
    /// request to be enqueued, if the queue is empty).
    pub fn head(&self) -> u32 {
        self.head
    }

    /// Current depth.
    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// Current admission cap. Zero means the queue is not yet active.
    pub fn max(&self) -> usize {
        self.max
    }

    /// Sets the admission cap, e.g. once a successful Init reply
    /// establishes the driver-advertised limit.
    pub fn set_max(&mut self, max: usize) {
        self.max = max;
    }

    /// Bumps `head` by one, without touching `count` or `max`. Used to
    /// re-establish sequence distinctness across the initialization
    /// boundary, independently of a full reset.
    pub fn bump_head(&mut self) {
        self.head = self.head.wrapping_add(1);
    }

    /// Appends `index` to the tail, claiming the next sequence id.
    /// Callers must have already confirmed admission via
    /// [`Pool::acquire`] and committed via [`Pool::commit`].
    pub fn push(&mut self, index: usize) {
        self.items.push_back(index);
    }

    /// The sequence id that would be assigned to the next request
    /// admitted onto this queue.
    pub fn next_seq(&self) -> u32 {
        self.head.wrapping_add(self.items.len() as u32)
    }

    /// Releases the head descriptor back to `pool`, advancing `head` by
    /// one and decrementing `count`. Does nothing if the queue is
    /// empty.
    pub fn advance<G>(&mut self, pool: &mut Pool, grants: &mut G)
    where
        G: ndcc_ipc::GrantSpace,
    {
        if let Some(index) = self.items.pop_front() {
            let count_before = self.items.len() + 1;
            pool.release(index, count_before, grants);
            self.head = self.head.wrapping_add(1);
        }
    }

    /// Returns `true` and releases the head descriptor iff the queue is
    /// non-empty, its head sequence equals `seq`, and the head
    /// descriptor's kind equals `kind`. This is the sole matching rule
    /// for replies: any mismatch leaves the queue untouched.
    pub fn remove_head_if<G>(
        &mut self,
        kind: RequestKind,
        seq: u32,
        pool: &mut Pool,
        grants: &mut G,
    ) -> bool
    where
        G: ndcc_ipc::GrantSpace,
    {
        let Some(&index) = self.items.front() else {
            return false;
        };
        if self.head != seq || pool.descriptor(index).kind() != kind {
            return false;
        }
        self.advance(pool, grants);
        true
    }

    /// Discards every in-flight descriptor (revoking their grants),
    /// deactivates the queue (`max := 0`), and bumps `head` by at least
    /// one so that no reply drawn from the pre-reset sequence space can
    /// ever match again, even if the queue was already empty.
    pub fn reset<G>(&mut self, pool: &mut Pool, grants: &mut G)
    where
        G: ndcc_ipc::GrantSpace,
    {
        while !self.items.is_empty() {
            self.advance(pool, grants);
        }
        self.max = 0;
        self.bump_head();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndcc_ipc::{Direction, Endpoint, GrantError, GrantSpace};

    struct NullGrants;
    impl GrantSpace for NullGrants {
        fn allocate(
            &mut self,
            _g: Endpoint,
            _d: Direction,
            _p: usize,
            _l: usize,
        ) -> Result<ndcc_ipc::Grant, GrantError> {
            unreachable!("tests do not allocate through this mock")
        }
        fn revoke(&mut self, _grant: ndcc_ipc::Grant) {}
    }

    #[test]
    fn sequence_ids_are_contiguous_from_head() {
        let mut pool = Pool::new(8, 2, 8);
        let mut grants = NullGrants;
        let mut queue = Queue::new(0);
        queue.set_max(10);

        for _ in 0..3 {
            let idx = pool.acquire(RequestKind::Send, queue.count(), queue.max()).unwrap();
            pool.commit(idx, queue.count() + 1);
            queue.push(idx);
        }
        assert_eq!(queue.head(), 0);
        assert_eq!(queue.count(), 3);
        assert_eq!(queue.next_seq(), 3);

        queue.advance(&mut pool, &mut grants);
        assert_eq!(queue.head(), 1);
        assert_eq!(queue.count(), 2);
    }

    #[test]
    fn remove_head_if_requires_exact_kind_and_seq() {
        let mut pool = Pool::new(8, 2, 8);
        let mut grants = NullGrants;
        let mut queue = Queue::new(100);
        queue.set_max(10);
        let idx = pool.acquire(RequestKind::Send, 0, 10).unwrap();
        pool.commit(idx, 1);
        queue.push(idx);

        assert!(!queue.remove_head_if(RequestKind::Receive, 100, &mut pool, &mut grants));
        assert!(!queue.remove_head_if(RequestKind::Send, 101, &mut pool, &mut grants));
        assert!(queue.remove_head_if(RequestKind::Send, 100, &mut pool, &mut grants));
        assert_eq!(queue.count(), 0);
        assert_eq!(queue.head(), 101);
    }

    #[test]
    fn reset_bumps_head_even_when_already_empty() {
        let mut pool = Pool::new(8, 2, 8);
        let mut grants = NullGrants;
        let mut queue = Queue::new(50);
        queue.set_max(10);

        let before = queue.head();
        queue.reset(&mut pool, &mut grants);
        assert!(queue.head() != before, "reset must renumber even an empty queue");
        assert_eq!(queue.max(), 0);
    }

    #[test]
    fn reset_drains_and_revokes_in_flight_descriptors() {
        let mut pool = Pool::new(8, 2, 8);
        let mut grants = NullGrants;
        let mut queue = Queue::new(0);
        queue.set_max(10);
        for _ in 0..3 {
            let idx = pool.acquire(RequestKind::Send, queue.count(), queue.max()).unwrap();
            pool.commit(idx, queue.count() + 1);
            queue.push(idx);
        }
        queue.reset(&mut pool, &mut grants);
        assert_eq!(queue.count(), 0);
        assert_eq!(queue.max(), 0);
        assert_eq!(queue.head(), 4, "head advances once per drained item plus the final bump");
    }
}
