// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! The fixed-capacity request descriptor pool.
//!
//! A descriptor is, at any moment, in exactly one of three places: the
//! free list, some driver's send queue, or some driver's receive queue.
//! `acquire` only peeks the free list's head so a caller can still back
//! out (by simply not calling `commit`) if building the request fails
//! partway through, e.g. on grant exhaustion; `commit` is what actually
//! removes the descriptor from the free list.

use std::collections::VecDeque;

use ndcc_ipc::Grant;

use crate::config::IOV_MAX;

/// The kind of a driver request. Shared by every descriptor; the grant
/// array shape and free-list linkage are identical across kinds, so one
/// descriptor type with a kind tag is sufficient.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    Init,
    Configure,
    Send,
    Receive,
}

impl RequestKind {
    /// Whether this kind counts against the send-queue admission policy
    /// (MIN_SENDQ / spare pool). Only Receive is exempt.
    pub fn counts_as_send(&self) -> bool {
        !matches!(self, RequestKind::Receive)
    }
}

/// A single request descriptor: a kind tag and up to `IOV_MAX` grants.
#[derive(Clone, Copy, Debug)]
pub struct Descriptor {
    kind: RequestKind,
    grants: [Grant; IOV_MAX],
}

impl Descriptor {
    fn reset(&mut self, kind: RequestKind) {
        self.kind = kind;
        self.grants = [Grant::INVALID; IOV_MAX];
    }

    /// The request kind this descriptor currently carries.
    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Appends a grant to the first invalid (sentinel) slot.
    ///
    /// Panics if the descriptor's grant array is already full; callers
    /// never append more than `IOV_MAX` grants per request by
    /// construction.
    pub fn push_grant(&mut self, grant: Grant) {
        for slot in self.grants.iter_mut() {
            if !slot.is_valid() {
                *slot = grant;
                return;
            }
        }
        panic!("descriptor grant array overflow");
    }

    /// Iterates the valid prefix of the grant array, stopping at the
    /// first invalid (sentinel) entry.
    pub fn grants(&self) -> impl Iterator<Item = Grant> + '_ {
        self.grants.iter().copied().take_while(Grant::is_valid)
    }
}

/// The global, preallocated request descriptor pool.
///
/// Owns every descriptor; queues only ever hold indices into this pool.
pub struct Pool {
    descriptors: Vec<Descriptor>,
    free_list: VecDeque<usize>,
    min_send_queue: usize,
    spares_free: usize,
    spare_requests: usize,
}

impl Pool {
    /// Builds a pool of `total` descriptors, all initially free.
    pub fn new(total: usize, min_send_queue: usize, spare_requests: usize) -> Self {
        Pool {
            descriptors: vec![
                Descriptor {
                    kind: RequestKind::Receive,
                    grants: [Grant::INVALID; IOV_MAX],
                };
                total
            ],
            free_list: (0..total).collect(),
            min_send_queue,
            spares_free: spare_requests,
            spare_requests,
        }
    }

    /// Number of spare descriptors currently unused.
    pub fn spares_free(&self) -> usize {
        self.spares_free
    }

    /// Total configured spare-pool size.
    pub fn spare_requests(&self) -> usize {
        self.spare_requests
    }

    /// Peeks the free list and checks admission for `kind` against a
    /// queue currently holding `queue_count` of `queue_max`. Returns the
    /// index of a descriptor still sitting in the free list, with its
    /// kind set and its grants cleared, or `None` if admission is
    /// denied.
    ///
    /// The returned descriptor is NOT removed from the free list; the
    /// caller must follow up with [`Pool::commit`] (to actually claim
    /// it) with no intervening call to `acquire`, or simply drop the
    /// attempt, in which case the descriptor remains free.
    pub fn acquire(
        &mut self,
        kind: RequestKind,
        queue_count: usize,
        queue_max: usize,
    ) -> Option<usize> {
        if queue_count == queue_max {
            return None;
        }
        if kind.counts_as_send() && queue_count >= self.min_send_queue && self.spares_free == 0 {
            return None;
        }
        let index = *self.free_list.front()?;
        self.descriptors[index].reset(kind);
        Some(index)
    }

    /// Commits a descriptor most recently returned by `acquire` into
    /// `queue_count_after`, the queue's depth once this descriptor is
    /// appended. Removes it from the free list and, if it is a
    /// send-counting kind that pushed the queue beyond the reserved
    /// minimum, consumes a spare.
    pub fn commit(&mut self, index: usize, queue_count_after: usize) {
        let front = self.free_list.pop_front();
        debug_assert_eq!(front, Some(index), "commit must follow acquire of the same descriptor");
        let kind = self.descriptors[index].kind();
        if kind.counts_as_send() && queue_count_after > self.min_send_queue {
            debug_assert!(self.spares_free > 0);
            self.spares_free -= 1;
        }
    }

    /// Releases a descriptor sitting at the head of some queue whose
    /// depth (before removal) was `queue_count_before`: revokes every
    /// valid grant, returns a spare if one was consumed, and pushes the
    /// descriptor back onto the free list.
    pub fn release<G>(&mut self, index: usize, queue_count_before: usize, grants: &mut G)
    where
        G: ndcc_ipc::GrantSpace,
    {
        let kind = self.descriptors[index].kind();
        for grant in self.descriptors[index].grants() {
            grants.revoke(grant);
        }
        self.descriptors[index].grants = [Grant::INVALID; IOV_MAX];
        if kind.counts_as_send() && queue_count_before > self.min_send_queue {
            self.spares_free += 1;
            debug_assert!(self.spares_free <= self.spare_requests);
        }
        self.free_list.push_back(index);
    }

    /// Mutable access to a descriptor by pool index, for the protocol
    /// engine to stash grants into while building a request.
    pub fn descriptor_mut(&mut self, index: usize) -> &mut Descriptor {
        &mut self.descriptors[index]
    }

    /// Read-only access to a descriptor by pool index.
    pub fn descriptor(&self, index: usize) -> &Descriptor {
        &self.descriptors[index]
    }
}
