// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! The assembled network driver communication core: wires the request
//! pool, driver table, protocol engine and discovery adapter together
//! behind the public API ethif and the surrounding event loop call.

use ndcc_ipc::{Direction, Endpoint, GrantSpace, Transport};

use crate::config::{Config, HW_ADDR_MAX};
use crate::discovery::{label_from_key, DriverStatus, NamingService};
use crate::error::{Error, Result};
use crate::ethif::{EthIf, LinkState};
use crate::management::ManagementView;
use crate::protocol::{self, ConfigureSet, InboundMessage, OutboundMessage, Segment};
use crate::request::{Pool, RequestKind};
use crate::table::Table;

/// Advertised send-queue caps beyond this are clamped, matching the
/// original protocol's single-byte send-window field.
const SEND_MAX_CAP: usize = 255;

/// One scatter/gather segment supplied by the upper layer for a Send,
/// Receive, or Configure-multicast request: a pointer/length pair the
/// core turns into a grant.
#[derive(Clone, Copy, Debug)]
pub struct Buffer {
    pub ptr: usize,
    pub len: usize,
}

/// The fields of a Configure request, gated by `set`.
#[derive(Clone, Debug, Default)]
pub struct ConfigureRequest {
    pub set: ConfigureSet,
    pub mode: u32,
    pub caps: u32,
    pub flags: u32,
    pub media: u32,
    pub hw_addr: [u8; HW_ADDR_MAX],
    pub multicast: Option<Buffer>,
}

/// The assembled core. Generic over nothing: the transport and grant
/// space are held as trait objects, matching the teacher's own
/// `Arc<dyn Transport>` style for its virtio driver abstraction.
pub struct Core {
    config: Config,
    table: Table,
    pool: Pool,
    transport: Box<dyn Transport>,
    grants: Box<dyn GrantSpace>,
}

impl Core {
    /// Builds a fresh core with an empty driver table, sized per
    /// `config`.
    pub fn new(config: Config, transport: Box<dyn Transport>, grants: Box<dyn GrantSpace>) -> Self {
        let pool = Pool::new(config.total_requests(), config.min_send_queue(), config.spare_requests());
        Core { config, table: Table::new(config.max_drivers()), pool, transport, grants }
    }

    /// A snapshot of the management-visible attributes.
    pub fn management(&self) -> ManagementView {
        ManagementView::new(self.table.pending())
    }

    fn send_message(&mut self, to: Endpoint, message: Vec<u8>) {
        if let Err(err) = self.transport.send(to, message) {
            log::error!("asynchronous send to driver {:?} failed: {}", to, err);
            panic!("asynchronous send to driver failed: {err}");
        }
    }

    // -- Discovery -----------------------------------------------------

    /// Polls the naming service for status changes and sweeps live
    /// slots for ones the naming service no longer knows about.
    pub fn discovery_check(&mut self, naming: &mut dyn NamingService, ethif: &mut dyn EthIf) {
        for change in naming.poll_changes() {
            if change.status != DriverStatus::Up {
                continue;
            }
            let Some(endpoint) = change.endpoint else { continue };
            let Some(label) = label_from_key(&change.key) else { continue };
            self.on_discovery_up(label, endpoint, ethif);
        }

        let live: Vec<usize> = self.table.iter_live().map(|(index, _)| index).collect();
        for index in live {
            let label = self.table.get(index).expect("index came from iter_live").label;
            if naming.lookup_by_label(&label).is_none() {
                self.on_discovery_down(index, ethif);
            }
        }
    }

    fn on_discovery_up(&mut self, label: crate::slot::Label, endpoint: Endpoint, ethif: &mut dyn EthIf) {
        if let Some(index) = self.table.find_by_label(&label) {
            let slot = self.table.get_mut(index).expect("index came from find_by_label");
            let was_active = slot.is_active();
            let old_endpoint = slot.endpoint;
            slot.send_queue.reset(&mut self.pool, &mut *self.grants);
            slot.recv_queue.reset(&mut self.pool, &mut *self.grants);
            slot.endpoint = endpoint;
            if was_active {
                if let Some(handle) = slot.ethif_handle {
                    ethif.disable(handle);
                }
                self.table.inc_pending();
                log::info!("driver {label} restarted: endpoint {old_endpoint:?} -> {endpoint:?}");
            }
            self.send_init(index);
        } else {
            let was_exhausted = self.table.is_exhausted();
            match self.table.birth(label, endpoint) {
                Some(index) => self.send_init(index),
                None => {
                    if !was_exhausted {
                        log::warn!("not enough driver slots for {label}");
                    }
                }
            }
        }
    }

    fn on_discovery_down(&mut self, index: usize, ethif: &mut dyn EthIf) {
        let slot = self.table.get_mut(index).expect("caller holds a valid live index");
        let was_active = slot.is_active();
        let handle = slot.ethif_handle;
        slot.send_queue.reset(&mut self.pool, &mut *self.grants);
        slot.recv_queue.reset(&mut self.pool, &mut *self.grants);
        if was_active {
            if let Some(handle) = handle {
                ethif.remove(handle);
            }
        } else {
            self.table.dec_pending();
        }
        self.table.free(index);
    }

    fn send_init(&mut self, index: usize) {
        let slot = self.table.get(index).expect("caller holds a valid index");
        let id = slot.send_queue.head();
        let endpoint = slot.endpoint;
        self.send_message(endpoint, OutboundMessage::Init { id }.encode());
    }

    // -- Inbound messages ------------------------------------------------

    /// Dispatches one inbound message from `from`. Unknown senders and
    /// unrecognized message kinds are silently dropped.
    pub fn handle_message(&mut self, from: Endpoint, bytes: &[u8], ethif: &mut dyn EthIf) {
        let Some(index) = self.table.find_by_endpoint(from) else { return };
        let Ok(message) = protocol::decode(bytes) else { return };
        match message {
            InboundMessage::InitReply {
                id,
                name,
                hw_addr,
                caps,
                link_up,
                media,
                max_send,
                max_recv,
            } => self.handle_init_reply(index, id, name, hw_addr, caps, link_up, media, max_send, max_recv, ethif),
            InboundMessage::ConfigureReply { id, result } => {
                self.handle_configure_reply(index, id, result, ethif)
            }
            InboundMessage::SendReply { id, result } => self.handle_send_reply(index, id, result, ethif),
            InboundMessage::ReceiveReply { id, result } => {
                self.handle_receive_reply(index, id, result, ethif)
            }
            InboundMessage::Status { id, link_up, media, oerror, coll, ierror, iqdrop } => {
                self.handle_status(index, id, link_up, media, oerror, coll, ierror, iqdrop, ethif)
            }
            InboundMessage::Other => {}
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_init_reply(
        &mut self,
        index: usize,
        id: u32,
        name: Vec<u8>,
        hw_addr: Vec<u8>,
        caps: u32,
        link_up: bool,
        media: u32,
        max_send: u32,
        max_recv: u32,
        ethif: &mut dyn EthIf,
    ) {
        let slot = self.table.get(index).expect("caller holds a valid index");
        if !slot.is_initializing() || slot.send_queue.head() != id {
            return;
        }

        let name = std::str::from_utf8(&name).ok().filter(|s| !s.is_empty());
        let valid = name.is_some()
            && (1..=HW_ADDR_MAX).contains(&hw_addr.len())
            && max_send >= 1
            && max_recv >= 1;
        if !valid {
            log::warn!("slot {index} sent an invalid init reply; releasing it");
            self.table.dec_pending();
            self.table.free(index);
            return;
        }
        let name = name.expect("validated above");

        let slot = self.table.get_mut(index).expect("caller holds a valid index");
        let is_first_time = slot.ethif_handle.is_none();
        let handle = if is_first_time {
            match ethif.add(index, name, caps) {
                Some(handle) => {
                    slot.ethif_handle = Some(handle);
                    handle
                }
                None => {
                    log::warn!("ethif declined to add interface for slot {index}");
                    self.table.dec_pending();
                    self.table.free(index);
                    return;
                }
            }
        } else {
            slot.ethif_handle.expect("checked above")
        };

        let link = if link_up { LinkState::Up } else { LinkState::Down };
        let enabled = ethif.enable(
            handle,
            if is_first_time { Some(name) } else { None },
            &hw_addr,
            caps,
            link,
            media,
        );
        if !enabled {
            // Matches the original's unconditional non-null check in its
            // teardown path: the handle exists, so it is removed even
            // though it was never successfully enabled.
            ethif.remove(handle);
            self.table.dec_pending();
            self.table.free(index);
            return;
        }

        let slot = self.table.get_mut(index).expect("caller holds a valid index");
        slot.send_queue.set_max((max_send as usize).min(SEND_MAX_CAP));
        slot.recv_queue.set_max((max_recv as usize).min(self.config.min_recv_queue()));
        slot.send_queue.bump_head();
        slot.recv_queue.bump_head();
        self.table.dec_pending();
    }

    fn handle_configure_reply(&mut self, index: usize, id: u32, result: i32, ethif: &mut dyn EthIf) {
        let Some(slot) = self.table.get_mut(index) else { return };
        let handle = slot.ethif_handle;
        if slot.send_queue.remove_head_if(RequestKind::Configure, id, &mut self.pool, &mut *self.grants) {
            if let Some(handle) = handle {
                ethif.configured(handle, result);
            }
        }
    }

    fn handle_send_reply(&mut self, index: usize, id: u32, result: i32, ethif: &mut dyn EthIf) {
        let Some(slot) = self.table.get_mut(index) else { return };
        let handle = slot.ethif_handle;
        if slot.send_queue.remove_head_if(RequestKind::Send, id, &mut self.pool, &mut *self.grants) {
            if let Some(handle) = handle {
                ethif.sent(handle, result);
            }
        }
    }

    fn handle_receive_reply(&mut self, index: usize, id: u32, result: i32, ethif: &mut dyn EthIf) {
        let Some(slot) = self.table.get_mut(index) else { return };
        let handle = slot.ethif_handle;
        if slot.recv_queue.remove_head_if(RequestKind::Receive, id, &mut self.pool, &mut *self.grants) {
            if let Some(handle) = handle {
                ethif.received(handle, result);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_status(
        &mut self,
        index: usize,
        id: u32,
        link_up: bool,
        media: u32,
        oerror: u32,
        coll: u32,
        ierror: u32,
        iqdrop: u32,
        ethif: &mut dyn EthIf,
    ) {
        let Some(slot) = self.table.get(index) else { return };
        if !slot.is_active() {
            return;
        }
        let Some(handle) = slot.ethif_handle else { return };
        let endpoint = slot.endpoint;
        let link = if link_up { LinkState::Up } else { LinkState::Down };
        ethif.status(handle, link, media, oerror, coll, ierror, iqdrop);
        self.send_message(endpoint, OutboundMessage::StatusReply { id }.encode());
    }

    // -- Downward calls from ethif ---------------------------------------

    /// Submits a Configure request.
    pub fn conf(&mut self, slot_id: usize, request: ConfigureRequest) -> Result<()> {
        let slot = self.table.get_mut(slot_id).expect("slot_id refers to a live driver slot");
        let endpoint = slot.endpoint;
        let queue = &mut slot.send_queue;
        let index = self
            .pool
            .acquire(RequestKind::Configure, queue.count(), queue.max())
            .ok_or(Error::Busy)?;

        let multicast = match request.multicast {
            Some(buffer) => match self.grants.allocate(endpoint, Direction::ReadOnly, buffer.ptr, buffer.len) {
                Ok(grant) => Some(Segment { grant, len: buffer.len as u32 }),
                Err(_) => return Err(Error::OutOfMemory),
            },
            None => None,
        };
        if let Some(segment) = multicast {
            self.pool.descriptor_mut(index).push_grant(segment.grant);
        }

        let slot = self.table.get_mut(slot_id).expect("checked above");
        let queue = &mut slot.send_queue;
        let id = queue.next_seq();
        let message = OutboundMessage::Configure {
            id,
            set: request.set,
            mode: request.mode,
            multicast,
            caps: request.caps,
            flags: request.flags,
            media: request.media,
            hw_addr: request.hw_addr,
        };
        self.send_message(endpoint, message.encode());

        let slot = self.table.get_mut(slot_id).expect("checked above");
        slot.send_queue.push(index);
        let count_after = slot.send_queue.count();
        self.pool.commit(index, count_after);
        Ok(())
    }

    /// Submits a Send request over `chain`.
    pub fn send(&mut self, slot_id: usize, chain: &[Buffer]) -> Result<()> {
        self.dispatch_segmented(slot_id, RequestKind::Send, chain, Direction::ReadOnly)
    }

    /// Whether a Receive request would currently be admitted.
    pub fn can_recv(&self, slot_id: usize) -> bool {
        let slot = self.table.get(slot_id).expect("slot_id refers to a live driver slot");
        slot.recv_queue.count() < slot.recv_queue.max()
    }

    /// Submits a Receive request over `chain`; the upper layer must have
    /// already allocated the buffers `chain` describes.
    pub fn recv(&mut self, slot_id: usize, chain: &[Buffer]) -> Result<()> {
        self.dispatch_segmented(slot_id, RequestKind::Receive, chain, Direction::WriteOnly)
    }

    fn dispatch_segmented(
        &mut self,
        slot_id: usize,
        kind: RequestKind,
        chain: &[Buffer],
        direction: Direction,
    ) -> Result<()> {
        let slot = self.table.get_mut(slot_id).expect("slot_id refers to a live driver slot");
        let endpoint = slot.endpoint;
        let queue = if matches!(kind, RequestKind::Receive) { &mut slot.recv_queue } else { &mut slot.send_queue };
        let index = self.pool.acquire(kind, queue.count(), queue.max()).ok_or(Error::Busy)?;

        let mut segments = Vec::with_capacity(chain.len());
        for buffer in chain.iter().take(crate::config::IOV_MAX) {
            match self.grants.allocate(endpoint, direction, buffer.ptr, buffer.len) {
                Ok(grant) => segments.push(Segment { grant, len: buffer.len as u32 }),
                Err(_) => {
                    for segment in &segments {
                        self.grants.revoke(segment.grant);
                    }
                    return Err(Error::OutOfMemory);
                }
            }
        }
        for segment in &segments {
            self.pool.descriptor_mut(index).push_grant(segment.grant);
        }

        let slot = self.table.get_mut(slot_id).expect("checked above");
        let queue = if matches!(kind, RequestKind::Receive) { &mut slot.recv_queue } else { &mut slot.send_queue };
        let id = queue.next_seq();
        let message = if matches!(kind, RequestKind::Receive) {
            OutboundMessage::Receive { id, segments }
        } else {
            OutboundMessage::Send { id, segments }
        };
        self.send_message(endpoint, message.encode());

        let slot = self.table.get_mut(slot_id).expect("checked above");
        let queue = if matches!(kind, RequestKind::Receive) { &mut slot.recv_queue } else { &mut slot.send_queue };
        queue.push(index);
        let count_after = queue.count();
        self.pool.commit(index, count_after);
        Ok(())
    }
}
