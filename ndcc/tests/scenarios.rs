// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! End-to-end scenario tests (S1-S6) exercising the assembled core
//! against mock transport, grant space, naming service and ethif
//! implementations. Mirrors the literal values used throughout the
//! design: `NR_NDEV=8`, `MIN_SENDQ=MIN_RECVQ=2`, `NREQ_SPARES=8`,
//! `IOV_MAX=4`.

use std::cell::RefCell;
use std::rc::Rc;

use byteorder::{LittleEndian, WriteBytesExt};

use ndcc::{
    ChangeEvent, Config, Core, DriverStatus, EthIf, EthifHandle, LinkState, NamingService,
};
use ndcc_ipc::{Direction, Endpoint, Grant, GrantError, GrantSpace, Transport, TransportError};

const TAG_INIT_REPLY: u8 = 2;
const TAG_SEND_REPLY: u8 = 6;
const TAG_STATUS: u8 = 9;

fn init_reply(id: u32, name: &str, hw_addr: &[u8], max_send: u32, max_recv: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_u8(TAG_INIT_REPLY).unwrap();
    out.write_u32::<LittleEndian>(id).unwrap();
    let mut name_buf = vec![0u8; ndcc::LABEL_MAX];
    name_buf[..name.len()].copy_from_slice(name.as_bytes());
    out.extend_from_slice(&name_buf);
    let mut hw_buf = vec![0u8; ndcc::HW_ADDR_MAX];
    hw_buf[..hw_addr.len()].copy_from_slice(hw_addr);
    out.extend_from_slice(&hw_buf);
    out.write_u8(hw_addr.len() as u8).unwrap();
    out.write_u32::<LittleEndian>(0).unwrap();
    out.write_u8(1).unwrap();
    out.write_u32::<LittleEndian>(1000).unwrap();
    out.write_u32::<LittleEndian>(max_send).unwrap();
    out.write_u32::<LittleEndian>(max_recv).unwrap();
    out
}

fn send_reply(id: u32, result: i32) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_u8(TAG_SEND_REPLY).unwrap();
    out.write_u32::<LittleEndian>(id).unwrap();
    out.write_i32::<LittleEndian>(result).unwrap();
    out
}

fn status(id: u32, link_up: bool, media: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_u8(TAG_STATUS).unwrap();
    out.write_u32::<LittleEndian>(id).unwrap();
    out.write_u8(link_up as u8).unwrap();
    out.write_u32::<LittleEndian>(media).unwrap();
    out.write_u32::<LittleEndian>(0).unwrap();
    out.write_u32::<LittleEndian>(0).unwrap();
    out.write_u32::<LittleEndian>(0).unwrap();
    out.write_u32::<LittleEndian>(0).unwrap();
    out
}

#[derive(Default)]
struct RecordingEthif {
    added: Vec<(usize, String)>,
    enabled: Vec<EthifHandle>,
    disabled: Vec<EthifHandle>,
    removed: Vec<EthifHandle>,
    sent: Vec<(EthifHandle, i32)>,
    statuses: Vec<(LinkState, u32)>,
    next_handle: usize,
}

impl EthIf for RecordingEthif {
    fn add(&mut self, slot_id: usize, name: &str, _caps: u32) -> Option<EthifHandle> {
        self.added.push((slot_id, name.to_string()));
        let handle = EthifHandle(self.next_handle);
        self.next_handle += 1;
        Some(handle)
    }

    fn enable(
        &mut self,
        handle: EthifHandle,
        _name: Option<&str>,
        _hw_addr: &[u8],
        _caps: u32,
        _link: LinkState,
        _media: u32,
    ) -> bool {
        self.enabled.push(handle);
        true
    }

    fn disable(&mut self, handle: EthifHandle) {
        self.disabled.push(handle);
    }

    fn remove(&mut self, handle: EthifHandle) {
        self.removed.push(handle);
    }

    fn configured(&mut self, _handle: EthifHandle, _result: i32) {}

    fn sent(&mut self, handle: EthifHandle, result: i32) {
        self.sent.push((handle, result));
    }

    fn received(&mut self, _handle: EthifHandle, _result: i32) {}

    fn status(
        &mut self,
        _handle: EthifHandle,
        link: LinkState,
        media: u32,
        _oerror: u32,
        _coll: u32,
        _ierror: u32,
        _iqdrop: u32,
    ) {
        self.statuses.push((link, media));
    }
}

type SentLog = Rc<RefCell<Vec<(Endpoint, Vec<u8>)>>>;

struct RecordingTransport {
    sent: SentLog,
}

impl Transport for RecordingTransport {
    fn send(&mut self, to: Endpoint, message: Vec<u8>) -> Result<(), TransportError> {
        self.sent.borrow_mut().push((to, message));
        Ok(())
    }
}

struct CountingGrants {
    next: u32,
    revoked: Vec<Grant>,
}

impl GrantSpace for CountingGrants {
    fn allocate(
        &mut self,
        _grantee: Endpoint,
        _direction: Direction,
        _ptr: usize,
        _len: usize,
    ) -> Result<Grant, GrantError> {
        let grant = Grant::from_raw(self.next);
        self.next += 1;
        Ok(grant)
    }

    fn revoke(&mut self, grant: Grant) {
        self.revoked.push(grant);
    }
}

struct ScriptedNaming {
    changes: Vec<ChangeEvent>,
    labels: std::collections::HashMap<Vec<u8>, Endpoint>,
}

impl ScriptedNaming {
    fn empty() -> Self {
        ScriptedNaming { changes: Vec::new(), labels: std::collections::HashMap::new() }
    }
}

impl NamingService for ScriptedNaming {
    fn poll_changes(&mut self) -> Vec<ChangeEvent> {
        std::mem::take(&mut self.changes)
    }

    fn lookup_by_label(&self, label: &ndcc::Label) -> Option<Endpoint> {
        self.labels.get(label.as_bytes()).copied()
    }
}

fn harness() -> (Core, SentLog) {
    let sent = Rc::new(RefCell::new(Vec::new()));
    let transport = RecordingTransport { sent: sent.clone() };
    let grants = CountingGrants { next: 0, revoked: Vec::new() };
    let core = Core::new(Config::default(), Box::new(transport), Box::new(grants));
    (core, sent)
}

fn bring_up(core: &mut Core, naming: &mut ScriptedNaming, ethif: &mut RecordingEthif, label: &str, endpoint: Endpoint) {
    naming.changes.push(ChangeEvent {
        key: format!("drv.net.{label}"),
        endpoint: Some(endpoint),
        status: DriverStatus::Up,
    });
    naming.labels.insert(label.as_bytes().to_vec(), endpoint);
    core.discovery_check(naming, ethif);
}

/// S1 - Cold start.
#[test]
fn s1_cold_start() {
    let (mut core, sent) = harness();
    let mut naming = ScriptedNaming::empty();
    let mut ethif = RecordingEthif::default();

    bring_up(&mut core, &mut naming, &mut ethif, "e0", Endpoint(1001));
    assert_eq!(sent.borrow().len(), 1, "Init request dispatched");
    assert_eq!(core.management().pending(), 1);

    let reply = init_reply(0, "eth0", &[1, 2, 3, 4, 5, 6], 16, 16);
    core.handle_message(Endpoint(1001), &reply, &mut ethif);

    assert_eq!(ethif.added.len(), 1);
    assert_eq!(ethif.enabled.len(), 1);
    assert_eq!(core.management().pending(), 0);
}

/// S2 - Bounded send admission.
#[test]
fn s2_bounded_send_admission() {
    let (mut core, sent) = harness();
    let mut naming = ScriptedNaming::empty();
    let mut ethif = RecordingEthif::default();
    bring_up(&mut core, &mut naming, &mut ethif, "e0", Endpoint(1001));
    core.handle_message(Endpoint(1001), &init_reply(0, "eth0", &[1; 6], 16, 16), &mut ethif);

    let mut admitted = 0;
    for _ in 0..10 {
        if core.send(0, &[]).is_ok() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 10, "2 reserved plus 8 spares");
    assert!(core.send(0, &[]).is_err(), "11th send is Busy");

    let sent_messages = sent.borrow().len();
    let _ = sent_messages;
    // Complete the head of the send queue and confirm exactly one more
    // send is now admitted.
    core.handle_message(Endpoint(1001), &send_reply(1, 0), &mut ethif);
    assert!(core.send(0, &[]).is_ok());
    assert!(core.send(0, &[]).is_err());
}

/// S3 - Receive hard cap.
#[test]
fn s3_receive_hard_cap() {
    let (mut core, _sent) = harness();
    let mut naming = ScriptedNaming::empty();
    let mut ethif = RecordingEthif::default();
    bring_up(&mut core, &mut naming, &mut ethif, "e0", Endpoint(1001));
    core.handle_message(Endpoint(1001), &init_reply(0, "eth0", &[1; 6], 16, 16), &mut ethif);

    assert!(core.recv(0, &[]).is_ok());
    assert!(core.recv(0, &[]).is_ok());
    assert!(core.recv(0, &[]).is_err(), "third receive exceeds MIN_RECVQ regardless of spares");
}

/// S4 - Restart discards a stale reply.
#[test]
fn s4_restart_discards_stale_reply() {
    let (mut core, sent) = harness();
    let mut naming = ScriptedNaming::empty();
    let mut ethif = RecordingEthif::default();
    bring_up(&mut core, &mut naming, &mut ethif, "e0", Endpoint(1001));
    core.handle_message(Endpoint(1001), &init_reply(0, "eth0", &[1; 6], 16, 16), &mut ethif);
    assert!(core.send(0, &[]).is_ok());

    // Driver restarts under the same label before replying.
    naming.changes.push(ChangeEvent {
        key: "drv.net.e0".to_string(),
        endpoint: Some(Endpoint(2002)),
        status: DriverStatus::Up,
    });
    naming.labels.insert(b"e0".to_vec(), Endpoint(2002));
    core.discovery_check(&mut naming, &mut ethif);

    assert_eq!(ethif.disabled.len(), 1, "restart disables the old interface exactly once");

    // The stale reply, still addressed to the old endpoint, must be
    // dropped without invoking ethif_sent.
    core.handle_message(Endpoint(1001), &send_reply(1, 0), &mut ethif);
    assert!(ethif.sent.is_empty(), "stale reply from the pre-restart incarnation must be dropped");

    // The new incarnation's Init request carries a fresh id, strictly
    // past the old pre-restart sequence space; recover it from the
    // last dispatched message rather than assuming it is still 0.
    let (new_endpoint, new_init) = sent.borrow().last().cloned().unwrap();
    assert_eq!(new_endpoint, Endpoint(2002));
    let new_id = u32::from_le_bytes(new_init[1..5].try_into().unwrap());
    assert!(new_id > 1, "post-restart sequence space must be past the stale send's id");

    core.handle_message(Endpoint(2002), &init_reply(new_id, "eth0", &[1; 6], 16, 16), &mut ethif);
    assert_eq!(ethif.enabled.len(), 2);
}

/// S5 - Malformed init reply.
#[test]
fn s5_malformed_init_reply() {
    let (mut core, _sent) = harness();
    let mut naming = ScriptedNaming::empty();
    let mut ethif = RecordingEthif::default();
    bring_up(&mut core, &mut naming, &mut ethif, "e0", Endpoint(1001));

    let reply = init_reply(0, "", &[1, 2], 16, 16);
    core.handle_message(Endpoint(1001), &reply, &mut ethif);

    assert!(ethif.added.is_empty());
    assert_eq!(core.management().pending(), 0, "the slot is released, not left initializing forever");
}

/// S6 - Status echo.
#[test]
fn s6_status_echo() {
    let (mut core, sent) = harness();
    let mut naming = ScriptedNaming::empty();
    let mut ethif = RecordingEthif::default();
    bring_up(&mut core, &mut naming, &mut ethif, "e0", Endpoint(1001));
    core.handle_message(Endpoint(1001), &init_reply(0, "eth0", &[1; 6], 16, 16), &mut ethif);

    let before = sent.borrow().len();
    core.handle_message(Endpoint(1001), &status(42, true, 1000), &mut ethif);

    assert_eq!(ethif.statuses, vec![(LinkState::Up, 1000)]);
    assert_eq!(sent.borrow().len(), before + 1, "a status-reply is echoed back");
    let (to, _) = sent.borrow()[before].clone();
    assert_eq!(to, Endpoint(1001));
}
