// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Wire messages exchanged with driver endpoints.
//!
//! Encoding is hand-rolled with `byteorder` rather than derived, since
//! the layout here mirrors a fixed C struct layout (tag byte, then
//! little-endian scalar fields, then fixed-size buffers) that a derive
//! macro would not reproduce without fighting it.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ndcc_ipc::Grant;

use crate::config::{HW_ADDR_MAX, IOV_MAX};

const TAG_INIT_REQUEST: u8 = 1;
const TAG_INIT_REPLY: u8 = 2;
const TAG_CONFIGURE_REQUEST: u8 = 3;
const TAG_CONFIGURE_REPLY: u8 = 4;
const TAG_SEND_REQUEST: u8 = 5;
const TAG_SEND_REPLY: u8 = 6;
const TAG_RECEIVE_REQUEST: u8 = 7;
const TAG_RECEIVE_REPLY: u8 = 8;
const TAG_STATUS: u8 = 9;
const TAG_STATUS_REPLY: u8 = 10;

/// A segment descriptor as it appears in a Send or Receive request:
/// a grant over the segment plus its length in bytes.
#[derive(Clone, Copy, Debug)]
pub struct Segment {
    pub grant: Grant,
    pub len: u32,
}

/// Selects which scalar fields of a Configure request are meaningful;
/// an empty mask is valid and still produces a reply.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConfigureSet {
    pub mode: bool,
    pub caps: bool,
    pub flags: bool,
    pub media: bool,
    pub hw_addr: bool,
    pub multicast: bool,
}

impl ConfigureSet {
    fn to_bits(self) -> u8 {
        (self.mode as u8)
            | (self.caps as u8) << 1
            | (self.flags as u8) << 2
            | (self.media as u8) << 3
            | (self.hw_addr as u8) << 4
            | (self.multicast as u8) << 5
    }

    fn from_bits(bits: u8) -> ConfigureSet {
        ConfigureSet {
            mode: bits & 0x01 != 0,
            caps: bits & 0x02 != 0,
            flags: bits & 0x04 != 0,
            media: bits & 0x08 != 0,
            hw_addr: bits & 0x10 != 0,
            multicast: bits & 0x20 != 0,
        }
    }
}

/// A message the core sends down to a driver.
#[derive(Clone, Debug)]
pub enum OutboundMessage {
    Init { id: u32 },
    Configure {
        id: u32,
        set: ConfigureSet,
        mode: u32,
        multicast: Option<Segment>,
        caps: u32,
        flags: u32,
        media: u32,
        hw_addr: [u8; HW_ADDR_MAX],
    },
    Send { id: u32, segments: Vec<Segment> },
    Receive { id: u32, segments: Vec<Segment> },
    StatusReply { id: u32 },
}

impl OutboundMessage {
    /// Encodes this message into its wire representation.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            OutboundMessage::Init { id } => {
                out.write_u8(TAG_INIT_REQUEST).unwrap();
                out.write_u32::<LittleEndian>(*id).unwrap();
            }
            OutboundMessage::Configure {
                id,
                set,
                mode,
                multicast,
                caps,
                flags,
                media,
                hw_addr,
            } => {
                out.write_u8(TAG_CONFIGURE_REQUEST).unwrap();
                out.write_u32::<LittleEndian>(*id).unwrap();
                out.write_u8(set.to_bits()).unwrap();
                out.write_u32::<LittleEndian>(*mode).unwrap();
                let grant = multicast.map(|m| m.grant).unwrap_or(Grant::INVALID);
                let count = multicast.map(|m| m.len).unwrap_or(0);
                write_grant(&mut out, grant);
                out.write_u32::<LittleEndian>(count).unwrap();
                out.write_u32::<LittleEndian>(*caps).unwrap();
                out.write_u32::<LittleEndian>(*flags).unwrap();
                out.write_u32::<LittleEndian>(*media).unwrap();
                out.write_all(hw_addr).unwrap();
            }
            OutboundMessage::Send { id, segments } | OutboundMessage::Receive { id, segments } => {
                let tag = if matches!(self, OutboundMessage::Send { .. }) {
                    TAG_SEND_REQUEST
                } else {
                    TAG_RECEIVE_REQUEST
                };
                out.write_u8(tag).unwrap();
                out.write_u32::<LittleEndian>(*id).unwrap();
                for i in 0..IOV_MAX {
                    let segment = segments.get(i);
                    write_grant(&mut out, segment.map(|s| s.grant).unwrap_or(Grant::INVALID));
                    out.write_u32::<LittleEndian>(segment.map(|s| s.len).unwrap_or(0)).unwrap();
                }
                out.write_u32::<LittleEndian>(segments.len() as u32).unwrap();
            }
            OutboundMessage::StatusReply { id } => {
                out.write_u8(TAG_STATUS_REPLY).unwrap();
                out.write_u32::<LittleEndian>(*id).unwrap();
            }
        }
        out
    }
}

fn write_grant(out: &mut Vec<u8>, grant: Grant) {
    out.write_u32::<LittleEndian>(grant.raw()).unwrap();
}

/// A message the core receives from a driver.
#[derive(Clone, Debug)]
pub enum InboundMessage {
    InitReply {
        id: u32,
        name: Vec<u8>,
        hw_addr: Vec<u8>,
        caps: u32,
        link_up: bool,
        media: u32,
        max_send: u32,
        max_recv: u32,
    },
    ConfigureReply { id: u32, result: i32 },
    SendReply { id: u32, result: i32 },
    ReceiveReply { id: u32, result: i32 },
    Status {
        id: u32,
        link_up: bool,
        media: u32,
        oerror: u32,
        coll: u32,
        ierror: u32,
        iqdrop: u32,
    },
    Other,
}

/// Parses a raw message buffer. Unrecognized tags decode as
/// [`InboundMessage::Other`] rather than an error, for forward
/// compatibility with future message kinds.
pub fn decode(mut bytes: &[u8]) -> io::Result<InboundMessage> {
    let tag = bytes.read_u8()?;
    match tag {
        TAG_INIT_REPLY => {
            let id = bytes.read_u32::<LittleEndian>()?;
            let mut name = vec![0u8; crate::config::LABEL_MAX];
            bytes.read_exact(&mut name)?;
            let mut hw_addr = vec![0u8; HW_ADDR_MAX];
            bytes.read_exact(&mut hw_addr)?;
            let hw_addr_len = bytes.read_u8()? as usize;
            hw_addr.truncate(hw_addr_len.min(HW_ADDR_MAX));
            let caps = bytes.read_u32::<LittleEndian>()?;
            let link_up = bytes.read_u8()? != 0;
            let media = bytes.read_u32::<LittleEndian>()?;
            let max_send = bytes.read_u32::<LittleEndian>()?;
            let max_recv = bytes.read_u32::<LittleEndian>()?;
            Ok(InboundMessage::InitReply {
                id,
                name: trim_nul(&name),
                hw_addr,
                caps,
                link_up,
                media,
                max_send,
                max_recv,
            })
        }
        TAG_CONFIGURE_REPLY => Ok(InboundMessage::ConfigureReply {
            id: bytes.read_u32::<LittleEndian>()?,
            result: bytes.read_i32::<LittleEndian>()?,
        }),
        TAG_SEND_REPLY => Ok(InboundMessage::SendReply {
            id: bytes.read_u32::<LittleEndian>()?,
            result: bytes.read_i32::<LittleEndian>()?,
        }),
        TAG_RECEIVE_REPLY => Ok(InboundMessage::ReceiveReply {
            id: bytes.read_u32::<LittleEndian>()?,
            result: bytes.read_i32::<LittleEndian>()?,
        }),
        TAG_STATUS => Ok(InboundMessage::Status {
            id: bytes.read_u32::<LittleEndian>()?,
            link_up: bytes.read_u8()? != 0,
            media: bytes.read_u32::<LittleEndian>()?,
            oerror: bytes.read_u32::<LittleEndian>()?,
            coll: bytes.read_u32::<LittleEndian>()?,
            ierror: bytes.read_u32::<LittleEndian>()?,
            iqdrop: bytes.read_u32::<LittleEndian>()?,
        }),
        _ => Ok(InboundMessage::Other),
    }
}

fn trim_nul(buf: &[u8]) -> Vec<u8> {
    match buf.iter().position(|&b| b == 0) {
        Some(pos) => buf[..pos].to_vec(),
        None => buf.to_vec(),
    }
}

// Only used by tests in this module; the request/reply tag constants
// above are asserted not to collide, which would otherwise silently
// misparse messages.
#[allow(dead_code)]
fn all_tags() -> [u8; 10] {
    [
        TAG_INIT_REQUEST,
        TAG_INIT_REPLY,
        TAG_CONFIGURE_REQUEST,
        TAG_CONFIGURE_REPLY,
        TAG_SEND_REQUEST,
        TAG_SEND_REPLY,
        TAG_RECEIVE_REQUEST,
        TAG_RECEIVE_REPLY,
        TAG_STATUS,
        TAG_STATUS_REPLY,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_pairwise_distinct() {
        let tags = all_tags();
        for i in 0..tags.len() {
            for j in (i + 1)..tags.len() {
                assert_ne!(tags[i], tags[j]);
            }
        }
    }

    #[test]
    fn init_request_round_trips_the_id() {
        let encoded = OutboundMessage::Init { id: 0xdead_beef }.encode();
        assert_eq!(encoded[0], TAG_INIT_REQUEST);
        assert_eq!(&encoded[1..5], &0xdead_beefu32.to_le_bytes());
    }

    #[test]
    fn status_reply_decodes_back_to_its_fields() {
        let mut bytes = Vec::new();
        bytes.write_u8(TAG_STATUS).unwrap();
        bytes.write_u32::<LittleEndian>(42).unwrap();
        bytes.write_u8(1).unwrap();
        bytes.write_u32::<LittleEndian>(1000).unwrap();
        bytes.write_u32::<LittleEndian>(0).unwrap();
        bytes.write_u32::<LittleEndian>(0).unwrap();
        bytes.write_u32::<LittleEndian>(0).unwrap();
        bytes.write_u32::<LittleEndian>(0).unwrap();

        match decode(&bytes).unwrap() {
            InboundMessage::Status { id, link_up, media, .. } => {
                assert_eq!(id, 42);
                assert!(link_up);
                assert_eq!(media, 1000);
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn unknown_tag_decodes_as_other() {
        let bytes = [0xff_u8];
        assert!(matches!(decode(&bytes).unwrap(), InboundMessage::Other));
    }

    #[test]
    fn configure_set_bits_round_trip() {
        let set = ConfigureSet { mode: true, media: true, ..Default::default() };
        let bits = set.to_bits();
        assert_eq!(ConfigureSet::from_bits(bits), set);
    }
}
