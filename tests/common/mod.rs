//! In-process SNMP stub agent for end-to-end tests.
//!
//! Speaks just enough BER to answer GET, GETNEXT and GETBULK requests
//! from a canned, sorted set of variable bindings. Request ids are
//! echoed back, so the real UDP session code path is exercised
//! unmodified.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_NO_SUCH_INSTANCE: u8 = 0x81;
const TAG_END_OF_MIB_VIEW: u8 = 0x82;
const TAG_GET: u8 = 0xA0;
const TAG_GET_NEXT: u8 = 0xA1;
const TAG_RESPONSE: u8 = 0xA2;
const TAG_GET_BULK: u8 = 0xA5;

/// One canned varbind: OID components, value tag, value content bytes.
#[derive(Clone)]
pub struct Entry {
    pub oid: Vec<u32>,
    pub tag: u8,
    pub content: Vec<u8>,
}

impl Entry {
    pub fn new(oid: &[u32], tag: u8, content: &[u8]) -> Entry {
        Entry {
            oid: oid.to_vec(),
            tag,
            content: content.to_vec(),
        }
    }

    /// An INTEGER entry.
    pub fn int(oid: &[u32], value: i64) -> Entry {
        Entry::new(oid, TAG_INTEGER, &encode_integer_content(value))
    }

    /// An OCTET STRING entry.
    pub fn string(oid: &[u32], value: &str) -> Entry {
        Entry::new(oid, TAG_OCTET_STRING, value.as_bytes())
    }

    /// A Counter32 entry.
    pub fn counter32(oid: &[u32], value: u32) -> Entry {
        Entry::new(oid, 0x41, &encode_unsigned_content(value as u64))
    }
}

/// A canned-response SNMP agent bound to an ephemeral localhost port.
pub struct StubAgent {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl StubAgent {
    /// Start the agent with the given varbinds (sorted internally).
    pub async fn start(mut entries: Vec<Entry>) -> StubAgent {
        entries.sort_by(|a, b| a.oid.cmp(&b.oid));
        let socket = Arc::new(
            UdpSocket::bind("127.0.0.1:0")
                .await
                .expect("bind stub agent"),
        );
        let addr = socket.local_addr().expect("local addr");

        let handle = tokio::spawn({
            let socket = Arc::clone(&socket);
            async move {
                let mut buf = vec![0u8; 65_507];
                loop {
                    let Ok((n, peer)) = socket.recv_from(&mut buf).await else {
                        return;
                    };
                    if let Some(response) = respond(&entries, &buf[..n]) {
                        let _ = socket.send_to(&response, peer).await;
                    }
                }
            }
        });

        StubAgent { addr, handle }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Target string in `host:port` form.
    pub fn target(&self) -> String {
        self.addr.to_string()
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for StubAgent {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Build a response datagram for one request, or `None` for garbage.
fn respond(entries: &[Entry], request: &[u8]) -> Option<Vec<u8>> {
    let mut outer = Reader::new(request);
    let mut msg = outer.read_expect(TAG_SEQUENCE)?;

    let version = msg.read_integer()?;
    let community = msg.read_expect(TAG_OCTET_STRING)?.data.to_vec();
    let (pdu_tag, pdu_body) = msg.read_any()?;
    let mut pdu = Reader::new(pdu_body);

    let request_id = pdu.read_integer()?;
    let _status_or_nonrep = pdu.read_integer()?;
    let max_repetitions = pdu.read_integer()?;

    let mut list = pdu.read_expect(TAG_SEQUENCE)?;
    let mut requested = Vec::new();
    while !list.is_empty() {
        let mut vb = list.read_expect(TAG_SEQUENCE)?;
        let oid_content = vb.read_expect(TAG_OID)?.data;
        requested.push(decode_oid(oid_content));
        let _ = vb.read_any()?;
    }

    let varbinds = match pdu_tag {
        TAG_GET => requested
            .iter()
            .map(|oid| {
                entries
                    .iter()
                    .find(|e| &e.oid == oid)
                    .cloned()
                    .unwrap_or_else(|| Entry::new(oid, TAG_NO_SUCH_INSTANCE, &[]))
            })
            .collect(),
        TAG_GET_NEXT => requested.iter().map(|oid| next_entry(entries, oid)).collect(),
        TAG_GET_BULK => {
            let mut out = Vec::new();
            let mut cursor = requested.first()?.clone();
            for _ in 0..max_repetitions.max(1) {
                let entry = next_entry(entries, &cursor);
                cursor = entry.oid.clone();
                let end = entry.tag == TAG_END_OF_MIB_VIEW;
                out.push(entry);
                if end {
                    break;
                }
            }
            out
        }
        _ => return None,
    };

    Some(encode_response(version, &community, request_id, &varbinds))
}

/// First entry strictly after `oid`, or an endOfMibView marker.
fn next_entry(entries: &[Entry], oid: &[u32]) -> Entry {
    entries
        .iter()
        .find(|e| e.oid.as_slice() > oid)
        .cloned()
        .unwrap_or_else(|| Entry::new(oid, TAG_END_OF_MIB_VIEW, &[]))
}

fn encode_response(version: i64, community: &[u8], request_id: i64, varbinds: &[Entry]) -> Vec<u8> {
    let mut list = Vec::new();
    for entry in varbinds {
        let mut vb = Vec::new();
        push_tlv(&mut vb, TAG_OID, &encode_oid(&entry.oid));
        push_tlv(&mut vb, entry.tag, &entry.content);
        push_tlv(&mut list, TAG_SEQUENCE, &vb);
    }

    let mut pdu = Vec::new();
    push_tlv(&mut pdu, TAG_INTEGER, &encode_integer_content(request_id));
    push_tlv(&mut pdu, TAG_INTEGER, &[0]);
    push_tlv(&mut pdu, TAG_INTEGER, &[0]);
    push_tlv(&mut pdu, TAG_SEQUENCE, &list);

    let mut body = Vec::new();
    push_tlv(&mut body, TAG_INTEGER, &encode_integer_content(version));
    push_tlv(&mut body, TAG_OCTET_STRING, community);
    push_tlv(&mut body, TAG_RESPONSE, &pdu);

    let mut message = Vec::new();
    push_tlv(&mut message, TAG_SEQUENCE, &body);
    message
}

// --- Minimal BER helpers -------------------------------------------------

pub fn push_tlv(buf: &mut Vec<u8>, tag: u8, content: &[u8]) {
    buf.push(tag);
    if content.len() < 0x80 {
        buf.push(content.len() as u8);
    } else {
        let bytes = content.len().to_be_bytes();
        let skip = bytes.iter().take_while(|&&b| b == 0).count();
        buf.push(0x80 | (bytes.len() - skip) as u8);
        buf.extend_from_slice(&bytes[skip..]);
    }
    buf.extend_from_slice(content);
}

pub fn encode_integer_content(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < 7 {
        let cur = bytes[start];
        let next_msb = bytes[start + 1] & 0x80;
        if (cur == 0x00 && next_msb == 0) || (cur == 0xFF && next_msb != 0) {
            start += 1;
        } else {
            break;
        }
    }
    bytes[start..].to_vec()
}

pub fn encode_unsigned_content(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes
        .iter()
        .take_while(|&&b| b == 0)
        .count()
        .min(bytes.len() - 1);
    let mut out = bytes[skip..].to_vec();
    if out[0] & 0x80 != 0 {
        out.insert(0, 0);
    }
    out
}

pub fn encode_oid(arcs: &[u32]) -> Vec<u8> {
    let mut out = Vec::new();
    if arcs.is_empty() {
        return out;
    }
    let first = if arcs.len() >= 2 {
        arcs[0] * 40 + arcs[1]
    } else {
        arcs[0] * 40
    };
    push_subid(&mut out, first);
    for &arc in arcs.iter().skip(2) {
        push_subid(&mut out, arc);
    }
    out
}

fn push_subid(out: &mut Vec<u8>, value: u32) {
    if value == 0 {
        out.push(0);
        return;
    }
    let mut groups = Vec::new();
    let mut v = value;
    while v > 0 {
        groups.push((v & 0x7F) as u8);
        v >>= 7;
    }
    groups.reverse();
    let last = groups.len() - 1;
    for (i, g) in groups.into_iter().enumerate() {
        out.push(if i < last { g | 0x80 } else { g });
    }
}

fn decode_oid(content: &[u8]) -> Vec<u32> {
    let mut arcs = Vec::new();
    let mut iter = content.iter();
    let mut value: u32 = 0;
    let mut first = true;
    for &byte in iter.by_ref() {
        value = (value << 7) | (byte & 0x7F) as u32;
        if byte & 0x80 == 0 {
            if first {
                first = false;
                if value < 40 {
                    arcs.push(0);
                    arcs.push(value);
                } else if value < 80 {
                    arcs.push(1);
                    arcs.push(value - 40);
                } else {
                    arcs.push(2);
                    arcs.push(value - 80);
                }
            } else {
                arcs.push(value);
            }
            value = 0;
        }
    }
    arcs
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn read_byte(&mut self) -> Option<u8> {
        let b = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn read_any(&mut self) -> Option<(u8, &'a [u8])> {
        let tag = self.read_byte()?;
        let first = self.read_byte()?;
        let len = if first < 0x80 {
            first as usize
        } else {
            let count = (first & 0x7F) as usize;
            let mut len = 0usize;
            for _ in 0..count {
                len = (len << 8) | self.read_byte()? as usize;
            }
            len
        };
        let end = self.pos.checked_add(len)?;
        if end > self.data.len() {
            return None;
        }
        let content = &self.data[self.pos..end];
        self.pos = end;
        Some((tag, content))
    }

    fn read_expect(&mut self, expected: u8) -> Option<Reader<'a>> {
        let (tag, content) = self.read_any()?;
        if tag != expected {
            return None;
        }
        Some(Reader::new(content))
    }

    fn read_integer(&mut self) -> Option<i64> {
        let (tag, content) = self.read_any()?;
        if tag != TAG_INTEGER || content.is_empty() {
            return None;
        }
        let mut value: i64 = if content[0] & 0x80 != 0 { -1 } else { 0 };
        for &byte in content.iter().take(8) {
            value = (value << 8) | byte as i64;
        }
        Some(value)
    }
}
