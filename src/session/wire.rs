//! Compact BER codec for community-based SNMP messages.
//!
//! Covers exactly what the UDP backend needs: encoding GET, GETNEXT and
//! GETBULK requests, and decoding response messages into [`Pdu`]s. The
//! decoder is permissive where agents commonly deviate (over-long
//! integers are truncated, unknown value tags are preserved verbatim).

use crate::config::Version;
use crate::oid::Oid;
use crate::value::{Pdu, PduKind, PduValue};
use bytes::Bytes;

// Universal tags.
const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;

// SNMP application tags.
const TAG_IP_ADDRESS: u8 = 0x40;
const TAG_COUNTER32: u8 = 0x41;
const TAG_GAUGE32: u8 = 0x42;
const TAG_TIMETICKS: u8 = 0x43;
const TAG_OPAQUE: u8 = 0x44;
const TAG_COUNTER64: u8 = 0x46;

// v2c per-variable exceptions.
const TAG_NO_SUCH_OBJECT: u8 = 0x80;
const TAG_NO_SUCH_INSTANCE: u8 = 0x81;
const TAG_END_OF_MIB_VIEW: u8 = 0x82;

// PDU type tags.
const TAG_GET_REQUEST: u8 = 0xA0;
const TAG_GET_NEXT_REQUEST: u8 = 0xA1;
const TAG_RESPONSE: u8 = 0xA2;
const TAG_GET_BULK_REQUEST: u8 = 0xA5;
const TAG_REPORT: u8 = 0xA8;

// Opaque-wrapped floats (net-snmp convention): a nested TLV with a
// two-byte tag 0x9F 0x78 (float) or 0x9F 0x79 (double).
const OPAQUE_FLOAT_TAG: u8 = 0x78;
const OPAQUE_DOUBLE_TAG: u8 = 0x79;

/// Request operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestKind {
    Get,
    GetNext,
    GetBulk {
        non_repeaters: i32,
        max_repetitions: i32,
    },
}

impl Version {
    /// On-the-wire version number (RFC 1157 / RFC 1901).
    fn wire(self) -> i64 {
        match self {
            Version::V1 => 0,
            Version::V2c => 1,
            Version::V3 => 3,
        }
    }
}

/// Encode a community request message.
pub(crate) fn encode_request(
    version: Version,
    community: &[u8],
    kind: RequestKind,
    request_id: i32,
    oids: &[Oid],
) -> Vec<u8> {
    let (pdu_tag, status, index) = match kind {
        RequestKind::Get => (TAG_GET_REQUEST, 0, 0),
        RequestKind::GetNext => (TAG_GET_NEXT_REQUEST, 0, 0),
        RequestKind::GetBulk {
            non_repeaters,
            max_repetitions,
        } => (TAG_GET_BULK_REQUEST, non_repeaters, max_repetitions),
    };

    let mut varbinds = Vec::new();
    for oid in oids {
        let mut vb = Vec::new();
        push_tlv(&mut vb, TAG_OID, &oid.to_ber());
        push_tlv(&mut vb, TAG_NULL, &[]);
        push_tlv(&mut varbinds, TAG_SEQUENCE, &vb);
    }

    let mut pdu = Vec::new();
    push_integer(&mut pdu, request_id as i64);
    push_integer(&mut pdu, status as i64);
    push_integer(&mut pdu, index as i64);
    push_tlv(&mut pdu, TAG_SEQUENCE, &varbinds);

    let mut body = Vec::new();
    push_integer(&mut body, version.wire());
    push_tlv(&mut body, TAG_OCTET_STRING, community);
    push_tlv(&mut body, pdu_tag, &pdu);

    let mut message = Vec::new();
    push_tlv(&mut message, TAG_SEQUENCE, &body);
    message
}

/// A decoded response message.
#[derive(Debug, Clone)]
pub(crate) struct Response {
    pub version: i64,
    pub request_id: i32,
    pub error_status: i32,
    pub error_index: i32,
    pub varbinds: Vec<Pdu>,
}

/// Decode a response message. `None` means the datagram is malformed or
/// not a Response/Report PDU.
pub(crate) fn decode_response(data: &[u8]) -> Option<Response> {
    let mut outer = Reader::new(data);
    let mut msg = outer.read_sequence()?;

    let version = msg.read_integer()?;
    let _community = msg.read_tlv(TAG_OCTET_STRING)?;

    let (pdu_tag, pdu_body) = msg.read_any_tlv()?;
    if pdu_tag != TAG_RESPONSE && pdu_tag != TAG_REPORT {
        return None;
    }

    let mut pdu = Reader::new(pdu_body);
    let request_id = pdu.read_integer()? as i32;
    let error_status = pdu.read_integer()? as i32;
    let error_index = pdu.read_integer()? as i32;

    let mut list = pdu.read_sequence()?;
    let mut varbinds = Vec::new();
    while !list.is_empty() {
        let mut vb = list.read_sequence()?;
        let oid_content = vb.read_tlv(TAG_OID)?;
        let oid = Oid::from_ber(oid_content)?;
        let (tag, content) = vb.read_any_tlv()?;
        let (kind, value) = decode_value(tag, content)?;
        varbinds.push(Pdu::new(oid, kind, value));
    }

    Some(Response {
        version,
        request_id,
        error_status,
        error_index,
        varbinds,
    })
}

fn decode_value(tag: u8, content: &[u8]) -> Option<(PduKind, PduValue)> {
    Some(match tag {
        TAG_INTEGER => (PduKind::Integer, PduValue::Int(decode_signed(content))),
        TAG_OCTET_STRING => (
            PduKind::OctetString,
            PduValue::Bytes(Bytes::copy_from_slice(content)),
        ),
        TAG_NULL => (PduKind::Null, PduValue::Null),
        TAG_OID => {
            let oid = Oid::from_ber(content)?;
            (PduKind::ObjectIdentifier, PduValue::Str(oid.to_string()))
        }
        TAG_IP_ADDRESS => {
            if content.len() != 4 {
                return None;
            }
            (
                PduKind::IpAddress,
                PduValue::Str(format!(
                    "{}.{}.{}.{}",
                    content[0], content[1], content[2], content[3]
                )),
            )
        }
        TAG_COUNTER32 => (PduKind::Counter32, PduValue::Uint(decode_unsigned(content))),
        TAG_GAUGE32 => (PduKind::Gauge32, PduValue::Uint(decode_unsigned(content))),
        TAG_TIMETICKS => (PduKind::TimeTicks, PduValue::Uint(decode_unsigned(content))),
        TAG_COUNTER64 => (PduKind::Counter64, PduValue::Uint(decode_unsigned(content))),
        TAG_OPAQUE => decode_opaque(content),
        TAG_NO_SUCH_OBJECT => (PduKind::NoSuchObject, PduValue::Null),
        TAG_NO_SUCH_INSTANCE => (PduKind::NoSuchInstance, PduValue::Null),
        TAG_END_OF_MIB_VIEW => (PduKind::EndOfMibView, PduValue::Null),
        other => (
            PduKind::Unknown(other),
            PduValue::Unknown {
                tag: other,
                data: Bytes::copy_from_slice(content),
            },
        ),
    })
}

/// Opaque values may wrap a float or double in a nested two-byte-tag TLV.
fn decode_opaque(content: &[u8]) -> (PduKind, PduValue) {
    if content.len() >= 2 && content[0] == 0x9F {
        let mut inner = Reader::new(&content[1..]);
        if let Some((tag, body)) = inner.read_any_tlv() {
            match tag {
                OPAQUE_FLOAT_TAG if body.len() == 4 => {
                    let bits = [body[0], body[1], body[2], body[3]];
                    return (PduKind::OpaqueFloat, PduValue::Float(f32::from_be_bytes(bits)));
                }
                OPAQUE_DOUBLE_TAG if body.len() == 8 => {
                    let mut bits = [0u8; 8];
                    bits.copy_from_slice(body);
                    return (
                        PduKind::OpaqueDouble,
                        PduValue::Double(f64::from_be_bytes(bits)),
                    );
                }
                _ => {}
            }
        }
    }
    (PduKind::Opaque, PduValue::Bytes(Bytes::copy_from_slice(content)))
}

// ---------------------------------------------------------------------------
// Primitive encoding
// ---------------------------------------------------------------------------

/// Append tag, definite length, and content.
fn push_tlv(buf: &mut Vec<u8>, tag: u8, content: &[u8]) {
    buf.push(tag);
    push_length(buf, content.len());
    buf.extend_from_slice(content);
}

fn push_length(buf: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        buf.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    buf.push(0x80 | (bytes.len() - skip) as u8);
    buf.extend_from_slice(&bytes[skip..]);
}

/// Append a minimally-encoded two's-complement INTEGER.
fn push_integer(buf: &mut Vec<u8>, value: i64) {
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
    push_tlv(buf, TAG_INTEGER, &bytes[start..]);
}

fn decode_signed(content: &[u8]) -> i64 {
    if content.is_empty() {
        return 0;
    }
    let mut value: i64 = if content[0] & 0x80 != 0 { -1 } else { 0 };
    for &byte in content.iter().take(8) {
        value = (value << 8) | (byte as i64);
    }
    value
}

fn decode_unsigned(content: &[u8]) -> u64 {
    let mut value: u64 = 0;
    // Skip a leading 0x00 sign pad, then take at most 8 bytes.
    let trimmed = if content.first() == Some(&0) {
        &content[1..]
    } else {
        content
    };
    for &byte in trimmed.iter().take(8) {
        value = (value << 8) | (byte as u64);
    }
    value
}

// ---------------------------------------------------------------------------
// Primitive decoding
// ---------------------------------------------------------------------------

/// Cursor over a byte slice with TLV helpers.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn read_byte(&mut self) -> Option<u8> {
        let byte = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(byte)
    }

    fn read_length(&mut self) -> Option<usize> {
        let first = self.read_byte()?;
        if first < 0x80 {
            return Some(first as usize);
        }
        // Indefinite lengths (0x80) are not valid in SNMP.
        let count = (first & 0x7F) as usize;
        if count == 0 || count > std::mem::size_of::<usize>() {
            return None;
        }
        let mut len: usize = 0;
        for _ in 0..count {
            len = (len << 8) | (self.read_byte()? as usize);
        }
        Some(len)
    }

    fn read_content(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        if end > self.data.len() {
            return None;
        }
        let content = &self.data[self.pos..end];
        self.pos = end;
        Some(content)
    }

    /// Read any TLV, returning (tag, content).
    fn read_any_tlv(&mut self) -> Option<(u8, &'a [u8])> {
        let tag = self.read_byte()?;
        let len = self.read_length()?;
        Some((tag, self.read_content(len)?))
    }

    /// Read a TLV with a specific tag.
    fn read_tlv(&mut self, expected: u8) -> Option<&'a [u8]> {
        let (tag, content) = self.read_any_tlv()?;
        if tag != expected {
            return None;
        }
        Some(content)
    }

    fn read_sequence(&mut self) -> Option<Reader<'a>> {
        Some(Reader::new(self.read_tlv(TAG_SEQUENCE)?))
    }

    fn read_integer(&mut self) -> Option<i64> {
        let content = self.read_tlv(TAG_INTEGER)?;
        if content.is_empty() {
            return None;
        }
        Some(decode_signed(content))
    }
}

// ---------------------------------------------------------------------------
// Response building (for the mock and tests)
// ---------------------------------------------------------------------------

/// Encode a response message. Only tests need this; agents do it for
/// us in production.
#[allow(dead_code)]
pub(crate) fn encode_response(
    version: Version,
    community: &[u8],
    request_id: i32,
    error_status: i32,
    error_index: i32,
    varbinds: &[(Oid, u8, Vec<u8>)],
) -> Vec<u8> {
    let mut list = Vec::new();
    for (oid, tag, content) in varbinds {
        let mut vb = Vec::new();
        push_tlv(&mut vb, TAG_OID, &oid.to_ber());
        push_tlv(&mut vb, *tag, content);
        push_tlv(&mut list, TAG_SEQUENCE, &vb);
    }

    let mut pdu = Vec::new();
    push_integer(&mut pdu, request_id as i64);
    push_integer(&mut pdu, error_status as i64);
    push_integer(&mut pdu, error_index as i64);
    push_tlv(&mut pdu, TAG_SEQUENCE, &list);

    let mut body = Vec::new();
    push_integer(&mut body, version.wire());
    push_tlv(&mut body, TAG_OCTET_STRING, community);
    push_tlv(&mut body, TAG_RESPONSE, &pdu);

    let mut message = Vec::new();
    push_tlv(&mut message, TAG_SEQUENCE, &body);
    message
}
