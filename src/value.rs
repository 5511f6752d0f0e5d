//! PDU value types.
//!
//! A scrape produces a flat sequence of [`Pdu`]s: one variable binding
//! each, carrying the OID, the SNMP wire type tag, and the decoded value.
//! The value is a tagged sum over the runtime shapes SNMP can deliver;
//! an `Unknown` arm preserves unrecognized wire types for forward
//! compatibility.

use crate::oid::Oid;
use bytes::Bytes;

/// SNMP wire type tag of a variable binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PduKind {
    /// INTEGER (signed 32-bit).
    Integer,
    /// OCTET STRING (arbitrary bytes).
    OctetString,
    /// NULL.
    Null,
    /// OBJECT IDENTIFIER.
    ObjectIdentifier,
    /// IpAddress (4 bytes, rendered dotted).
    IpAddress,
    /// Counter32 (unsigned 32-bit, wrapping).
    Counter32,
    /// Gauge32 / Unsigned32.
    Gauge32,
    /// TimeTicks (hundredths of seconds).
    TimeTicks,
    /// Opaque (legacy wrapper, arbitrary bytes).
    Opaque,
    /// Counter64 (unsigned 64-bit, wrapping). SNMPv2c/v3 only.
    Counter64,
    /// Opaque-wrapped IEEE 754 single float (RFC 6340 / net-snmp).
    OpaqueFloat,
    /// Opaque-wrapped IEEE 754 double float.
    OpaqueDouble,
    /// noSuchObject exception (v2c/v3).
    NoSuchObject,
    /// noSuchInstance exception (v2c/v3).
    NoSuchInstance,
    /// endOfMibView exception (v2c/v3).
    EndOfMibView,
    /// Unrecognized wire tag.
    Unknown(u8),
}

/// Decoded runtime value of a variable binding.
///
/// The arms mirror the shapes agents actually deliver: signed and
/// unsigned integers, floats, strings (OIDs and IP addresses arrive as
/// their dotted text form), raw bytes, and null. [`PduValue::Unknown`]
/// preserves the wire bytes of tags this crate does not understand.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum PduValue {
    /// Signed integer (INTEGER).
    Int(i64),
    /// Unsigned integer (Counter32, Gauge32, TimeTicks, Counter64).
    Uint(u64),
    /// Single-precision float (OpaqueFloat).
    Float(f32),
    /// Double-precision float (OpaqueDouble).
    Double(f64),
    /// Text value (ObjectIdentifier and IpAddress render as text).
    Str(String),
    /// Raw bytes (OCTET STRING, Opaque).
    Bytes(Bytes),
    /// No value (NULL and the v2c exception markers).
    Null,
    /// Unrecognized value shape, kept verbatim.
    Unknown { tag: u8, data: Bytes },
}

/// One variable binding returned from a scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct Pdu {
    /// The object identifier, leading separator already stripped.
    pub oid: Oid,
    /// SNMP wire type tag.
    pub kind: PduKind,
    /// Decoded runtime value.
    pub value: PduValue,
}

impl Pdu {
    /// Create a new variable binding.
    pub fn new(oid: Oid, kind: PduKind, value: PduValue) -> Self {
        Self { oid, kind, value }
    }

    /// Whether this binding carries a v2c per-variable exception instead
    /// of a value.
    pub fn is_exception(&self) -> bool {
        matches!(
            self.kind,
            PduKind::NoSuchObject | PduKind::NoSuchInstance | PduKind::EndOfMibView
        )
    }
}

/// Convert a PDU value to the numeric sample value.
///
/// - `Counter64` is reinterpreted as unsigned 64-bit, so values at or
///   above 2^63 stay positive.
/// - `OpaqueFloat` is widened from f32, `OpaqueDouble` passes through.
/// - Everything else goes through a signed 64-bit conversion, preserving
///   negative integers.
pub fn pdu_value(pdu: &Pdu) -> f64 {
    match pdu.kind {
        PduKind::Counter64 => match pdu.value {
            PduValue::Uint(v) => v as f64,
            _ => as_i64(&pdu.value) as f64,
        },
        PduKind::OpaqueFloat => match pdu.value {
            PduValue::Float(v) => v as f64,
            _ => as_i64(&pdu.value) as f64,
        },
        PduKind::OpaqueDouble => match pdu.value {
            PduValue::Double(v) => v,
            _ => as_i64(&pdu.value) as f64,
        },
        _ => as_i64(&pdu.value) as f64,
    }
}

/// Signed 64-bit view of a value, zero for non-numeric shapes.
fn as_i64(value: &PduValue) -> i64 {
    match value {
        PduValue::Int(v) => *v,
        PduValue::Uint(v) => *v as i64,
        PduValue::Float(v) => *v as i64,
        PduValue::Double(v) => *v as i64,
        _ => 0,
    }
}
