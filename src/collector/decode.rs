//! Index and value decoding.
//!
//! Two closely related jobs live here:
//!
//! - Interpreting the OID tail after a metric's base OID as a sequence of
//!   typed index values, rendering each as a label string and remembering
//!   the raw components for lookups.
//! - The canonical string rendering of a PDU value, used for
//!   string-valued metrics, lookups, and regex extraction. Byte values
//!   are routed back through the index renderer so both paths agree.

use crate::config::{IndexType, Metric};
use crate::error::{Error, Result};
use crate::oid::Oid;
use crate::value::{Pdu, PduKind, PduValue};
use std::collections::{BTreeMap, HashMap};

/// Split `oid` at `count`, right-padding the head with zeros.
///
/// Some devices omit trailing zero components in responses; padding
/// keeps fixed-width index types decodable.
pub fn split_oid(oid: &[u32], count: usize) -> (Vec<u32>, Vec<u32>) {
    let mut head = vec![0; count];
    for (slot, &component) in head.iter_mut().zip(oid.iter()) {
        *slot = component;
    }
    let tail = oid.get(count..).map(<[u32]>::to_vec).unwrap_or_default();
    (head, tail)
}

/// Decode one index value from the front of `oid`.
///
/// Returns the rendered label value, the components consumed (needed by
/// lookups), and the remaining components.
pub(crate) fn index_oids_as_string(
    oid: &[u32],
    typ: IndexType,
    fixed_size: usize,
) -> Result<(String, Vec<u32>, Vec<u32>)> {
    match typ {
        IndexType::Integer32 | IndexType::Integer | IndexType::Gauge | IndexType::Counter => {
            let (head, tail) = split_oid(oid, 1);
            Ok((head[0].to_string(), head, tail))
        }
        IndexType::PhysAddress48 => {
            let (head, tail) = split_oid(oid, 6);
            let rendered = head
                .iter()
                .map(|o| format!("{:02X}", o))
                .collect::<Vec<_>>()
                .join(":");
            Ok((rendered, head, tail))
        }
        IndexType::OctetString => {
            let (consumed, content, tail) = octets(oid, fixed_size);
            let rendered = if content.is_empty() {
                String::new()
            } else {
                let mut out = String::with_capacity(2 + content.len() * 2);
                out.push_str("0x");
                for o in &content {
                    out.push_str(&format!("{:02X}", *o as u8));
                }
                out
            };
            Ok((rendered, consumed, tail))
        }
        IndexType::DisplayString => {
            let (consumed, content, tail) = octets(oid, fixed_size);
            let bytes: Vec<u8> = content.iter().map(|&o| o as u8).collect();
            let rendered = String::from_utf8(bytes).map_err(|_| {
                Error::InvalidIndexValue(
                    format!("DisplayString index is not valid UTF-8: {:?}", content).into(),
                )
                .boxed()
            })?;
            Ok((rendered, consumed, tail))
        }
        IndexType::IpAddr => {
            let (head, tail) = split_oid(oid, 4);
            let rendered = head
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(".");
            Ok((rendered, head, tail))
        }
        IndexType::InetAddressType => {
            let (head, tail) = split_oid(oid, 1);
            let rendered = match head[0] {
                0 => "unknown".to_string(),
                1 => "ipv4".to_string(),
                2 => "ipv6".to_string(),
                3 => "ipv4z".to_string(),
                4 => "ipv6z".to_string(),
                16 => "dns".to_string(),
                other => other.to_string(),
            };
            Ok((rendered, head, tail))
        }
    }
}

/// Octet-string content extraction: fixed size from the declaration, or
/// length-prefixed when the declared size is 0. Returns (consumed
/// components including any length prefix, content components, rest).
fn octets(oid: &[u32], fixed_size: usize) -> (Vec<u32>, Vec<u32>, Vec<u32>) {
    let (mut consumed, length, rest) = if fixed_size == 0 {
        let (head, rest) = split_oid(oid, 1);
        (head.clone(), head[0] as usize, rest)
    } else {
        (Vec::new(), fixed_size, oid.to_vec())
    };
    let (content, rest) = split_oid(&rest, length);
    consumed.extend_from_slice(&content);
    (consumed, content, rest)
}

/// The canonical string rendering of a PDU value.
///
/// `typ` is the declared value type ("" when undeclared): it selects the
/// rendering of byte sequences, which reuse the index decoder so index
/// labels and looked-up labels agree. Unexpected runtime shapes bump
/// `snmp_unexpected_pdu_type_total` and fall back to a hex rendering.
pub fn pdu_value_as_string(pdu: &Pdu, typ: &str) -> Result<String> {
    match &pdu.value {
        PduValue::Int(v) => Ok(v.to_string()),
        PduValue::Uint(v) => Ok(v.to_string()),
        PduValue::Float(v) => Ok(format!("{}", v)),
        PduValue::Double(v) => Ok(format!("{}", v)),
        PduValue::Str(s) => {
            if pdu.kind == PduKind::ObjectIdentifier {
                Ok(s.strip_prefix('.').unwrap_or(s).to_string())
            } else {
                Ok(s.clone())
            }
        }
        PduValue::Bytes(bytes) => {
            let effective = if typ.is_empty() { "OctetString" } else { typ };
            let index_type = IndexType::from_name(effective)
                .ok_or_else(|| Error::UnknownIndexType(effective.into()).boxed())?;
            let mut parts: Vec<u32> = bytes.iter().map(|&b| b as u32).collect();
            if matches!(index_type, IndexType::OctetString | IndexType::DisplayString) {
                // The length is explicit in an index, so prepend it.
                parts.insert(0, bytes.len() as u32);
            }
            let (rendered, _, _) = index_oids_as_string(&parts, index_type, 0)?;
            Ok(rendered)
        }
        PduValue::Null => Ok(String::new()),
        PduValue::Unknown { tag, data } => {
            tracing::info!(
                target: "snmp_collector::scrape",
                oid = %pdu.oid,
                tag = *tag,
                "PDU with unexpected value shape"
            );
            super::UNEXPECTED_PDU_TYPE.inc();
            let mut out = String::with_capacity(2 + data.len() * 2);
            out.push_str("0x");
            for b in data {
                out.push_str(&format!("{:02X}", b));
            }
            Ok(out)
        }
    }
}

/// Decode the declared indexes from the OID tail, then apply lookups.
///
/// Index labels are set in declaration order; each lookup dereferences
/// `<lookup oid>.<raw arcs of its source labels>` in the scrape's PDU
/// index and sets its label to the rendered value, or to the empty
/// string when the OID is absent. A lookup may overwrite an index label.
pub fn indexes_to_labels(
    index_oids: &[u32],
    metric: &Metric,
    pdu_index: &HashMap<Oid, Pdu>,
) -> Result<BTreeMap<String, String>> {
    let mut labels = BTreeMap::new();
    let mut label_oids: HashMap<&str, Vec<u32>> = HashMap::new();

    let mut remaining = index_oids.to_vec();
    for index in &metric.indexes {
        let (value, consumed, rest) =
            index_oids_as_string(&remaining, index.index_type, index.fixed_size)?;
        labels.insert(index.labelname.clone(), value);
        // Keep the raw components in case a lookup needs them.
        label_oids.insert(index.labelname.as_str(), consumed);
        remaining = rest;
    }

    for lookup in &metric.lookups {
        let mut oid = Oid::parse(&lookup.oid)?;
        for label in &lookup.labels {
            if let Some(arcs) = label_oids.get(label.as_str()) {
                oid = oid.extend(arcs);
            }
        }
        let value = match pdu_index.get(&oid) {
            Some(pdu) => {
                let typ = lookup.lookup_type.map(IndexType::name).unwrap_or("");
                pdu_value_as_string(pdu, typ)?
            }
            None => String::new(),
        };
        labels.insert(lookup.labelname.clone(), value);
    }

    Ok(labels)
}

impl IndexType {
    /// The configuration name of this type.
    pub fn name(self) -> &'static str {
        match self {
            IndexType::Integer32 => "Integer32",
            IndexType::Integer => "Integer",
            IndexType::Gauge => "gauge",
            IndexType::Counter => "counter",
            IndexType::PhysAddress48 => "PhysAddress48",
            IndexType::OctetString => "OctetString",
            IndexType::DisplayString => "DisplayString",
            IndexType::IpAddr => "IpAddr",
            IndexType::InetAddressType => "InetAddressType",
        }
    }
}
