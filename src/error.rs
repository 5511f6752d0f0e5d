//! Error types for snmp-collector.
//!
//! One enum covers every failure mode of a scrape: network and timeout
//! failures from the transport, SNMP packet-level errors, malformed
//! responses, aborted walks, and configuration problems.
//!
//! Errors are boxed for efficiency: `Result<T> = Result<T, Box<Error>>`.

use std::net::SocketAddr;
use std::time::Duration;

/// Placeholder target address used when no target is known.
///
/// This sentinel (0.0.0.0:0) appears in error contexts where the target
/// address cannot be determined, e.g. packet errors surfaced through the
/// session abstraction.
pub(crate) const UNKNOWN_TARGET: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0)),
    0,
);

/// Result type alias using the crate's boxed [`Error`].
pub type Result<T> = std::result::Result<T, Box<Error>>;

/// The main error type for all scrape operations.
///
/// Errors are boxed (via [`Result`]) to keep `Result` pointer-sized on
/// the happy path.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Network failure (connection refused, unreachable, etc.)
    #[error("network error communicating with {target}: {source}")]
    Network {
        target: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Request timed out after retries.
    #[error("timeout after {elapsed:?} waiting for {target} ({retries} retries)")]
    Timeout {
        target: SocketAddr,
        elapsed: Duration,
        retries: u32,
    },

    /// SNMP packet-level error reported by the agent.
    #[error("error reported by target {target}: {status} at index {index}")]
    Packet {
        target: SocketAddr,
        status: ErrorStatus,
        index: u32,
    },

    /// Malformed response from the agent.
    #[error("malformed response from {target}")]
    MalformedResponse { target: SocketAddr },

    /// Walk aborted because the agent returned OIDs out of order.
    #[error("walk aborted for {target}: non-increasing OID {current} after {previous}")]
    WalkAborted {
        target: SocketAddr,
        previous: crate::oid::Oid,
        current: crate::oid::Oid,
    },

    /// Target string could not be resolved to a host and port.
    #[error("invalid target {target}: {reason}")]
    InvalidTarget { target: Box<str>, reason: Box<str> },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(Box<str>),

    /// Invalid OID format.
    #[error("invalid OID: {0}")]
    InvalidOid(Box<str>),

    /// An index type name that the decoder does not know.
    ///
    /// Index declarations are enum-typed and validated at config load, so
    /// this is only reachable through free-form metric type strings that
    /// feed the byte-sequence renderer.
    #[error("unknown index type: {0}")]
    UnknownIndexType(Box<str>),

    /// An index value that cannot be rendered as a label (e.g. invalid
    /// UTF-8 in a DisplayString index). Surfaced as an inline invalid
    /// sample; never aborts the scrape.
    #[error("invalid index value: {0}")]
    InvalidIndexValue(Box<str>),
}

impl Error {
    /// Box this error (convenience for constructing boxed errors).
    pub fn boxed(self) -> Box<Self> {
        Box::new(self)
    }

    /// Shorthand for a configuration error.
    pub fn config(msg: impl Into<Box<str>>) -> Box<Self> {
        Error::Config(msg.into()).boxed()
    }
}

/// SNMP packet-level error status codes (RFC 3416).
///
/// Returned by agents in the response PDU header. Only a handful matter
/// to the scrape driver: `NoError`, and `NoSuchName` which SNMPv1 agents
/// use to flag unsupported OIDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorStatus {
    /// Operation completed successfully (status = 0).
    NoError,
    /// Response would be too large for transport (status = 1).
    TooBig,
    /// Requested OID not found (status = 2). SNMPv1 only; v2c+ uses
    /// per-variable exception values.
    NoSuchName,
    /// Invalid value provided in a SET request (status = 3).
    BadValue,
    /// Attempted to SET a read-only object (status = 4).
    ReadOnly,
    /// Unspecified error (status = 5).
    GenErr,
    /// Any other or future status code.
    Unknown(i32),
}

impl ErrorStatus {
    /// Create from the raw status code.
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::NoError,
            1 => Self::TooBig,
            2 => Self::NoSuchName,
            3 => Self::BadValue,
            4 => Self::ReadOnly,
            5 => Self::GenErr,
            other => Self::Unknown(other),
        }
    }

    /// Convert to the raw status code.
    pub fn as_i32(&self) -> i32 {
        match self {
            Self::NoError => 0,
            Self::TooBig => 1,
            Self::NoSuchName => 2,
            Self::BadValue => 3,
            Self::ReadOnly => 4,
            Self::GenErr => 5,
            Self::Unknown(code) => *code,
        }
    }
}

impl std::fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoError => write!(f, "noError"),
            Self::TooBig => write!(f, "tooBig"),
            Self::NoSuchName => write!(f, "noSuchName"),
            Self::BadValue => write!(f, "badValue"),
            Self::ReadOnly => write!(f, "readOnly"),
            Self::GenErr => write!(f, "genErr"),
            Self::Unknown(code) => write!(f, "unknown({})", code),
        }
    }
}
