//! SNMP session abstraction.
//!
//! The scrape driver talks to devices through the narrow [`SnmpSession`]
//! trait: batched GETs, subtree walks, and a close call. The trait keeps
//! the wire library swappable; the crate bundles a v1/v2c UDP backend
//! ([`UdpSession`]) and a programmable test double ([`MockSession`]).
//!
//! [`SessionConfig`] is the record a backend is configured from. The
//! mapping from module configuration to session configuration (version
//! selection, the SNMPv3 security-level ladder, target parsing, the
//! session timeout budget) lives in [`WalkParams::session_config`].

mod mock;
mod udp;
pub(crate) mod wire;

pub use mock::MockSession;
pub use udp::UdpSession;

use crate::config::{AuthProtocol, PrivProtocol, Secret, SecurityLevel, Version, WalkParams};
use crate::error::{Error, ErrorStatus, Result};
use crate::oid::Oid;
use crate::value::Pdu;
use std::future::Future;
use std::time::Duration;

/// Default SNMP agent port.
pub const DEFAULT_PORT: u16 = 161;

/// One GET response: the packet-level error header plus the returned
/// variable bindings.
#[derive(Debug, Clone, Default)]
pub struct Packet {
    /// Packet-level error status.
    pub error_status: i32,
    /// 1-based index of the offending varbind, 0 when not applicable.
    pub error_index: i32,
    /// Returned variable bindings.
    pub variables: Vec<Pdu>,
}

impl Packet {
    /// Error status as an enum.
    pub fn status(&self) -> ErrorStatus {
        ErrorStatus::from_i32(self.error_status)
    }
}

/// The injected SNMP capability.
///
/// One session serves one scrape: the driver issues GETs and walks, then
/// closes the session on every exit path. Methods return
/// `impl Future + Send` so implementations stay object-safe-free and
/// allocation-free at the trait boundary.
pub trait SnmpSession: Send + Sync {
    /// Issue a single GET for the given OIDs.
    ///
    /// Packet-level errors are returned inside the [`Packet`], not as an
    /// `Err`; the driver decides which statuses are fatal.
    fn get(&self, oids: &[Oid]) -> impl Future<Output = Result<Packet>> + Send;

    /// Walk the subtree under `root` using GETNEXT.
    fn walk_all(&self, root: &Oid) -> impl Future<Output = Result<Vec<Pdu>>> + Send;

    /// Walk the subtree under `root` using GETBULK.
    fn bulk_walk_all(&self, root: &Oid) -> impl Future<Output = Result<Vec<Pdu>>> + Send;

    /// Release the session. Must be called on success and failure paths
    /// alike.
    fn close(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Configuration a session backend is built from.
///
/// Produced by [`WalkParams::session_config`]; every field the driver is
/// responsible for is populated before a backend sees it.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Target host (name or address), without the port.
    pub host: String,
    /// Target UDP port.
    pub port: u16,
    /// SNMP version.
    pub version: Version,
    /// v1/v2c community string.
    pub community: Secret,
    /// SNMPv3 context name.
    pub context_name: String,
    /// SNMPv3 security level (message flags).
    pub security_level: SecurityLevel,
    /// SNMPv3 username.
    pub username: String,
    /// SNMPv3 authentication protocol and passphrase, when the security
    /// level enables authentication.
    pub auth: Option<(AuthProtocol, Secret)>,
    /// SNMPv3 privacy protocol and passphrase, when the security level
    /// enables privacy.
    pub privacy: Option<(PrivProtocol, Secret)>,
    /// Max-repetitions for GETBULK.
    pub max_repetitions: u8,
    /// Retries per request.
    pub retries: u32,
    /// Total session budget: per-attempt timeout times retries.
    pub timeout: Duration,
}

impl WalkParams {
    /// Map module configuration onto a [`SessionConfig`] for `target`.
    ///
    /// The target is `host` or `host:port` (bracketed IPv6 accepted);
    /// the port defaults to 161. The session timeout budget is the
    /// per-attempt timeout multiplied by the retry count.
    pub fn session_config(&self, target: &str) -> Result<SessionConfig> {
        let (host, port) = split_host_port(target)?;

        let auth = &self.auth;
        let with_auth = auth.security_level >= SecurityLevel::AuthNoPriv;
        let with_priv = auth.security_level >= SecurityLevel::AuthPriv;

        Ok(SessionConfig {
            host,
            port,
            version: self.version,
            community: auth.community.clone(),
            context_name: auth.context_name.clone(),
            security_level: auth.security_level,
            username: auth.username.clone(),
            auth: with_auth.then(|| (auth.auth_protocol, auth.password.clone())),
            privacy: with_priv.then(|| (auth.priv_protocol, auth.priv_password.clone())),
            max_repetitions: self.max_repetitions,
            retries: self.retries,
            timeout: self.timeout * self.retries.max(1),
        })
    }
}

/// Split `host`, `host:port` or `[v6]:port`; default port 161.
///
/// A bare IPv6 address (multiple colons, no brackets) is taken as a host
/// without a port, matching the usual host/port split behavior.
fn split_host_port(target: &str) -> Result<(String, u16)> {
    let invalid = |reason: &str| {
        Error::InvalidTarget {
            target: target.into(),
            reason: reason.into(),
        }
        .boxed()
    };

    if let Some(rest) = target.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| invalid("unmatched '[' in target"))?;
        return match after.strip_prefix(':') {
            Some(port) => {
                let port = port.parse().map_err(|_| invalid("invalid port number"))?;
                Ok((host.to_string(), port))
            }
            None if after.is_empty() => Ok((host.to_string(), DEFAULT_PORT)),
            None => Err(invalid("unexpected characters after ']'")),
        };
    }

    match target.split_once(':') {
        // More than one colon: bare IPv6 address, no port.
        Some((_, rest)) if rest.contains(':') => Ok((target.to_string(), DEFAULT_PORT)),
        Some((host, port)) => {
            let port = port.parse().map_err(|_| invalid("invalid port number"))?;
            Ok((host.to_string(), port))
        }
        None => Ok((target.to_string(), DEFAULT_PORT)),
    }
}
