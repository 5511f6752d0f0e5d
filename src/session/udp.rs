//! UDP session backend for SNMPv1 and v2c.
//!
//! One connected socket per session; requests run sequentially with a
//! per-attempt timeout and retransmission. SNMPv3 configurations are
//! rejected at connect time: USM message security belongs to an external
//! backend implementing [`SnmpSession`].

use super::wire::{self, RequestKind};
use super::{Packet, SessionConfig, SnmpSession};
use crate::config::Version;
use crate::error::{Error, ErrorStatus, Result};
use crate::oid::Oid;
use crate::value::{Pdu, PduKind};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;

/// Largest datagram we are prepared to receive.
const MAX_DATAGRAM: usize = 65_507;

/// A v1/v2c SNMP session over UDP.
#[derive(Debug)]
pub struct UdpSession {
    socket: UdpSocket,
    peer: SocketAddr,
    version: Version,
    community: Vec<u8>,
    max_repetitions: u8,
    attempts: u32,
    attempt_timeout: Duration,
    request_id: AtomicI32,
}

impl UdpSession {
    /// Resolve the target and open a connected UDP socket.
    ///
    /// The per-attempt timeout is derived from the session budget in the
    /// configuration (`timeout / retries`).
    pub async fn connect(config: &SessionConfig) -> Result<Self> {
        if config.version == Version::V3 {
            return Err(Error::config(
                "the bundled UDP backend supports SNMPv1/v2c only; \
                 SNMPv3 requires an external session backend",
            ));
        }

        let peer = resolve(&config.host, config.port).await?;

        let bind_addr: SocketAddr = if peer.is_ipv4() {
            "0.0.0.0:0".parse().expect("literal addr")
        } else {
            "[::]:0".parse().expect("literal addr")
        };
        let socket = UdpSocket::bind(bind_addr).await.map_err(|source| {
            Error::Network {
                target: peer,
                source,
            }
            .boxed()
        })?;
        socket.connect(peer).await.map_err(|source| {
            Error::Network {
                target: peer,
                source,
            }
            .boxed()
        })?;

        let attempts = config.retries.max(1);
        let attempt_timeout = config.timeout / attempts;

        tracing::debug!(
            target: "snmp_collector::session",
            peer = %peer,
            version = ?config.version,
            attempts,
            attempt_timeout_ms = attempt_timeout.as_millis() as u64,
            "session opened"
        );

        Ok(Self {
            socket,
            peer,
            version: config.version,
            community: config.community.expose().as_bytes().to_vec(),
            max_repetitions: config.max_repetitions,
            attempts,
            attempt_timeout,
            request_id: AtomicI32::new(1),
        })
    }

    /// The resolved peer address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn next_request_id(&self) -> i32 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send one request and wait for the matching response, with
    /// retransmission on timeout.
    async fn request(&self, kind: RequestKind, oids: &[Oid]) -> Result<wire::Response> {
        let request_id = self.next_request_id();
        let data = wire::encode_request(self.version, &self.community, kind, request_id, oids);

        let start = Instant::now();
        for attempt in 0..self.attempts {
            if attempt > 0 {
                tracing::debug!(target: "snmp_collector::session", peer = %self.peer, attempt, "retrying request");
            }

            self.socket.send(&data).await.map_err(|source| {
                Error::Network {
                    target: self.peer,
                    source,
                }
                .boxed()
            })?;

            match tokio::time::timeout(self.attempt_timeout, self.recv_matching(request_id)).await
            {
                Ok(result) => return result,
                Err(_) => continue,
            }
        }

        Err(Error::Timeout {
            target: self.peer,
            elapsed: start.elapsed(),
            retries: self.attempts.saturating_sub(1),
        }
        .boxed())
    }

    /// Receive datagrams until one decodes as a response for
    /// `request_id`. Stray datagrams (late responses to abandoned
    /// attempts) are discarded.
    async fn recv_matching(&self, request_id: i32) -> Result<wire::Response> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let n = self.socket.recv(&mut buf).await.map_err(|source| {
                Error::Network {
                    target: self.peer,
                    source,
                }
                .boxed()
            })?;

            let Some(response) = wire::decode_response(&buf[..n]) else {
                return Err(Error::MalformedResponse { target: self.peer }.boxed());
            };
            if response.request_id != request_id {
                tracing::debug!(
                    target: "snmp_collector::session",
                    peer = %self.peer,
                    expected = request_id,
                    got = response.request_id,
                    "discarding response with stale request id"
                );
                continue;
            }
            return Ok(response);
        }
    }

    /// One GETNEXT step. Packet errors other than v1's end-of-tree
    /// `NoSuchName` are fatal.
    async fn get_next_step(&self, oid: &Oid) -> Result<Option<Pdu>> {
        let response = self
            .request(RequestKind::GetNext, std::slice::from_ref(oid))
            .await?;
        match ErrorStatus::from_i32(response.error_status) {
            ErrorStatus::NoError => {}
            // SNMPv1 signals the end of the MIB with noSuchName.
            ErrorStatus::NoSuchName if self.version == Version::V1 => return Ok(None),
            status => {
                return Err(Error::Packet {
                    target: self.peer,
                    status,
                    index: response.error_index.max(0) as u32,
                }
                .boxed());
            }
        }
        Ok(response.varbinds.into_iter().next())
    }

    /// One GETBULK step.
    async fn get_bulk_step(&self, oid: &Oid) -> Result<Vec<Pdu>> {
        let response = self
            .request(
                RequestKind::GetBulk {
                    non_repeaters: 0,
                    max_repetitions: self.max_repetitions.max(1) as i32,
                },
                std::slice::from_ref(oid),
            )
            .await?;
        let status = ErrorStatus::from_i32(response.error_status);
        if status != ErrorStatus::NoError {
            return Err(Error::Packet {
                target: self.peer,
                status,
                index: response.error_index.max(0) as u32,
            }
            .boxed());
        }
        Ok(response.varbinds)
    }

    /// Guard against agents that return OIDs out of order, which would
    /// otherwise loop forever.
    fn check_increasing(&self, previous: &Oid, current: &Oid) -> Result<()> {
        if current <= previous {
            return Err(Error::WalkAborted {
                target: self.peer,
                previous: previous.clone(),
                current: current.clone(),
            }
            .boxed());
        }
        Ok(())
    }
}

impl SnmpSession for UdpSession {
    async fn get(&self, oids: &[Oid]) -> Result<Packet> {
        tracing::debug!(target: "snmp_collector::session", peer = %self.peer, oid_count = oids.len(), "sending GET");
        let response = self.request(RequestKind::Get, oids).await?;
        Ok(Packet {
            error_status: response.error_status,
            error_index: response.error_index,
            variables: response.varbinds,
        })
    }

    async fn walk_all(&self, root: &Oid) -> Result<Vec<Pdu>> {
        tracing::debug!(target: "snmp_collector::session", peer = %self.peer, root = %root, "walking subtree (GETNEXT)");
        let mut results = Vec::new();
        let mut current = root.clone();

        loop {
            let Some(pdu) = self.get_next_step(&current).await? else {
                break;
            };
            if pdu.kind == PduKind::EndOfMibView || !pdu.oid.starts_with(root) {
                break;
            }
            self.check_increasing(&current, &pdu.oid)?;
            current = pdu.oid.clone();
            results.push(pdu);
        }

        Ok(results)
    }

    async fn bulk_walk_all(&self, root: &Oid) -> Result<Vec<Pdu>> {
        tracing::debug!(target: "snmp_collector::session", peer = %self.peer, root = %root, "walking subtree (GETBULK)");
        let mut results = Vec::new();
        let mut current = root.clone();

        'outer: loop {
            let varbinds = self.get_bulk_step(&current).await?;
            if varbinds.is_empty() {
                break;
            }
            for pdu in varbinds {
                if pdu.kind == PduKind::EndOfMibView || !pdu.oid.starts_with(root) {
                    break 'outer;
                }
                self.check_increasing(&current, &pdu.oid)?;
                current = pdu.oid.clone();
                results.push(pdu);
            }
        }

        Ok(results)
    }

    async fn close(&self) -> Result<()> {
        // The socket is released on drop; close exists so callers keep
        // the acquire/release pairing explicit.
        tracing::debug!(target: "snmp_collector::session", peer = %self.peer, "session closed");
        Ok(())
    }
}

/// Resolve a host and port to a socket address.
async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let mut addrs = tokio::net::lookup_host((host, port)).await.map_err(|e| {
        Error::InvalidTarget {
            target: format!("{}:{}", host, port).into(),
            reason: e.to_string().into(),
        }
        .boxed()
    })?;
    addrs.next().ok_or_else(|| {
        Error::InvalidTarget {
            target: format!("{}:{}", host, port).into(),
            reason: "no addresses resolved".into(),
        }
        .boxed()
    })
}
