//! Programmable session for tests.
//!
//! Queue packets and walk results, then drive the scrape pipeline
//! without a device. Requests are recorded so tests can assert on
//! batching and ordering; `closed()` lets tests verify the driver
//! releases the session on every exit path.

use super::{Packet, SnmpSession};
use crate::error::Result;
use crate::oid::Oid;
use crate::value::Pdu;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MockInner {
    get_responses: VecDeque<Result<Packet>>,
    walk_results: HashMap<Oid, Vec<Pdu>>,
    walk_error: Option<Box<crate::error::Error>>,
    get_requests: Vec<Vec<Oid>>,
    walked: Vec<Oid>,
    bulk_walked: Vec<Oid>,
    closed: bool,
}

/// A programmable [`SnmpSession`] test double.
///
/// # Example
///
/// ```
/// use snmp_collector::session::{MockSession, Packet, SnmpSession};
/// use snmp_collector::oid;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mock = MockSession::new();
/// mock.queue_get(Packet::default());
///
/// let packet = mock.get(&[oid!(1, 3, 6, 1)]).await.unwrap();
/// assert!(packet.variables.is_empty());
/// assert_eq!(mock.get_requests().len(), 1);
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MockSession {
    inner: Arc<Mutex<MockInner>>,
}

impl MockSession {
    /// Create an empty mock. GETs answer with empty packets until
    /// responses are queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a GET response. Responses are consumed in FIFO order.
    pub fn queue_get(&self, packet: Packet) {
        self.inner
            .lock()
            .unwrap()
            .get_responses
            .push_back(Ok(packet));
    }

    /// Queue a GET failure.
    pub fn queue_get_error(&self, error: Box<crate::error::Error>) {
        self.inner
            .lock()
            .unwrap()
            .get_responses
            .push_back(Err(error));
    }

    /// Set the PDUs returned when walking `root` (either walk flavor).
    pub fn set_walk(&self, root: Oid, pdus: Vec<Pdu>) {
        self.inner.lock().unwrap().walk_results.insert(root, pdus);
    }

    /// Fail the next walk with `error`.
    pub fn set_walk_error(&self, error: Box<crate::error::Error>) {
        self.inner.lock().unwrap().walk_error = Some(error);
    }

    /// OID batches passed to [`SnmpSession::get`], in order.
    pub fn get_requests(&self) -> Vec<Vec<Oid>> {
        self.inner.lock().unwrap().get_requests.clone()
    }

    /// Roots walked with GETNEXT, in order.
    pub fn walked(&self) -> Vec<Oid> {
        self.inner.lock().unwrap().walked.clone()
    }

    /// Roots walked with GETBULK, in order.
    pub fn bulk_walked(&self) -> Vec<Oid> {
        self.inner.lock().unwrap().bulk_walked.clone()
    }

    /// Whether [`SnmpSession::close`] has been called.
    pub fn closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    fn walk_result(&self, root: &Oid) -> Result<Vec<Pdu>> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.walk_error.take() {
            return Err(error);
        }
        Ok(inner.walk_results.get(root).cloned().unwrap_or_default())
    }
}

impl SnmpSession for MockSession {
    async fn get(&self, oids: &[Oid]) -> Result<Packet> {
        let mut inner = self.inner.lock().unwrap();
        inner.get_requests.push(oids.to_vec());
        inner
            .get_responses
            .pop_front()
            .unwrap_or_else(|| Ok(Packet::default()))
    }

    async fn walk_all(&self, root: &Oid) -> Result<Vec<Pdu>> {
        self.inner.lock().unwrap().walked.push(root.clone());
        self.walk_result(root)
    }

    async fn bulk_walk_all(&self, root: &Oid) -> Result<Vec<Pdu>> {
        self.inner.lock().unwrap().bulk_walked.push(root.clone());
        self.walk_result(root)
    }

    async fn close(&self) -> Result<()> {
        self.inner.lock().unwrap().closed = true;
        Ok(())
    }
}
