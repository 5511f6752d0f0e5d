//! # snmp-collector
//!
//! An SNMP-to-metrics adapter: scrape a network device with SNMP and
//! decode the returned PDUs into labeled Prometheus samples.
//!
//! ## Pipeline
//!
//! A scrape of one target with one module runs as a single sequential
//! pipeline:
//!
//! 1. The session driver issues batched GETs and subtree walks
//!    ([`collector::scrape_session`]).
//! 2. Returned PDUs are indexed by OID for cross-PDU lookups.
//! 3. An OID-prefix trie over the module's metrics matches each PDU to
//!    its metric definition ([`collector::MetricTree`]).
//! 4. The OID tail is decoded into typed index labels, lookups rewrite
//!    labels from other PDUs, and the value decoder emits counter,
//!    gauge, or regex-extracted samples ([`collector::pdu_to_samples`]).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use snmp_collector::{Collector, Config};
//!
//! #[tokio::main]
//! async fn main() -> snmp_collector::Result<()> {
//!     let config = Config::load_file("snmp.yml")?;
//!     let module = config
//!         .module("default")
//!         .expect("module is defined")
//!         .clone();
//!
//!     let collector = Collector::new("192.168.1.2:161", module);
//!     for sample in collector.collect().await {
//!         println!("{:?}", sample);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! The SNMP wire transport is injected through
//! [`session::SnmpSession`]; the bundled [`session::UdpSession`] covers
//! SNMPv1/v2c, and [`session::MockSession`] drives the pipeline in
//! tests.

pub mod collector;
pub mod config;
pub mod error;
pub mod oid;
pub mod session;
pub mod value;

pub use collector::{Collector, MetricSample, Sample, SampleKind, registry_from_samples};
pub use config::{Config, Module, WalkParams};
pub use error::{Error, ErrorStatus, Result};
pub use oid::Oid;
pub use value::{Pdu, PduKind, PduValue};
