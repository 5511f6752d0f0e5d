//! The scrape pipeline.
//!
//! One scrape of one target with one module runs end to end in
//! [`Collector::collect`]: drive the SNMP session ([`scrape_session`]),
//! index the returned PDUs, build the metric trie, decode every matched
//! PDU into samples, and bracket the decoded samples with the internal
//! `snmp_scrape_*` metrics. All state is scrape-local except the
//! process-wide unexpected-PDU-type counter.

mod decode;
mod sample;
mod tree;

pub use decode::{indexes_to_labels, pdu_value_as_string, split_oid};
pub use sample::{MetricSample, Sample, SampleKind, pdu_to_samples};
pub use tree::MetricTree;

use crate::config::{Module, Version};
use crate::error::{Error, ErrorStatus, Result};
use crate::oid::Oid;
use crate::session::{SnmpSession, UdpSession};
use crate::value::Pdu;
use once_cell::sync::Lazy;
use prometheus::{CounterVec, Gauge, GaugeVec, IntCounter, Opts, Registry};
use std::collections::HashMap;
use std::time::Instant;

/// Process-wide count of PDUs whose runtime value shape was unexpected.
///
/// Registered with the default registry on first use; survives across
/// scrapes.
pub static UNEXPECTED_PDU_TYPE: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "snmp_unexpected_pdu_type_total",
        "Unexpected value shapes in a PDU.",
    )
    .expect("counter options are valid");
    if let Err(e) = prometheus::default_registry().register(Box::new(counter.clone())) {
        tracing::warn!(
            target: "snmp_collector::scrape",
            error = %e,
            "could not register unexpected-PDU-type counter"
        );
    }
    counter
});

/// Drive one session through a module's GETs and walks.
///
/// GET OIDs are batched: at most `max_repetitions` per request, or one
/// per request when max-repetitions is 0 or the version is SNMPv1 (a v1
/// agent reports only the first unsupported OID per request). A v1
/// `noSuchName` packet error skips the batch; any other packet error
/// aborts the scrape. Per-variable `noSuchObject`/`noSuchInstance`
/// exceptions are dropped. Walk subtrees use GETNEXT under v1 and
/// GETBULK otherwise.
pub async fn scrape_session<S: SnmpSession>(session: &S, module: &Module) -> Result<Vec<Pdu>> {
    let version = module.walk_params.version;
    let mut pdus = Vec::new();

    let max_oids = if module.walk_params.max_repetitions == 0 || version == Version::V1 {
        1
    } else {
        module.walk_params.max_repetitions as usize
    };

    let get_oids = module
        .get
        .iter()
        .map(|s| Oid::parse(s))
        .collect::<Result<Vec<_>>>()?;

    for batch in get_oids.chunks(max_oids) {
        tracing::debug!(target: "snmp_collector::scrape", oid_count = batch.len(), "getting OIDs");
        let start = Instant::now();
        let packet = session.get(batch).await?;
        tracing::debug!(
            target: "snmp_collector::scrape",
            oid_count = batch.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "get completed"
        );

        // SNMPv1 reports unsupported OIDs as a packet-level error.
        if packet.status() == ErrorStatus::NoSuchName && version == Version::V1 {
            tracing::debug!(
                target: "snmp_collector::scrape",
                oid = %batch[0],
                "OID batch not supported by target"
            );
            continue;
        }
        if packet.status() != ErrorStatus::NoError {
            return Err(Error::Packet {
                target: crate::error::UNKNOWN_TARGET,
                status: packet.status(),
                index: packet.error_index.max(0) as u32,
            }
            .boxed());
        }

        for pdu in packet.variables {
            if pdu.is_exception() {
                tracing::debug!(
                    target: "snmp_collector::scrape",
                    oid = %pdu.oid,
                    "OID not supported by target"
                );
                continue;
            }
            pdus.push(pdu);
        }
    }

    for subtree in &module.walk {
        let root = Oid::parse(subtree)?;
        tracing::debug!(target: "snmp_collector::scrape", subtree = %root, "walking subtree");
        let start = Instant::now();
        let walked = if version == Version::V1 {
            session.walk_all(&root).await?
        } else {
            session.bulk_walk_all(&root).await?
        };
        tracing::debug!(
            target: "snmp_collector::scrape",
            subtree = %root,
            pdu_count = walked.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "walk completed"
        );
        pdus.extend(walked);
    }

    Ok(pdus)
}

/// Open a UDP session for `target`, drive it through the module, and
/// close it on both success and failure paths.
pub async fn scrape_target(target: &str, module: &Module) -> Result<Vec<Pdu>> {
    let config = module.walk_params.session_config(target)?;
    let session = UdpSession::connect(&config).await?;
    let result = scrape_session(&session, module).await;
    let closed = session.close().await;
    match (result, closed) {
        (Ok(pdus), Ok(())) => Ok(pdus),
        (Ok(_), Err(e)) | (Err(e), _) => Err(e),
    }
}

/// One target/module pair, scraped on demand.
pub struct Collector {
    target: String,
    module: Module,
}

impl Collector {
    /// Create a collector for one target and module.
    pub fn new(target: impl Into<String>, module: Module) -> Self {
        Self {
            target: target.into(),
            module,
        }
    }

    /// Run one scrape over the bundled UDP backend.
    ///
    /// A transport failure produces a single `snmp_error` invalid sample
    /// and no decoded samples.
    pub async fn collect(&self) -> Vec<Sample> {
        let start = Instant::now();
        match scrape_target(&self.target, &self.module).await {
            Ok(pdus) => decode_pdus(start, pdus, &self.module),
            Err(e) => {
                tracing::warn!(
                    target: "snmp_collector::scrape",
                    scrape_target = %self.target,
                    error = %e,
                    "error scraping target"
                );
                vec![Sample::invalid("snmp_error", e)]
            }
        }
    }

    /// Run one scrape over an injected session (used by tests and
    /// alternative backends). The session is closed on both success and
    /// failure paths, like [`Collector::collect`].
    pub async fn collect_session<S: SnmpSession>(&self, session: &S) -> Vec<Sample> {
        let start = Instant::now();
        let result = scrape_session(session, &self.module).await;
        let closed = session.close().await;
        let result = match (result, closed) {
            (Ok(pdus), Ok(())) => Ok(pdus),
            (Ok(_), Err(e)) | (Err(e), _) => Err(e),
        };
        match result {
            Ok(pdus) => decode_pdus(start, pdus, &self.module),
            Err(e) => {
                tracing::warn!(
                    target: "snmp_collector::scrape",
                    scrape_target = %self.target,
                    error = %e,
                    "error scraping target"
                );
                vec![Sample::invalid("snmp_error", e)]
            }
        }
    }
}

/// Decode the scraped PDUs into samples, bracketed by the internal
/// scrape metrics.
fn decode_pdus(start: Instant, pdus: Vec<Pdu>, module: &Module) -> Vec<Sample> {
    let mut samples = vec![Sample::gauge(
        "snmp_scrape_walk_duration_seconds",
        "Time SNMP walk/bulkwalk took.",
        start.elapsed().as_secs_f64(),
    )];
    samples.push(Sample::gauge(
        "snmp_scrape_pdus_returned",
        "PDUs returned from walk.",
        pdus.len() as f64,
    ));

    let pdu_index: HashMap<Oid, Pdu> = pdus
        .into_iter()
        .map(|pdu| (pdu.oid.clone(), pdu))
        .collect();

    let tree = MetricTree::build(&module.metrics);
    for (oid, pdu) in &pdu_index {
        if let Some((metric, tail)) = tree.lookup(oid) {
            samples.extend(pdu_to_samples(tail, pdu, metric, &pdu_index));
        }
    }

    samples.push(Sample::gauge(
        "snmp_scrape_duration_seconds",
        "Total SNMP time scrape took (walk and processing).",
        start.elapsed().as_secs_f64(),
    ));
    samples
}

/// Convert a sample batch into a fresh registry for exposition.
///
/// One vector per metric name, created from the first sample seen for
/// that name. Invalid samples, and samples that do not fit their family
/// (unusable metric name, label mismatch, negative counter increments),
/// are logged and surface through the `snmp_error` gauge.
pub fn registry_from_samples(samples: &[Sample]) -> Registry {
    let registry = Registry::new();
    let mut gauges: HashMap<String, GaugeVec> = HashMap::new();
    let mut counters: HashMap<String, CounterVec> = HashMap::new();
    let mut errored = false;

    for sample in samples {
        match sample {
            Sample::Value(s) => {
                let label_names: Vec<&str> = s.labels.keys().map(String::as_str).collect();
                let label_values: Vec<&str> = s.labels.values().map(String::as_str).collect();
                let help = if s.help.is_empty() {
                    s.name.as_str()
                } else {
                    s.help.as_str()
                };
                let opts = Opts::new(s.name.clone(), help);

                let outcome = match s.kind {
                    SampleKind::Gauge => {
                        let vec = match gauges.get(&s.name) {
                            Some(vec) => vec.clone(),
                            None => match GaugeVec::new(opts, &label_names) {
                                Ok(vec) => {
                                    gauges.insert(s.name.clone(), vec.clone());
                                    vec
                                }
                                Err(e) => {
                                    errored = true;
                                    tracing::warn!(
                                        target: "snmp_collector::scrape",
                                        metric = %s.name,
                                        error = %e,
                                        "cannot construct metric family"
                                    );
                                    continue;
                                }
                            },
                        };
                        vec.get_metric_with_label_values(&label_values)
                            .map(|gauge| gauge.set(s.value))
                    }
                    SampleKind::Counter => {
                        if s.value < 0.0 {
                            errored = true;
                            tracing::warn!(
                                target: "snmp_collector::scrape",
                                metric = %s.name,
                                value = s.value,
                                "dropping counter sample with negative value"
                            );
                            continue;
                        }
                        let vec = match counters.get(&s.name) {
                            Some(vec) => vec.clone(),
                            None => match CounterVec::new(opts, &label_names) {
                                Ok(vec) => {
                                    counters.insert(s.name.clone(), vec.clone());
                                    vec
                                }
                                Err(e) => {
                                    errored = true;
                                    tracing::warn!(
                                        target: "snmp_collector::scrape",
                                        metric = %s.name,
                                        error = %e,
                                        "cannot construct metric family"
                                    );
                                    continue;
                                }
                            },
                        };
                        vec.get_metric_with_label_values(&label_values)
                            .map(|counter| counter.inc_by(s.value))
                    }
                };
                if let Err(e) = outcome {
                    errored = true;
                    tracing::warn!(
                        target: "snmp_collector::scrape",
                        metric = %s.name,
                        error = %e,
                        "dropping sample with mismatched labels"
                    );
                }
            }
            Sample::Invalid { metric, error } => {
                tracing::warn!(
                    target: "snmp_collector::scrape",
                    metric = %metric,
                    error = %error,
                    "invalid sample"
                );
                errored = true;
            }
        }
    }

    for vec in gauges.into_values() {
        if let Err(e) = registry.register(Box::new(vec)) {
            tracing::warn!(target: "snmp_collector::scrape", error = %e, "gauge registration failed");
        }
    }
    for vec in counters.into_values() {
        if let Err(e) = registry.register(Box::new(vec)) {
            tracing::warn!(target: "snmp_collector::scrape", error = %e, "counter registration failed");
        }
    }
    if errored {
        match Gauge::new("snmp_error", "Error scraping target") {
            Ok(gauge) => {
                gauge.set(1.0);
                if let Err(e) = registry.register(Box::new(gauge)) {
                    tracing::warn!(target: "snmp_collector::scrape", error = %e, "error gauge registration failed");
                }
            }
            Err(e) => {
                tracing::warn!(target: "snmp_collector::scrape", error = %e, "error gauge construction failed");
            }
        }
    }

    registry
}
