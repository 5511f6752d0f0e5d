//! Sample emission.
//!
//! [`pdu_to_samples`] turns one matched PDU into zero or more samples:
//! a counter or gauge for numeric metric types, a regex-extracted gauge
//! per suffix for string metrics with extraction rules, or the
//! `value-as-label` gauge for plain string metrics. Construction
//! failures become inline invalid samples instead of aborting the
//! scrape.

use super::decode::{indexes_to_labels, pdu_value_as_string};
use crate::config::Metric;
use crate::oid::Oid;
use crate::value::{Pdu, pdu_value};
use std::collections::{BTreeMap, HashMap};

/// Sample flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    Counter,
    Gauge,
}

/// One emitted sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    /// A well-formed metric sample.
    Value(MetricSample),
    /// A sample that could not be constructed; carries the error so the
    /// exposition layer can surface it.
    Invalid {
        /// Metric name the failure belongs to (`snmp_error` for
        /// scrape-level failures).
        metric: String,
        /// Human-readable failure description.
        error: String,
    },
}

/// A well-formed metric sample.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub help: String,
    pub kind: SampleKind,
    /// Sorted label name/value pairs.
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

impl Sample {
    /// A gauge sample without labels.
    pub fn gauge(name: impl Into<String>, help: impl Into<String>, value: f64) -> Sample {
        Sample::Value(MetricSample {
            name: name.into(),
            help: help.into(),
            kind: SampleKind::Gauge,
            labels: BTreeMap::new(),
            value,
        })
    }

    /// An invalid sample.
    pub fn invalid(metric: impl Into<String>, error: impl std::fmt::Display) -> Sample {
        Sample::Invalid {
            metric: metric.into(),
            error: error.to_string(),
        }
    }
}

/// Decode one matched PDU into samples.
///
/// `index_oids` is the OID tail after the metric's base OID; `pdu_index`
/// is the scrape-wide OID-to-PDU map used by lookups.
pub fn pdu_to_samples(
    index_oids: &[u32],
    pdu: &Pdu,
    metric: &Metric,
    pdu_index: &HashMap<Oid, Pdu>,
) -> Vec<Sample> {
    let labels = match indexes_to_labels(index_oids, metric, pdu_index) {
        Ok(labels) => labels,
        Err(e) => return vec![Sample::invalid(&metric.name, e)],
    };

    let value = pdu_value(pdu);
    let (kind, value, labels) = match metric.metric_type.as_str() {
        "counter" => (SampleKind::Counter, value, labels),
        "gauge" | "Float" | "Double" => (SampleKind::Gauge, value, labels),
        typ => {
            // Some form of string.
            let rendered = match pdu_value_as_string(pdu, typ) {
                Ok(rendered) => rendered,
                Err(e) => return vec![Sample::invalid(&metric.name, e)],
            };

            if !metric.regex_extracts.is_empty() {
                return apply_regex_extracts(metric, &rendered, &labels);
            }

            // The value becomes a label named after the metric, unless an
            // index already claimed that name.
            let mut labels = labels;
            labels.entry(metric.name.clone()).or_insert(rendered);
            (SampleKind::Gauge, 1.0, labels)
        }
    };

    vec![Sample::Value(MetricSample {
        name: metric.name.clone(),
        help: metric.help.clone(),
        kind,
        labels,
        value,
    })]
}

/// Emit one gauge per extraction suffix.
///
/// Within a suffix, the first regex that matches decides: its template
/// is expanded against the match and must parse as a float. A suffix
/// whose first match fails to parse, or whose regexes all miss, emits
/// nothing.
fn apply_regex_extracts(
    metric: &Metric,
    rendered_value: &str,
    labels: &BTreeMap<String, String>,
) -> Vec<Sample> {
    let mut samples = Vec::new();

    for (suffix, extracts) in &metric.regex_extracts {
        for extract in extracts {
            let Some(captures) = extract.regex.0.captures(rendered_value) else {
                tracing::debug!(
                    target: "snmp_collector::scrape",
                    metric = %metric.name,
                    regex = extract.regex.0.as_str(),
                    value = rendered_value,
                    "no regex match"
                );
                continue;
            };

            let mut expanded = String::new();
            captures.expand(&extract.value, &mut expanded);
            match expanded.parse::<f64>() {
                Ok(value) => samples.push(Sample::Value(MetricSample {
                    name: format!("{}{}", metric.name, suffix),
                    help: format!("{} (regex extracted)", metric.help),
                    kind: SampleKind::Gauge,
                    labels: labels.clone(),
                    value,
                })),
                Err(_) => {
                    tracing::debug!(
                        target: "snmp_collector::scrape",
                        metric = %metric.name,
                        suffix = %suffix,
                        value = %expanded,
                        "extracted value does not parse as a float"
                    );
                }
            }
            break;
        }
    }

    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Index, IndexType, Regexp, RegexpExtract};
    use crate::oid;
    use crate::value::{PduKind, PduValue};
    use regex::Regex;

    fn extract(pattern: &str, value: &str) -> RegexpExtract {
        RegexpExtract {
            value: value.to_string(),
            regex: Regexp(Regex::new(pattern).unwrap()),
        }
    }

    fn string_pdu(value: &str) -> Pdu {
        Pdu::new(
            oid!(1, 1, 1, 1, 1),
            PduKind::OctetString,
            PduValue::Str(value.to_string()),
        )
    }

    fn int_pdu(value: i64) -> Pdu {
        Pdu::new(oid!(1, 1, 1, 1, 1), PduKind::Integer, PduValue::Int(value))
    }

    fn expect_values(samples: &[Sample]) -> BTreeMap<String, f64> {
        samples
            .iter()
            .map(|s| match s {
                Sample::Value(m) => (m.name.clone(), m.value),
                Sample::Invalid { metric, error } => {
                    panic!("unexpected invalid sample for {}: {}", metric, error)
                }
            })
            .collect()
    }

    #[test]
    fn counter_metric() {
        let metric = Metric {
            name: "test_metric".to_string(),
            oid: "1.1.1.1.1".to_string(),
            metric_type: "counter".to_string(),
            help: "Help string".to_string(),
            ..Metric::default()
        };
        let samples = pdu_to_samples(&[], &int_pdu(2), &metric, &HashMap::new());

        assert_eq!(samples.len(), 1);
        let Sample::Value(sample) = &samples[0] else {
            panic!("expected a value sample");
        };
        assert_eq!(sample.kind, SampleKind::Counter);
        assert_eq!(sample.value, 2.0);
        assert!(sample.labels.is_empty());
    }

    #[test]
    fn gauge_metric() {
        let metric = Metric {
            name: "test_metric".to_string(),
            metric_type: "gauge".to_string(),
            ..Metric::default()
        };
        let samples = pdu_to_samples(&[], &int_pdu(2), &metric, &HashMap::new());
        let Sample::Value(sample) = &samples[0] else {
            panic!("expected a value sample");
        };
        assert_eq!(sample.kind, SampleKind::Gauge);
        assert_eq!(sample.value, 2.0);
    }

    #[test]
    fn float_and_double_types_emit_gauges() {
        for (typ, pdu) in [
            (
                "Float",
                Pdu::new(oid!(1), PduKind::OpaqueFloat, PduValue::Float(3.0)),
            ),
            (
                "Double",
                Pdu::new(oid!(1), PduKind::OpaqueDouble, PduValue::Double(3.0)),
            ),
        ] {
            let metric = Metric {
                name: "test_metric".to_string(),
                metric_type: typ.to_string(),
                ..Metric::default()
            };
            let samples = pdu_to_samples(&[], &pdu, &metric, &HashMap::new());
            let Sample::Value(sample) = &samples[0] else {
                panic!("expected a value sample");
            };
            assert_eq!(sample.kind, SampleKind::Gauge);
            assert_eq!(sample.value, 3.0);
        }
    }

    #[test]
    fn untyped_metric_emits_value_as_label() {
        let metric = Metric {
            name: "test_metric".to_string(),
            help: "Help string".to_string(),
            ..Metric::default()
        };
        let samples = pdu_to_samples(&[], &int_pdu(-2), &metric, &HashMap::new());

        let Sample::Value(sample) = &samples[0] else {
            panic!("expected a value sample");
        };
        assert_eq!(sample.kind, SampleKind::Gauge);
        assert_eq!(sample.value, 1.0);
        assert_eq!(sample.labels["test_metric"], "-2");
    }

    #[test]
    fn self_label_does_not_overwrite_index_label() {
        let metric = Metric {
            name: "foo".to_string(),
            indexes: vec![Index {
                labelname: "foo".to_string(),
                index_type: IndexType::Gauge,
                fixed_size: 0,
            }],
            ..Metric::default()
        };
        let samples = pdu_to_samples(&[7], &string_pdu("bar"), &metric, &HashMap::new());
        let Sample::Value(sample) = &samples[0] else {
            panic!("expected a value sample");
        };
        assert_eq!(sample.labels.len(), 1);
        assert_eq!(sample.labels["foo"], "7", "index label wins");
    }

    #[test]
    fn display_string_index_label() {
        let metric = Metric {
            name: "test_metric".to_string(),
            metric_type: "gauge".to_string(),
            indexes: vec![Index {
                labelname: "foo".to_string(),
                index_type: IndexType::DisplayString,
                fixed_size: 0,
            }],
            ..Metric::default()
        };
        let samples = pdu_to_samples(&[2, 65, 65], &int_pdu(3), &metric, &HashMap::new());
        let Sample::Value(sample) = &samples[0] else {
            panic!("expected a value sample");
        };
        assert_eq!(sample.labels["foo"], "AA");
        assert_eq!(sample.value, 3.0);
    }

    #[test]
    fn invalid_utf8_index_becomes_invalid_sample() {
        let metric = Metric {
            name: "test_metric".to_string(),
            metric_type: "gauge".to_string(),
            indexes: vec![Index {
                labelname: "foo".to_string(),
                index_type: IndexType::DisplayString,
                fixed_size: 0,
            }],
            ..Metric::default()
        };
        let samples = pdu_to_samples(&[2, 65, 255], &int_pdu(3), &metric, &HashMap::new());

        assert_eq!(samples.len(), 1);
        assert!(
            matches!(&samples[0], Sample::Invalid { metric, .. } if metric == "test_metric"),
            "expected an invalid sample, got {:?}",
            samples[0]
        );
    }

    #[test]
    fn invalid_utf8_index_with_regex_extracts_still_fails() {
        let metric = Metric {
            name: "test_metric".to_string(),
            metric_type: "gauge".to_string(),
            indexes: vec![Index {
                labelname: "foo".to_string(),
                index_type: IndexType::DisplayString,
                fixed_size: 0,
            }],
            regex_extracts: BTreeMap::from([(
                String::new(),
                vec![extract(".*", "1")],
            )]),
            ..Metric::default()
        };
        let samples = pdu_to_samples(&[2, 65, 255], &int_pdu(3), &metric, &HashMap::new());
        assert!(matches!(&samples[0], Sample::Invalid { .. }));
    }

    #[test]
    fn regex_extracts_full_scenario() {
        // One value, four suffixes: a miss, a catch-all, a first-match
        // pick, and a template expansion.
        let metric = Metric {
            name: "TestMetricName".to_string(),
            oid: "1.1.1.1.1".to_string(),
            help: "HelpText".to_string(),
            regex_extracts: BTreeMap::from([
                ("Blank".to_string(), vec![extract("XXXX", "4")]),
                ("Extension".to_string(), vec![extract(".*", "5")]),
                (
                    "MultipleRegexes".to_string(),
                    vec![
                        extract("XXXX", "123"),
                        extract("123", "999"),
                        extract(".*", "777"),
                    ],
                ),
                ("Template".to_string(), vec![extract("([0-9].[0-9]+)", "$1")]),
            ]),
            ..Metric::default()
        };
        let samples = pdu_to_samples(
            &[],
            &string_pdu("Test value 4.42 123 999"),
            &metric,
            &HashMap::new(),
        );

        let values = expect_values(&samples);
        assert_eq!(values.len(), 3, "Blank must be skipped");
        assert_eq!(values["TestMetricNameExtension"], 5.0);
        assert_eq!(values["TestMetricNameMultipleRegexes"], 999.0);
        assert_eq!(values["TestMetricNameTemplate"], 4.42);

        for sample in &samples {
            let Sample::Value(m) = sample else {
                panic!("expected value samples");
            };
            assert_eq!(m.kind, SampleKind::Gauge);
            assert_eq!(m.help, "HelpText (regex extracted)");
            assert!(m.labels.is_empty());
        }
    }

    #[test]
    fn regex_extract_empty_expansion_skips_suffix() {
        let metric = Metric {
            name: "TestMetricName".to_string(),
            regex_extracts: BTreeMap::from([(
                "Extension".to_string(),
                vec![extract(".*", "")],
            )]),
            ..Metric::default()
        };
        let samples = pdu_to_samples(&[], &string_pdu("SomeStringValue"), &metric, &HashMap::new());
        assert!(samples.is_empty(), "unparsable expansion emits nothing");
    }

    #[test]
    fn regex_extract_no_match_skips_suffix() {
        let metric = Metric {
            name: "TestMetricName".to_string(),
            regex_extracts: BTreeMap::from([(
                "Extension".to_string(),
                vec![extract("(will_not_match)", "")],
            )]),
            ..Metric::default()
        };
        let samples = pdu_to_samples(&[], &string_pdu("SomeStringValue"), &metric, &HashMap::new());
        assert!(samples.is_empty());
    }

    #[test]
    fn regex_extract_applies_to_numeric_values_too() {
        let metric = Metric {
            name: "TestMetricName".to_string(),
            help: "HelpText".to_string(),
            regex_extracts: BTreeMap::from([(
                "Status".to_string(),
                vec![extract(".*", "5")],
            )]),
            ..Metric::default()
        };
        let samples = pdu_to_samples(&[], &int_pdu(2), &metric, &HashMap::new());
        let values = expect_values(&samples);
        assert_eq!(values["TestMetricNameStatus"], 5.0);
    }

    #[test]
    fn regex_extract_first_match_decides_even_if_unparsable() {
        // The first matching regex expands to a non-float; the suffix is
        // skipped even though a later regex would have produced one.
        let metric = Metric {
            name: "m".to_string(),
            regex_extracts: BTreeMap::from([(
                "S".to_string(),
                vec![extract(".*", "not-a-float"), extract(".*", "1")],
            )]),
            ..Metric::default()
        };
        let samples = pdu_to_samples(&[], &string_pdu("anything"), &metric, &HashMap::new());
        assert!(samples.is_empty());
    }
}
