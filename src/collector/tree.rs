//! OID-prefix trie over metric definitions.
//!
//! Built once per scrape. Each edge is one OID component; a terminal
//! node carries the metric registered at that OID. Lookup descends along
//! a PDU's OID and stops at the first terminal it reaches, so a metric
//! at a shorter prefix shadows deeper ones for that PDU.

use crate::config::Metric;
use crate::oid::Oid;
use std::collections::HashMap;

#[derive(Default)]
struct Node<'a> {
    metric: Option<&'a Metric>,
    children: HashMap<u32, Node<'a>>,
}

/// Prefix tree over the metrics of one module.
pub struct MetricTree<'a> {
    root: Node<'a>,
}

impl<'a> MetricTree<'a> {
    /// Build the tree. A metric whose OID fails to parse is skipped with
    /// a warning; two metrics registered at the same OID resolve to the
    /// last one inserted.
    pub fn build(metrics: &'a [Metric]) -> Self {
        let mut root = Node::default();
        for metric in metrics {
            let oid = match Oid::parse(&metric.oid) {
                Ok(oid) => oid,
                Err(e) => {
                    tracing::warn!(
                        target: "snmp_collector::scrape",
                        metric = %metric.name,
                        oid = %metric.oid,
                        error = %e,
                        "skipping metric with unparsable OID"
                    );
                    continue;
                }
            };
            let mut node = &mut root;
            for &component in oid.arcs() {
                node = node.children.entry(component).or_default();
            }
            node.metric = Some(metric);
        }
        Self { root }
    }

    /// Match a PDU's OID against the tree.
    ///
    /// Returns the first terminal metric on the path and the OID tail
    /// after it (the raw index components), or `None` when no prefix of
    /// the OID carries a metric.
    pub fn lookup<'o>(&self, oid: &'o Oid) -> Option<(&'a Metric, &'o [u32])> {
        let arcs = oid.arcs();
        let mut node = &self.root;
        for (i, component) in arcs.iter().enumerate() {
            node = node.children.get(component)?;
            if let Some(metric) = node.metric {
                return Some((metric, &arcs[i + 1..]));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;

    fn metric(name: &str, oid: &str) -> Metric {
        Metric {
            name: name.to_string(),
            oid: oid.to_string(),
            ..Metric::default()
        }
    }

    #[test]
    fn lookup_returns_tail() {
        let metrics = vec![metric("if_in_octets", "1.3.6.1.2.1.2.2.1.10")];
        let tree = MetricTree::build(&metrics);

        let needle = oid!(1, 3, 6, 1, 2, 1, 2, 2, 1, 10, 4);
        let (m, tail) = tree.lookup(&needle).expect("should match");
        assert_eq!(m.name, "if_in_octets");
        assert_eq!(tail, &[4]);
    }

    #[test]
    fn exact_match_has_empty_tail() {
        let metrics = vec![metric("m", "1.1.1")];
        let tree = MetricTree::build(&metrics);
        let needle = oid!(1, 1, 1);
        let (_, tail) = tree.lookup(&needle).unwrap();
        assert!(tail.is_empty());
    }

    #[test]
    fn unmatched_oid_is_ignored() {
        let metrics = vec![metric("m", "1.1.1")];
        let tree = MetricTree::build(&metrics);
        let a = oid!(1, 2, 3);
        let b = oid!(1, 1);
        assert!(tree.lookup(&a).is_none());
        assert!(tree.lookup(&b).is_none());
    }

    #[test]
    fn shorter_prefix_shadows_deeper_metric() {
        let metrics = vec![metric("deep", "1.1.1.1"), metric("shallow", "1.1")];
        let tree = MetricTree::build(&metrics);

        let needle = oid!(1, 1, 1, 1, 5);
        let (m, tail) = tree.lookup(&needle).unwrap();
        assert_eq!(m.name, "shallow", "first terminal on the path wins");
        assert_eq!(tail, &[1, 1, 5]);
    }

    #[test]
    fn prefix_sharing_metrics_coexist() {
        let metrics = vec![metric("a", "1.2.3"), metric("b", "1.2.4")];
        let tree = MetricTree::build(&metrics);
        assert_eq!(tree.lookup(&oid!(1, 2, 3, 1)).unwrap().0.name, "a");
        assert_eq!(tree.lookup(&oid!(1, 2, 4, 1)).unwrap().0.name, "b");
    }

    #[test]
    fn duplicate_registration_last_writer_wins() {
        let metrics = vec![metric("first", "1.2.3"), metric("second", "1.2.3")];
        let tree = MetricTree::build(&metrics);
        assert_eq!(tree.lookup(&oid!(1, 2, 3, 0)).unwrap().0.name, "second");
    }

    #[test]
    fn lookup_is_deterministic() {
        let metrics = vec![metric("a", "1.2"), metric("b", "1.3.4")];
        let tree = MetricTree::build(&metrics);
        let probe = oid!(1, 3, 4, 9);
        let first = tree.lookup(&probe).map(|(m, t)| (m.name.clone(), t.to_vec()));
        for _ in 0..10 {
            let again = tree.lookup(&probe).map(|(m, t)| (m.name.clone(), t.to_vec()));
            assert_eq!(first, again);
        }
    }
}
