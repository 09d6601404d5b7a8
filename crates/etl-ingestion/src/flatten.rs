//! Recursive flattening of record trees into dotted-path maps

use etl_core::{FlatRecord, Node};

/// Key used when a record is a bare scalar rather than a map
pub const SCALAR_KEY: &str = "value";

/// Collapse a record tree into a single-level map.
///
/// Nested map keys are joined with `.`; sequence elements are keyed by their
/// index, so element `i` of field `f` lands under `f.i`. Leaves pass through
/// [`etl_core::Scalar::sanitize`]. Empty maps and sequences contribute no keys.
pub fn flatten(record: &Node) -> FlatRecord {
    let mut out = FlatRecord::new();
    match record {
        Node::Scalar(scalar) => {
            out.insert(SCALAR_KEY.to_string(), scalar.clone().sanitize());
        }
        node => flatten_into(node, "", &mut out),
    }
    out
}

fn flatten_into(node: &Node, prefix: &str, out: &mut FlatRecord) {
    match node {
        Node::Map(fields) => {
            for (key, value) in fields {
                flatten_into(value, &join(prefix, key), out);
            }
        }
        Node::Sequence(items) => {
            for (index, item) in items.iter().enumerate() {
                flatten_into(item, &join(prefix, &index.to_string()), out);
            }
        }
        Node::Scalar(scalar) => {
            out.insert(prefix.to_string(), scalar.clone().sanitize());
        }
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

/// Flatten every record of a batch
pub fn flatten_all(records: &[Node]) -> Vec<FlatRecord> {
    records.iter().map(flatten).collect()
}
