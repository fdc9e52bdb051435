//! Collapse staged record operations into the minimal set of RRSet mutations.
//!
//! Rules, independent of staging order:
//! - at most one mutation survives per (name, type);
//! - a REPLACE for (name, type) suppresses every DELETE for the same key;
//! - a delete of all types at a name expands to one DELETE per supported type, unless the name
//!   has any assertion staged, in which case it is dropped for that name entirely;
//! - unsupported types are dropped.
use std::collections::{HashMap, HashSet};

use tracing::info;

use super::{Mutation, RecordOp, RecordType, RemoveScope, RrsetChange};
use crate::validation::normalize_fqdn;

pub fn diff(ops: &[RecordOp]) -> Vec<RrsetChange> {
    let asserted_names: HashSet<String> = ops
        .iter()
        .filter_map(|op| match op {
            RecordOp::Assert { name, .. } => Some(normalize_fqdn(name)),
            RecordOp::Remove { .. } => None,
        })
        .collect();

    let mut changes: Vec<RrsetChange> = Vec::new();
    let mut index: HashMap<(String, RecordType), usize> = HashMap::new();

    for op in ops {
        match op {
            RecordOp::Assert {
                name,
                rtype,
                ttl,
                content,
            } => {
                if !rtype.is_supported() {
                    info!("skipping unsupported record type {rtype} for {name}");
                    continue;
                }
                let name = normalize_fqdn(name);
                let key = (name.clone(), rtype.clone());
                match index.get(&key) {
                    Some(&i) => {
                        let change = &mut changes[i];
                        match &mut change.mutation {
                            Mutation::Replace(values) => {
                                if !values.contains(content) {
                                    values.push(content.clone());
                                }
                            }
                            Mutation::Delete => {
                                change.ttl = *ttl;
                                change.mutation = Mutation::Replace(vec![content.clone()]);
                            }
                        }
                    }
                    None => {
                        index.insert(key, changes.len());
                        changes.push(RrsetChange {
                            name,
                            rtype: rtype.clone(),
                            ttl: *ttl,
                            mutation: Mutation::Replace(vec![content.clone()]),
                        });
                    }
                }
            }
            RecordOp::Remove { name, scope } => {
                let name = normalize_fqdn(name);
                let types: Vec<RecordType> = match scope {
                    RemoveScope::Type(rtype) if !rtype.is_supported() => {
                        info!("skipping unsupported record type {rtype} for {name}");
                        continue;
                    }
                    RemoveScope::Type(rtype) => vec![rtype.clone()],
                    RemoveScope::AllTypes if asserted_names.contains(&name) => continue,
                    RemoveScope::AllTypes => RecordType::SUPPORTED.to_vec(),
                };
                for rtype in types {
                    let key = (name.clone(), rtype.clone());
                    if index.contains_key(&key) {
                        continue;
                    }
                    index.insert(key, changes.len());
                    changes.push(RrsetChange {
                        name: name.clone(),
                        rtype,
                        ttl: 0,
                        mutation: Mutation::Delete,
                    });
                }
            }
        }
    }

    changes
}
