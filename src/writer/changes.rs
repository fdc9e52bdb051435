//! Turning registry state into staged record operations.
use std::collections::HashSet;
use std::net::IpAddr;

use crate::config::DnsTtlConfig;
use crate::registry::{DomainRecord, HostRecord};
use crate::validation::normalize_fqdn;
use crate::zone::{RecordOp, RecordType};

/// Deletes for every supported type at `name`, next to the wildcard delete.
///
/// An assertion at a name drops that name's wildcard delete, so a type the name no longer
/// carries (a DS after DNSSEC was turned off, an AAAA after the v6 address went away) needs its
/// own delete. Types that are still asserted keep their REPLACE.
fn clear(name: &str) -> impl Iterator<Item = RecordOp> + '_ {
    std::iter::once(RecordOp::remove_all(name)).chain(
        RecordType::SUPPORTED
            .into_iter()
            .map(move |rtype| RecordOp::remove(name, rtype)),
    )
}

/// Operations that make the zone reflect `domain` at `name`.
///
/// The delegation is always cleared first; NS, DS and in-bailiwick glue are then asserted when
/// the domain exists and is publishable. `glue` holds the loaded subordinate hosts that the
/// domain uses as nameservers. Subordinate hosts that end up without glue are wiped.
pub fn domain_ops(
    name: &str,
    domain: Option<&DomainRecord>,
    glue: &[HostRecord],
    ttls: &DnsTtlConfig,
) -> Vec<RecordOp> {
    let name = normalize_fqdn(name);
    let mut ops: Vec<RecordOp> = clear(&name).collect();
    let Some(domain) = domain else {
        return ops;
    };

    let mut glued: HashSet<String> = HashSet::new();
    if domain.publishable {
        for ns in &domain.nameservers {
            ops.push(RecordOp::assert(
                &name,
                RecordType::Ns,
                ttls.ns_ttl,
                normalize_fqdn(ns),
            ));
        }
        for ds in &domain.ds_data {
            ops.push(RecordOp::assert(&name, RecordType::Ds, ttls.ds_ttl, ds.rdata()));
        }
        for host in glue {
            let host_name = normalize_fqdn(&host.name);
            ops.extend(glue_ops(&host_name, &host.addresses, ttls));
            glued.insert(host_name);
        }
    }

    for sub in &domain.subordinate_hosts {
        let sub = normalize_fqdn(sub);
        if !glued.contains(&sub) {
            ops.push(RecordOp::remove_all(&sub));
        }
    }
    ops
}

fn glue_ops(host: &str, addresses: &[IpAddr], ttls: &DnsTtlConfig) -> Vec<RecordOp> {
    let mut ops: Vec<RecordOp> = clear(host).collect();
    for addr in addresses {
        let rtype = match addr {
            IpAddr::V4(_) => RecordType::A,
            IpAddr::V6(_) => RecordType::Aaaa,
        };
        ops.push(RecordOp::assert(host, rtype, ttls.a_ttl, addr.to_string()));
    }
    ops
}

/// The nameservers of `domain` that are its own subordinate hosts and so need glue.
pub fn in_bailiwick_nameservers(domain: &DomainRecord) -> Vec<String> {
    let subordinate: HashSet<String> = domain
        .subordinate_hosts
        .iter()
        .map(|h| normalize_fqdn(h))
        .collect();
    domain
        .nameservers
        .iter()
        .map(|ns| normalize_fqdn(ns))
        .filter(|ns| subordinate.contains(ns))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DsData;
    use crate::zone::diff::diff;
    use crate::zone::{Mutation, RrsetChange};

    fn ttls() -> DnsTtlConfig {
        DnsTtlConfig {
            a_ttl: 300,
            ns_ttl: 3600,
            ds_ttl: 1800,
        }
    }

    fn domain() -> DomainRecord {
        DomainRecord {
            name: "example.test".into(),
            registrar_id: "registrar-1".into(),
            publishable: true,
            nameservers: vec!["ns1.example.test".into(), "NS.Other.NET".into()],
            ds_data: vec![DsData {
                key_tag: 1,
                algorithm: 8,
                digest_type: 2,
                digest: "abcd".into(),
            }],
            subordinate_hosts: vec!["ns1.example.test".into(), "old.example.test".into()],
        }
    }

    fn ns1() -> HostRecord {
        HostRecord {
            name: "ns1.example.test".into(),
            registrar_id: "registrar-1".into(),
            addresses: vec!["192.0.2.1".parse().unwrap(), "2001:db8::1".parse().unwrap()],
            superordinate_domain: Some("example.test".into()),
        }
    }

    fn find<'a>(changes: &'a [RrsetChange], name: &str, rtype: &str) -> Option<&'a RrsetChange> {
        changes
            .iter()
            .find(|c| c.name == name && c.rtype.as_str() == rtype)
    }

    #[test]
    fn publishable_domain_gets_delegation_and_glue() {
        let changes = diff(&domain_ops("Example.test", Some(&domain()), &[ns1()], &ttls()));

        let ns = find(&changes, "example.test.", "NS").unwrap();
        assert_eq!(ns.ttl, 3600);
        assert_eq!(
            ns.mutation,
            Mutation::Replace(vec!["ns1.example.test.".into(), "ns.other.net.".into()])
        );
        let ds = find(&changes, "example.test.", "DS").unwrap();
        assert_eq!(ds.mutation, Mutation::Replace(vec!["1 8 2 ABCD".into()]));
        // Types without assertions are deleted even though the name keeps other records.
        assert!(find(&changes, "example.test.", "A").unwrap().is_delete());
        assert!(find(&changes, "ns1.example.test.", "NS").unwrap().is_delete());
        assert_eq!(changes.iter().filter(|c| c.name == "example.test.").count(), 4);

        let a = find(&changes, "ns1.example.test.", "A").unwrap();
        assert_eq!(a.ttl, 300);
        assert_eq!(a.mutation, Mutation::Replace(vec!["192.0.2.1".into()]));
        assert_eq!(
            find(&changes, "ns1.example.test.", "AAAA").unwrap().mutation,
            Mutation::Replace(vec!["2001:db8::1".into()])
        );

        let orphan: Vec<_> = changes
            .iter()
            .filter(|c| c.name == "old.example.test.")
            .collect();
        assert_eq!(orphan.len(), 4);
        assert!(orphan.iter().all(|c| c.is_delete()));
    }

    #[test]
    fn missing_domain_is_removed() {
        let changes = diff(&domain_ops("gone.test", None, &[], &ttls()));
        assert_eq!(changes.len(), 4);
        assert!(changes.iter().all(|c| c.name == "gone.test." && c.is_delete()));
    }

    #[test]
    fn held_domain_is_removed_with_its_glue() {
        let mut held = domain();
        held.publishable = false;
        let changes = diff(&domain_ops("example.test", Some(&held), &[ns1()], &ttls()));
        assert!(changes.iter().all(RrsetChange::is_delete));
        assert_eq!(changes.len(), 12);
    }

    #[test]
    fn dropped_ds_and_address_family_are_deleted() {
        let mut unsigned = domain();
        unsigned.ds_data.clear();
        let mut v4_only = ns1();
        v4_only.addresses.retain(IpAddr::is_ipv4);

        let changes = diff(&domain_ops("example.test", Some(&unsigned), &[v4_only], &ttls()));

        assert!(find(&changes, "example.test.", "DS").unwrap().is_delete());
        assert!(!find(&changes, "example.test.", "NS").unwrap().is_delete());
        assert!(find(&changes, "ns1.example.test.", "AAAA").unwrap().is_delete());
        assert_eq!(
            find(&changes, "ns1.example.test.", "A").unwrap().mutation,
            Mutation::Replace(vec!["192.0.2.1".into()])
        );
    }

    #[test]
    fn picks_in_bailiwick_nameservers() {
        assert_eq!(
            in_bailiwick_nameservers(&domain()),
            vec!["ns1.example.test.".to_string()]
        );
    }
}
