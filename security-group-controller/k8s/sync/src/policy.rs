//! Builds the `NetworkPolicy` objects that enforce a security group.

use korifi_security_group_controller_core::{workload_types, EgressRule, PortSelector};
use korifi_security_group_controller_k8s_api::{
    labels, IPBlock, IntOrString, LabelSelector, LabelSelectorRequirement, NetworkPolicy,
    NetworkPolicyEgressRule, NetworkPolicyPeer, NetworkPolicyPort, NetworkPolicySpec, ObjectMeta,
    ResourceExt, SecurityGroupWorkloads,
};
use std::collections::BTreeMap;

const POLICY_TYPE_EGRESS: &str = "Egress";

/// Builds the policy for the group `guid` in `namespace`, selecting the
/// workloads of every scope in `workloads`.
pub fn network_policy(
    guid: &str,
    namespace: &str,
    workloads: SecurityGroupWorkloads,
    rules: &[EgressRule],
) -> NetworkPolicy {
    NetworkPolicy {
        metadata: ObjectMeta {
            name: Some(guid.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                labels::SECURITY_GROUP_NAME.to_string(),
                guid.to_string(),
            )])),
            ..Default::default()
        },
        spec: Some(NetworkPolicySpec {
            pod_selector: pod_selector(workloads).into(),
            policy_types: Some(vec![POLICY_TYPE_EGRESS.to_string()]),
            egress: Some(rules.iter().map(egress_rule).collect()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Indicates whether `existing` already enforces what `desired` describes, so
/// that no write is needed.
///
/// Only the fields this controller owns are compared. Empty lists compare
/// equal to absent ones, since the API server drops them.
pub fn is_current(existing: &NetworkPolicy, desired: &NetworkPolicy) -> bool {
    let owner = |p: &NetworkPolicy| p.labels().get(labels::SECURITY_GROUP_NAME).cloned();
    if owner(existing) != owner(desired) {
        return false;
    }

    match (&existing.spec, &desired.spec) {
        (Some(e), Some(d)) => {
            e.pod_selector == d.pod_selector
                && e.policy_types.as_deref().unwrap_or_default()
                    == d.policy_types.as_deref().unwrap_or_default()
                && e.egress.as_deref().unwrap_or_default() == d.egress.as_deref().unwrap_or_default()
        }
        (None, None) => true,
        _ => false,
    }
}

fn pod_selector(workloads: SecurityGroupWorkloads) -> LabelSelector {
    LabelSelector {
        match_expressions: Some(vec![LabelSelectorRequirement {
            key: labels::WORKLOAD_TYPE.to_string(),
            operator: "In".to_string(),
            values: Some(
                workload_types(workloads)
                    .into_iter()
                    .map(Into::into)
                    .collect(),
            ),
        }]),
        match_labels: None,
    }
}

fn egress_rule(rule: &EgressRule) -> NetworkPolicyEgressRule {
    NetworkPolicyEgressRule {
        ports: Some(rule.ports.iter().map(network_policy_port).collect()),
        to: Some(
            rule.peers
                .iter()
                .map(|net| NetworkPolicyPeer {
                    ip_block: Some(IPBlock {
                        cidr: net.to_string(),
                        except: None,
                    }),
                    ..Default::default()
                })
                .collect(),
        ),
    }
}

fn network_policy_port(selector: &PortSelector) -> NetworkPolicyPort {
    let (port, end_port) = match selector.ports {
        None => (None, None),
        Some(range) if range.is_single() => (Some(range.min), None),
        Some(range) => (Some(range.min), Some(range.max)),
    };
    NetworkPolicyPort {
        protocol: Some(selector.transport.to_string()),
        port: port.map(|p| IntOrString::Int(u16::from(p).into())),
        end_port: end_port.map(|p| u16::from(p).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use korifi_security_group_controller_core::translate_all;
    use korifi_security_group_controller_k8s_api::{Protocol, SecurityGroupRule};
    use pretty_assertions::assert_eq;

    fn rule(protocol: Protocol, destination: &str, ports: Option<&str>) -> SecurityGroupRule {
        SecurityGroupRule {
            protocol,
            destination: destination.to_string(),
            ports: ports.map(Into::into),
            icmp_type: None,
            code: None,
            description: None,
            log: None,
        }
    }

    #[test]
    fn renders_policy() {
        let rules = translate_all(&[
            rule(Protocol::Tcp, "192.168.1.1", Some("80")),
            rule(Protocol::Udp, "10.0.0.0-10.0.0.1", Some("5000-5010")),
            rule(Protocol::All, "172.16.0.0/12", None),
        ])
        .unwrap();
        let policy = network_policy("sg-guid", "space-a", SecurityGroupWorkloads::BOTH, &rules);

        assert_eq!(
            serde_json::to_value(&policy).unwrap(),
            serde_json::json!({
                "apiVersion": "networking.k8s.io/v1",
                "kind": "NetworkPolicy",
                "metadata": {
                    "name": "sg-guid",
                    "namespace": "space-a",
                    "labels": {
                        "korifi.cloudfoundry.org/security-group-name": "sg-guid",
                    },
                },
                "spec": {
                    "podSelector": {
                        "matchExpressions": [{
                            "key": "korifi.cloudfoundry.org/workload-type",
                            "operator": "In",
                            "values": ["app", "build"],
                        }],
                    },
                    "policyTypes": ["Egress"],
                    "egress": [
                        {
                            "ports": [{"protocol": "TCP", "port": 80}],
                            "to": [{"ipBlock": {"cidr": "192.168.1.1/32"}}],
                        },
                        {
                            "ports": [{"protocol": "UDP", "port": 5000, "endPort": 5010}],
                            "to": [{"ipBlock": {"cidr": "10.0.0.0/31"}}],
                        },
                        {
                            "ports": [{"protocol": "TCP"}, {"protocol": "UDP"}],
                            "to": [{"ipBlock": {"cidr": "172.16.0.0/12"}}],
                        },
                    ],
                },
            })
        );
    }

    #[test]
    fn selects_scoped_workloads() {
        let running = network_policy("sg", "ns", SecurityGroupWorkloads::RUNNING, &[]);
        let staging = network_policy("sg", "ns", SecurityGroupWorkloads::STAGING, &[]);
        let values = |p: &NetworkPolicy| {
            serde_json::to_value(p).unwrap()["spec"]["podSelector"]["matchExpressions"][0]
                ["values"]
                .clone()
        };
        assert_eq!(values(&running), serde_json::json!(["app"]));
        assert_eq!(values(&staging), serde_json::json!(["build"]));
    }

    #[test]
    fn compares_owned_fields() {
        let rules = translate_all(&[rule(Protocol::Tcp, "10.0.0.1", Some("443"))]).unwrap();
        let desired = network_policy("sg", "ns", SecurityGroupWorkloads::RUNNING, &rules);

        let mut live = desired.clone();
        live.metadata.resource_version = Some("42".to_string());
        live.metadata.uid = Some("uid".to_string());
        assert!(is_current(&live, &desired));

        let rescoped = network_policy("sg", "ns", SecurityGroupWorkloads::BOTH, &rules);
        assert!(!is_current(&live, &rescoped));

        let reruled = network_policy("sg", "ns", SecurityGroupWorkloads::RUNNING, &[]);
        assert!(!is_current(&live, &reruled));

        let mut unlabeled = live.clone();
        unlabeled.metadata.labels = None;
        assert!(!is_current(&unlabeled, &desired));
    }

    #[test]
    fn empty_egress_matches_absent_egress() {
        let desired = network_policy("sg", "ns", SecurityGroupWorkloads::RUNNING, &[]);
        let mut live = desired.clone();
        if let Some(spec) = live.spec.as_mut() {
            spec.egress = None;
        }
        assert!(is_current(&live, &desired));
    }
}
