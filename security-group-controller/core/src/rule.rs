use crate::{cidr::InvertedRange, destination, ports, PortRange};
use ipnet::Ipv4Net;
use korifi_security_group_controller_k8s_api::{Protocol, SecurityGroupRule, SecurityGroupSpec};
use std::fmt;

/// A transport protocol understood by the enforcement substrate.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Transport {
    Tcp,
    Udp,
}

/// Matches traffic of one transport protocol, optionally restricted to a port
/// range. `ports: None` matches every port.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PortSelector {
    pub transport: Transport,
    pub ports: Option<PortRange>,
}

/// The translated form of one rule: traffic matching any port selector is
/// allowed to any of the peer blocks.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EgressRule {
    pub ports: Vec<PortSelector>,
    pub peers: Vec<Ipv4Net>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("ports are not allowed for protocol all")]
    PortsNotAllowed,

    #[error("ports are required for protocols tcp and udp")]
    PortsRequired,

    #[error("invalid destination {0:?}: expected an IPv4 address, CIDR, or address range")]
    InvalidDestination(String),

    #[error(transparent)]
    InvertedRange(#[from] InvertedRange),

    #[error("invalid port {0:?}: ports must be between 1 and 65535 without leading zeros")]
    InvalidPort(String),

    #[error("invalid port range {0:?}: the first port must not exceed the last")]
    InvalidPortRange(String),

    #[error("invalid ports {0:?}: a port list may not be combined with a range")]
    MixedPortSyntax(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("displayName must not be empty")]
    EmptyDisplayName,

    #[error("rules[{index}]: {source}")]
    Rule {
        index: usize,
        #[source]
        source: RuleError,
    },
}

/// Translates a single rule.
pub fn translate(rule: &SecurityGroupRule) -> Result<EgressRule, RuleError> {
    let port_spec = rule.ports.as_deref().filter(|p| !p.is_empty());

    let ports = match (rule.protocol, port_spec) {
        (Protocol::All, Some(_)) => return Err(RuleError::PortsNotAllowed),
        (Protocol::All, None) => vec![
            PortSelector {
                transport: Transport::Tcp,
                ports: None,
            },
            PortSelector {
                transport: Transport::Udp,
                ports: None,
            },
        ],
        (Protocol::Tcp | Protocol::Udp, None) => return Err(RuleError::PortsRequired),
        (proto, Some(spec)) => {
            let transport = match proto {
                Protocol::Udp => Transport::Udp,
                _ => Transport::Tcp,
            };
            ports::parse_ports(spec)?
                .into_iter()
                .map(|range| PortSelector {
                    transport,
                    ports: Some(range),
                })
                .collect()
        }
    };

    let peers = destination::parse_destination(&rule.destination)?;

    Ok(EgressRule { ports, peers })
}

/// Translates every rule of a group, in order. The first bad rule fails the
/// whole set.
pub fn translate_all(rules: &[SecurityGroupRule]) -> Result<Vec<EgressRule>, ValidationError> {
    rules
        .iter()
        .enumerate()
        .map(|(index, rule)| translate(rule).map_err(|source| ValidationError::Rule { index, source }))
        .collect()
}

/// Checks that a spec can be accepted.
pub fn validate(spec: &SecurityGroupSpec) -> Result<(), ValidationError> {
    if spec.display_name.trim().is_empty() {
        return Err(ValidationError::EmptyDisplayName);
    }
    translate_all(&spec.rules)?;
    Ok(())
}

// === impl Transport ===

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => "TCP".fmt(f),
            Self::Udp => "UDP".fmt(f),
        }
    }
}
