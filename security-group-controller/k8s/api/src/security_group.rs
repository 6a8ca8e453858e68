use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// Blocks physical deletion of a security group until every policy derived
/// from it has been removed.
pub const FINALIZER: &str = "cfSecurityGroup.korifi.cloudfoundry.org";

/// A named bundle of egress rules that may be bound to spaces, or enabled
/// globally for every space.
#[derive(Clone, Debug, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "korifi.cloudfoundry.org",
    version = "v1alpha1",
    kind = "CFSecurityGroup",
    root = "SecurityGroup",
    status = "SecurityGroupStatus",
    printcolumn = r#"{"name":"DisplayName", "type":"string", "jsonPath":".spec.displayName"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupSpec {
    pub display_name: String,

    #[serde(default)]
    pub rules: Vec<SecurityGroupRule>,

    /// Space GUID to the workload scopes the group is bound to in that space.
    #[serde(default)]
    pub spaces: BTreeMap<String, SecurityGroupWorkloads>,

    #[serde(default)]
    pub globally_enabled: SecurityGroupWorkloads,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupRule {
    pub protocol: Protocol,

    /// An IPv4 address, an IPv4 CIDR, or an inclusive `start-end` address range.
    pub destination: String,

    /// A single port, a comma separated list of ports, or a `low-high` range.
    /// Must be absent when `protocol` is `all`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<String>,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub icmp_type: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<bool>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    All,
}

/// The workload scopes a group applies to.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema,
)]
pub struct SecurityGroupWorkloads {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub staging: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

// === impl SecurityGroup ===

impl SecurityGroup {
    /// The group's GUID, which is also its object name.
    pub fn guid(&self) -> String {
        self.name_any()
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == FINALIZER)
    }
}

// === impl SecurityGroupSpec ===

impl SecurityGroupSpec {
    pub fn is_globally_enabled(&self) -> bool {
        self.globally_enabled.any()
    }

    /// GUIDs of the spaces bound for running workloads, in order.
    pub fn running_spaces(&self) -> Vec<&str> {
        self.spaces
            .iter()
            .filter(|(_, w)| w.running)
            .map(|(guid, _)| guid.as_str())
            .collect()
    }

    /// GUIDs of the spaces bound for staging workloads, in order.
    pub fn staging_spaces(&self) -> Vec<&str> {
        self.spaces
            .iter()
            .filter(|(_, w)| w.staging)
            .map(|(guid, _)| guid.as_str())
            .collect()
    }
}

// === impl SecurityGroupWorkloads ===

impl SecurityGroupWorkloads {
    pub const RUNNING: Self = Self {
        running: true,
        staging: false,
    };

    pub const STAGING: Self = Self {
        running: false,
        staging: true,
    };

    pub const BOTH: Self = Self {
        running: true,
        staging: true,
    };

    pub fn any(&self) -> bool {
        self.running || self.staging
    }
}

impl std::ops::BitOr for SecurityGroupWorkloads {
    type Output = Self;

    fn bitor(self, other: Self) -> Self {
        Self {
            running: self.running || other.running,
            staging: self.staging || other.staging,
        }
    }
}

impl std::ops::BitOrAssign for SecurityGroupWorkloads {
    fn bitor_assign(&mut self, other: Self) {
        *self = *self | other;
    }
}

// === impl Protocol ===

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => "tcp".fmt(f),
            Self::Udp => "udp".fmt(f),
            Self::All => "all".fmt(f),
        }
    }
}
