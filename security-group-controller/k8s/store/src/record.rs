use chrono::{DateTime, Utc};
use korifi_security_group_controller_k8s_api::{
    ResourceExt, SecurityGroup, SecurityGroupRule, SecurityGroupWorkloads,
};
use std::collections::BTreeMap;

/// A security group as returned to API callers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecurityGroupRecord {
    pub guid: String,
    pub display_name: String,
    pub rules: Vec<SecurityGroupRule>,
    pub globally_enabled: SecurityGroupWorkloads,
    pub spaces: BTreeMap<String, SecurityGroupWorkloads>,

    /// Spaces bound for running workloads, sorted.
    pub running_spaces: Vec<String>,

    /// Spaces bound for staging workloads, sorted.
    pub staging_spaces: Vec<String>,

    pub created_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<&SecurityGroup> for SecurityGroupRecord {
    fn from(group: &SecurityGroup) -> Self {
        let spec = &group.spec;
        Self {
            guid: group.guid(),
            display_name: spec.display_name.clone(),
            rules: spec.rules.clone(),
            globally_enabled: spec.globally_enabled,
            spaces: spec.spaces.clone(),
            running_spaces: spec.running_spaces().into_iter().map(Into::into).collect(),
            staging_spaces: spec.staging_spaces().into_iter().map(Into::into).collect(),
            created_at: group.creation_timestamp().map(|t| t.0),
            deleted_at: group.metadata.deletion_timestamp.as_ref().map(|t| t.0),
        }
    }
}
