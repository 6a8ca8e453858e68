use korifi_security_group_controller_core::Scope;
use korifi_security_group_controller_k8s_api::{
    ResourceExt, SecurityGroup, SecurityGroupRule, SecurityGroupSpec, SecurityGroupWorkloads,
};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateSecurityGroup {
    pub display_name: String,
    pub rules: Vec<SecurityGroupRule>,
    pub globally_enabled: SecurityGroupWorkloads,
    pub spaces: BTreeMap<String, SecurityGroupWorkloads>,
}

/// Filters for listing groups. Empty lists and `None`s match every group.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListSecurityGroups {
    pub guids: Vec<String>,
    pub names: Vec<String>,
    pub globally_enabled_running: Option<bool>,
    pub globally_enabled_staging: Option<bool>,

    /// Matches groups bound to every one of these spaces for running.
    pub running_space_guids: Vec<String>,

    /// Matches groups bound to every one of these spaces for staging.
    pub staging_space_guids: Vec<String>,
}

/// Changes to a group. Only the fields that are set are written.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateSecurityGroup {
    pub guid: String,
    pub display_name: Option<String>,
    pub rules: Option<Vec<SecurityGroupRule>>,
    pub globally_enabled_running: Option<bool>,
    pub globally_enabled_staging: Option<bool>,
}

// === impl CreateSecurityGroup ===

impl CreateSecurityGroup {
    pub fn into_spec(self) -> SecurityGroupSpec {
        SecurityGroupSpec {
            display_name: self.display_name,
            rules: self.rules,
            spaces: self.spaces,
            globally_enabled: self.globally_enabled,
        }
    }
}

// === impl ListSecurityGroups ===

impl ListSecurityGroups {
    pub fn matches(&self, group: &SecurityGroup) -> bool {
        let spec = &group.spec;
        empty_or_contains(&self.guids, &group.name_any())
            && empty_or_contains(&self.names, &spec.display_name)
            && none_or_eq(self.globally_enabled_running, spec.globally_enabled.running)
            && none_or_eq(self.globally_enabled_staging, spec.globally_enabled.staging)
            && bound_to_all(&self.running_space_guids, spec, Scope::Running)
            && bound_to_all(&self.staging_space_guids, spec, Scope::Staging)
    }
}

fn empty_or_contains(filter: &[String], value: &str) -> bool {
    filter.is_empty() || filter.iter().any(|f| f == value)
}

fn none_or_eq(filter: Option<bool>, value: bool) -> bool {
    filter.map_or(true, |f| f == value)
}

fn bound_to_all(spaces: &[String], spec: &SecurityGroupSpec, scope: Scope) -> bool {
    spaces.iter().all(|space| {
        spec.spaces
            .get(space)
            .is_some_and(|w| (*w | scope.workloads()) == *w)
    })
}

// === impl UpdateSecurityGroup ===

impl UpdateSecurityGroup {
    /// Applies the update to a copy of `spec`, for validation.
    pub fn apply(&self, spec: &SecurityGroupSpec) -> SecurityGroupSpec {
        let mut spec = spec.clone();
        if let Some(name) = &self.display_name {
            spec.display_name.clone_from(name);
        }
        if let Some(rules) = &self.rules {
            spec.rules.clone_from(rules);
        }
        if let Some(running) = self.globally_enabled_running {
            spec.globally_enabled.running = running;
        }
        if let Some(staging) = self.globally_enabled_staging {
            spec.globally_enabled.staging = staging;
        }
        spec
    }

    /// A JSON merge patch writing only the fields that are set.
    pub fn patch(&self) -> Value {
        let mut spec = Map::new();
        if let Some(name) = &self.display_name {
            spec.insert("displayName".into(), json!(name));
        }
        if let Some(rules) = &self.rules {
            spec.insert("rules".into(), json!(rules));
        }

        let mut global = Map::new();
        if let Some(running) = self.globally_enabled_running {
            global.insert("running".into(), json!(running));
        }
        if let Some(staging) = self.globally_enabled_staging {
            global.insert("staging".into(), json!(staging));
        }
        if !global.is_empty() {
            spec.insert("globallyEnabled".into(), Value::Object(global));
        }

        json!({ "spec": spec })
    }
}

/// A JSON merge patch binding `spaces` for `scope`, leaving every other
/// binding untouched.
pub fn bind_patch<S: AsRef<str>>(scope: Scope, spaces: &[S]) -> Value {
    let field = scope_field(scope);
    let spaces = spaces
        .iter()
        .map(|s| (s.as_ref().to_string(), json!({ field: true })))
        .collect::<Map<_, _>>();
    json!({ "spec": { "spaces": spaces } })
}

/// A JSON merge patch unbinding `space` for `scope`, or `None` when the group
/// is not bound there.
///
/// When no scope remains bound the space's entry is removed entirely. The
/// patch is conditional on the group's resource version, since it is computed
/// from the group's current bindings.
pub fn unbind_patch(group: &SecurityGroup, scope: Scope, space: &str) -> Option<Value> {
    let current = *group.spec.spaces.get(space)?;
    let remaining = SecurityGroupWorkloads {
        running: current.running && scope != Scope::Running,
        staging: current.staging && scope != Scope::Staging,
    };
    if remaining == current {
        return None;
    }

    let entry = if remaining.any() {
        json!(remaining)
    } else {
        Value::Null
    };
    Some(json!({
        "metadata": { "resourceVersion": group.resource_version() },
        "spec": { "spaces": { space: entry } },
    }))
}

fn scope_field(scope: Scope) -> &'static str {
    match scope {
        Scope::Running => "running",
        Scope::Staging => "staging",
    }
}
