use korifi_security_group_controller_k8s_api::{
    labels, SecurityGroupSpec, SecurityGroupWorkloads,
};
use std::collections::{BTreeMap, BTreeSet};

/// The kind of workload a group is enforced on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    Running,
    Staging,
}

/// A namespace a group must be enforced in, for one scope.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Target {
    pub namespace: String,
    pub scope: Scope,
}

/// Computes the targets a group must be enforced on, given every known space.
///
/// Explicit space bindings and the global flags are unioned: a globally
/// enabled scope applies to every space in `spaces`, whether or not the group
/// also binds it explicitly. Explicit bindings are honored even for spaces
/// that are not (yet) known.
pub fn resolve<I>(spec: &SecurityGroupSpec, spaces: I) -> BTreeSet<Target>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut targets = BTreeSet::new();

    for (space, workloads) in &spec.spaces {
        for scope in Scope::of(*workloads) {
            targets.insert(Target::new(space, scope));
        }
    }

    let global = spec.globally_enabled;
    if global.any() {
        for space in spaces {
            for scope in Scope::of(global) {
                targets.insert(Target::new(space.as_ref(), scope));
            }
        }
    }

    targets
}

/// Merges targets per namespace, so that each namespace holds a single policy
/// covering every scope it is targeted for.
pub fn by_namespace<'t>(
    targets: impl IntoIterator<Item = &'t Target>,
) -> BTreeMap<String, SecurityGroupWorkloads> {
    let mut namespaces = BTreeMap::<String, SecurityGroupWorkloads>::new();
    for Target { namespace, scope } in targets {
        *namespaces.entry(namespace.clone()).or_default() |= scope.workloads();
    }
    namespaces
}

/// The workload-type label values selected for the given scopes.
pub fn workload_types(workloads: SecurityGroupWorkloads) -> Vec<&'static str> {
    Scope::of(workloads).map(Scope::workload_type).collect()
}

// === impl Scope ===

impl Scope {
    /// The scopes enabled in `workloads`, running first.
    pub fn of(workloads: SecurityGroupWorkloads) -> impl Iterator<Item = Scope> {
        [
            workloads.running.then_some(Scope::Running),
            workloads.staging.then_some(Scope::Staging),
        ]
        .into_iter()
        .flatten()
    }

    pub fn workloads(self) -> SecurityGroupWorkloads {
        match self {
            Self::Running => SecurityGroupWorkloads::RUNNING,
            Self::Staging => SecurityGroupWorkloads::STAGING,
        }
    }

    pub fn workload_type(self) -> &'static str {
        match self {
            Self::Running => labels::WORKLOAD_TYPE_APP,
            Self::Staging => labels::WORKLOAD_TYPE_BUILD,
        }
    }
}

// === impl Target ===

impl Target {
    pub fn new(namespace: impl Into<String>, scope: Scope) -> Self {
        Self {
            namespace: namespace.into(),
            scope,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::{btreemap, btreeset};
    use pretty_assertions::assert_eq;

    fn spec(
        spaces: BTreeMap<String, SecurityGroupWorkloads>,
        globally_enabled: SecurityGroupWorkloads,
    ) -> SecurityGroupSpec {
        SecurityGroupSpec {
            display_name: "sg".to_string(),
            rules: vec![],
            spaces,
            globally_enabled,
        }
    }

    #[test]
    fn empty_group_has_no_targets() {
        let spec = spec(Default::default(), Default::default());
        assert!(resolve(&spec, ["space-a", "space-b"]).is_empty());
    }

    #[test]
    fn explicit_bindings() {
        let spec = spec(
            btreemap! {
                "space-a".to_string() => SecurityGroupWorkloads::RUNNING,
                "space-b".to_string() => SecurityGroupWorkloads::BOTH,
                "space-c".to_string() => SecurityGroupWorkloads::default(),
            },
            Default::default(),
        );
        assert_eq!(
            resolve(&spec, ["space-a", "space-b", "space-c", "space-d"]),
            btreeset! {
                Target::new("space-a", Scope::Running),
                Target::new("space-b", Scope::Running),
                Target::new("space-b", Scope::Staging),
            }
        );
    }

    #[test]
    fn global_scope_reaches_every_space() {
        let spec = spec(Default::default(), SecurityGroupWorkloads::RUNNING);
        assert_eq!(
            resolve(&spec, ["space-a"]),
            btreeset! { Target::new("space-a", Scope::Running) }
        );
        assert_eq!(
            resolve(&spec, ["space-a", "space-new"]),
            btreeset! {
                Target::new("space-a", Scope::Running),
                Target::new("space-new", Scope::Running),
            }
        );
    }

    #[test]
    fn global_and_explicit_bindings_are_unioned() {
        let spec = spec(
            btreemap! {
                "space-a".to_string() => SecurityGroupWorkloads::BOTH,
                "space-b".to_string() => SecurityGroupWorkloads::RUNNING,
            },
            SecurityGroupWorkloads::STAGING,
        );
        assert_eq!(
            resolve(&spec, ["space-a", "space-c"]),
            btreeset! {
                Target::new("space-a", Scope::Running),
                Target::new("space-a", Scope::Staging),
                Target::new("space-b", Scope::Running),
                Target::new("space-c", Scope::Staging),
            }
        );
    }

    #[test]
    fn merges_scopes_per_namespace() {
        let targets = btreeset! {
            Target::new("space-a", Scope::Running),
            Target::new("space-a", Scope::Staging),
            Target::new("space-b", Scope::Staging),
        };
        let merged = by_namespace(&targets);
        assert_eq!(
            merged,
            btreemap! {
                "space-a".to_string() => SecurityGroupWorkloads::BOTH,
                "space-b".to_string() => SecurityGroupWorkloads::STAGING,
            }
        );
        assert_eq!(workload_types(merged["space-a"]), vec!["app", "build"]);
        assert_eq!(workload_types(merged["space-b"]), vec!["build"]);
    }
}
