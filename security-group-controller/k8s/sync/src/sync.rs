use crate::{
    client::{is_not_found, PolicyClient},
    metrics::{Op, ReconcileMetrics},
    policy,
};
use korifi_security_group_controller_core::{by_namespace, translate_all, Target, ValidationError};
use korifi_security_group_controller_k8s_api::{NetworkPolicy, ResourceExt, SecurityGroupSpec};
use std::{collections::BTreeSet, fmt};

/// Converges the policies derived from one security group.
pub struct Synchronizer<'a, P> {
    client: &'a P,
    metrics: &'a ReconcileMetrics,
}

/// What a pass changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    /// Targets whose namespace no longer exists.
    pub skipped: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("rules are invalid: {0}")]
    InvalidRules(#[from] ValidationError),

    #[error("failed to list policies: {0}")]
    List(#[source] kube::Error),

    #[error("{} policy operation(s) failed; first: {}", .0.len(), .0[0])]
    Incomplete(Vec<Failure>),
}

/// A policy write that failed. Other namespaces are still attempted.
#[derive(Debug)]
pub struct Failure {
    pub op: Op,
    pub namespace: String,
    pub error: kube::Error,
}

// === impl Synchronizer ===

impl<'a, P: PolicyClient> Synchronizer<'a, P> {
    pub fn new(client: &'a P, metrics: &'a ReconcileMetrics) -> Self {
        Self { client, metrics }
    }

    /// Makes the policies labeled with `guid` exactly those implied by
    /// `targets`.
    ///
    /// Rules are translated before anything is written; invalid rules fail
    /// the pass without touching any policy. A failed write does not stop
    /// the remaining namespaces from being converged, but the pass then
    /// fails with every failure.
    pub async fn sync(
        &self,
        guid: &str,
        spec: &SecurityGroupSpec,
        targets: &BTreeSet<Target>,
    ) -> Result<Summary, Error> {
        let rules = translate_all(&spec.rules)?;
        let desired = by_namespace(targets);

        let mut summary = Summary::default();
        let mut failures = Vec::new();

        for (namespace, workloads) in &desired {
            let policy = policy::network_policy(guid, namespace, *workloads, &rules);
            if let Err(failure) = self.apply(namespace, policy, &mut summary).await {
                failures.push(failure);
            }
        }

        let live = self.client.list_policies(guid).await.map_err(Error::List)?;
        for orphan in live {
            let namespace = orphan.namespace().unwrap_or_default();
            if desired.contains_key(&namespace) {
                continue;
            }
            match self.delete(&namespace, &orphan.name_any()).await {
                Ok(()) => summary.deleted += 1,
                Err(failure) => failures.push(failure),
            }
        }

        if !failures.is_empty() {
            return Err(Error::Incomplete(failures));
        }
        Ok(summary)
    }

    /// Deletes every policy derived from `guid`.
    pub async fn teardown(&self, guid: &str) -> Result<Summary, Error> {
        let live = self.client.list_policies(guid).await.map_err(Error::List)?;

        let mut summary = Summary::default();
        let mut failures = Vec::new();
        for policy in live {
            let namespace = policy.namespace().unwrap_or_default();
            match self.delete(&namespace, &policy.name_any()).await {
                Ok(()) => summary.deleted += 1,
                Err(failure) => failures.push(failure),
            }
        }

        if !failures.is_empty() {
            return Err(Error::Incomplete(failures));
        }
        Ok(summary)
    }

    async fn apply(
        &self,
        namespace: &str,
        mut policy: NetworkPolicy,
        summary: &mut Summary,
    ) -> Result<(), Failure> {
        let name = policy.name_any();
        let fail = |op, error| Failure {
            op,
            namespace: namespace.to_string(),
            error,
        };

        let existing = self
            .client
            .get_policy(namespace, &name)
            .await
            .map_err(|e| fail(Op::Update, e))?;

        match existing {
            None => match self.client.create_policy(namespace, &policy).await {
                Ok(()) => {
                    tracing::info!(%namespace, %name, "Created network policy");
                    self.metrics.wrote(Op::Create);
                    summary.created += 1;
                }
                Err(error) if is_not_found(&error) => {
                    tracing::debug!(%namespace, %name, "Namespace not found; skipping");
                    summary.skipped += 1;
                }
                Err(error) => return Err(fail(Op::Create, error)),
            },

            Some(existing) if policy::is_current(&existing, &policy) => {
                tracing::trace!(%namespace, %name, "Network policy is current");
                summary.unchanged += 1;
            }

            Some(existing) => {
                policy.metadata.resource_version = existing.metadata.resource_version;
                self.client
                    .replace_policy(namespace, &policy)
                    .await
                    .map_err(|e| fail(Op::Update, e))?;
                tracing::info!(%namespace, %name, "Updated network policy");
                self.metrics.wrote(Op::Update);
                summary.updated += 1;
            }
        }

        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Failure> {
        self.client
            .delete_policy(namespace, name)
            .await
            .map_err(|error| Failure {
                op: Op::Delete,
                namespace: namespace.to_string(),
                error,
            })?;
        tracing::info!(%namespace, %name, "Deleted network policy");
        self.metrics.wrote(Op::Delete);
        Ok(())
    }
}

// === impl Summary ===

impl Summary {
    pub fn writes(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

// === impl Failure ===

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}: {}", self.op, self.namespace, self.error)
    }
}
