use crate::{
    client::{GroupClient, PolicyClient},
    metrics::{Outcome, ReconcileMetrics},
    sync::{self, Synchronizer},
};
use ahash::AHashMap;
use korifi_security_group_controller_core::resolve;
use korifi_security_group_controller_k8s_api::{
    Condition, ResourceExt, SecurityGroup, SecurityGroupStatus, Time,
};
use kube::runtime::controller::Action;
use parking_lot::Mutex;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

pub const CONDITION_READY: &str = "Ready";
pub const REASON_SYNCED: &str = "Synced";
pub const REASON_SYNC_FAILED: &str = "SyncFailed";
pub const REASON_INVALID_RULES: &str = "InvalidRules";

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(5 * 60);

/// State shared by every reconciliation.
pub struct Context<C> {
    client: C,
    metrics: ReconcileMetrics,
    resync: Duration,

    /// Consecutive failures per group, keyed by `namespace/name`.
    failures: Mutex<AHashMap<String, u32>>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to update finalizer: {0}")]
    Finalizer(#[source] kube::Error),

    #[error("failed to list spaces: {0}")]
    ListSpaces(#[source] kube::Error),

    #[error("failed to update status: {0}")]
    Status(#[source] kube::Error),

    #[error(transparent)]
    Sync(#[from] sync::Error),
}

/// Reconciles one security group. Suitable for `Controller::run`.
pub async fn reconcile<C>(group: Arc<SecurityGroup>, ctx: Arc<Context<C>>) -> Result<Action, Error>
where
    C: PolicyClient + GroupClient,
{
    ctx.reconcile(&group).await
}

/// Schedules a retry for a failed reconciliation. Suitable for
/// `Controller::run`.
pub fn error_policy<C>(group: Arc<SecurityGroup>, error: &Error, ctx: Arc<Context<C>>) -> Action {
    ctx.backoff(&group, error)
}

// === impl Context ===

impl<C> Context<C> {
    pub fn new(client: C, metrics: ReconcileMetrics, resync: Duration) -> Self {
        Self {
            client,
            metrics,
            resync,
            failures: Default::default(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns a requeue that doubles with each consecutive failure of
    /// `group`, up to a ceiling.
    pub fn backoff(&self, group: &SecurityGroup, error: &Error) -> Action {
        let key = key(group);
        let attempts = {
            let mut failures = self.failures.lock();
            let attempts = failures.entry(key).or_default();
            *attempts = attempts.saturating_add(1);
            *attempts
        };
        let delay = BACKOFF_BASE
            .checked_mul(1 << (attempts - 1).min(16))
            .map_or(BACKOFF_MAX, |d| d.min(BACKOFF_MAX));
        let namespace = group.namespace().unwrap_or_default();
        tracing::warn!(
            %namespace,
            name = %group.name_any(),
            %error,
            attempts,
            retry_in = ?delay,
            "Failed to reconcile security group",
        );
        Action::requeue(delay)
    }

    fn succeeded(&self, group: &SecurityGroup) {
        self.failures.lock().remove(&key(group));
    }
}

impl<C> Context<C>
where
    C: PolicyClient + GroupClient,
{
    pub async fn reconcile(&self, group: &SecurityGroup) -> Result<Action, Error> {
        let started = Instant::now();
        let res = if group.is_deleting() {
            self.finalize(group).await
        } else {
            self.apply(group).await
        };
        self.metrics.reconciled(
            *res.as_ref().unwrap_or(&Outcome::Failed),
            started.elapsed(),
        );

        let outcome = res?;
        self.succeeded(group);
        match outcome {
            Outcome::Synced => Ok(Action::requeue(self.resync)),
            _ => Ok(Action::await_change()),
        }
    }

    /// Removes every derived policy, then releases the group for deletion.
    async fn finalize(&self, group: &SecurityGroup) -> Result<Outcome, Error> {
        if !group.has_finalizer() {
            return Ok(Outcome::TornDown);
        }

        let guid = group.guid();
        let summary = Synchronizer::new(&self.client, &self.metrics)
            .teardown(&guid)
            .await?;
        tracing::info!(%guid, deleted = summary.deleted, "Tore down security group policies");

        self.client
            .remove_finalizer(group)
            .await
            .map_err(Error::Finalizer)?;
        Ok(Outcome::TornDown)
    }

    /// Converges the group's derived policies and records the result in its
    /// status.
    async fn apply(&self, group: &SecurityGroup) -> Result<Outcome, Error> {
        if !group.has_finalizer() {
            self.client
                .add_finalizer(group)
                .await
                .map_err(Error::Finalizer)?;
        }

        let guid = group.guid();
        let spaces = self.client.list_spaces().await.map_err(Error::ListSpaces)?;
        let targets = resolve(&group.spec, &spaces);

        let res = Synchronizer::new(&self.client, &self.metrics)
            .sync(&guid, &group.spec, &targets)
            .await;

        let (ready, reason, message) = match &res {
            Ok(summary) => {
                tracing::debug!(
                    %guid,
                    targets = targets.len(),
                    created = summary.created,
                    updated = summary.updated,
                    deleted = summary.deleted,
                    skipped = summary.skipped,
                    "Synced security group",
                );
                (true, REASON_SYNCED, "Network policies are up to date".to_string())
            }
            Err(error @ sync::Error::InvalidRules(_)) => {
                (false, REASON_INVALID_RULES, error.to_string())
            }
            Err(error) => (false, REASON_SYNC_FAILED, error.to_string()),
        };
        self.update_status(group, ready, reason, message).await?;

        match res {
            Ok(_) => Ok(Outcome::Synced),
            Err(sync::Error::InvalidRules(error)) => {
                tracing::info!(%guid, %error, "Security group has invalid rules");
                Ok(Outcome::Invalid)
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn update_status(
        &self,
        group: &SecurityGroup,
        ready: bool,
        reason: &str,
        message: String,
    ) -> Result<(), Error> {
        let current = group.status.clone().unwrap_or_default();
        let status = SecurityGroupStatus {
            observed_generation: group.metadata.generation,
            conditions: vec![ready_condition(
                &current.conditions,
                group.metadata.generation,
                ready,
                reason,
                message,
            )],
        };
        if status == current {
            return Ok(());
        }
        self.client
            .patch_status(group, &status)
            .await
            .map_err(Error::Status)
    }
}

/// Builds the `Ready` condition, keeping the previous transition time unless
/// the condition's status flips.
pub fn ready_condition(
    previous: &[Condition],
    generation: Option<i64>,
    ready: bool,
    reason: &str,
    message: String,
) -> Condition {
    let status = if ready { "True" } else { "False" };
    let last_transition_time = previous
        .iter()
        .find(|c| c.type_ == CONDITION_READY && c.status == status)
        .map(|c| c.last_transition_time.clone())
        .unwrap_or_else(|| Time(chrono::Utc::now()));
    Condition {
        type_: CONDITION_READY.to_string(),
        status: status.to_string(),
        reason: reason.to_string(),
        message,
        observed_generation: generation,
        last_transition_time,
    }
}

fn key(group: &SecurityGroup) -> String {
    format!(
        "{}/{}",
        group.namespace().unwrap_or_default(),
        group.name_any()
    )
}
