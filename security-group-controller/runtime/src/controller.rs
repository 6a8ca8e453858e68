use crate::{
    k8s::{watcher, Api, Client, ResourceExt, SecurityGroup, Space},
    sync::{error_policy, reconcile, Context, KubeClient, ReconcileMetrics},
};
use futures::prelude::*;
use kube::runtime::{
    controller::{self, Controller},
    reflector::ObjectRef,
};
use std::{sync::Arc, time::Duration};

/// Watches security groups in the root namespace, and spaces everywhere, and
/// drives every group's reconciliation until shutdown.
pub(crate) async fn run(
    client: Client,
    root_namespace: String,
    metrics: ReconcileMetrics,
    resync: Duration,
    concurrency: u16,
) {
    let groups = Api::<SecurityGroup>::namespaced(client.clone(), &root_namespace);
    let spaces = Api::<Space>::all(client.clone());
    let ctx = Arc::new(Context::new(KubeClient::new(client), metrics, resync));

    let controller = Controller::new(groups, watcher::Config::default())
        .with_config(controller::Config::default().concurrency(concurrency));
    let store = controller.store();

    controller
        .watches(spaces, watcher::Config::default(), move |space: Space| {
            let refs = globally_enabled(&store.state());
            tracing::debug!(
                space = %space.name_any(),
                groups = refs.len(),
                "Space changed"
            );
            refs
        })
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| {
            match result {
                Ok((group, action)) => {
                    tracing::debug!(group = %group.name, ?action, "Reconciled")
                }
                Err(error) => tracing::warn!(%error, "Reconciliation failed"),
            }
            future::ready(())
        })
        .await;
}

/// Only globally enabled groups can gain targets when a space appears.
fn globally_enabled(groups: &[Arc<SecurityGroup>]) -> Vec<ObjectRef<SecurityGroup>> {
    groups
        .iter()
        .filter(|g| g.spec.is_globally_enabled())
        .map(|g| ObjectRef::from_obj(g.as_ref()))
        .collect()
}
