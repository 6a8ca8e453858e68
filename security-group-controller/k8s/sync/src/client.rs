use korifi_security_group_controller_k8s_api::{
    labels, Api, Client, DeleteParams, ListParams, NetworkPolicy, Patch, PatchParams, PostParams,
    ResourceExt, SecurityGroup, SecurityGroupStatus, Space, FINALIZER,
};

/// Reads and writes the derived network policies.
#[async_trait::async_trait]
pub trait PolicyClient: Send + Sync {
    async fn get_policy(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<NetworkPolicy>, kube::Error>;

    async fn create_policy(&self, namespace: &str, policy: &NetworkPolicy)
        -> Result<(), kube::Error>;

    /// Replaces a policy. `policy` carries the resource version it was read
    /// at, so a concurrent write fails with a conflict.
    async fn replace_policy(
        &self,
        namespace: &str,
        policy: &NetworkPolicy,
    ) -> Result<(), kube::Error>;

    /// Deletes a policy. Deleting a policy that does not exist succeeds.
    async fn delete_policy(&self, namespace: &str, name: &str) -> Result<(), kube::Error>;

    /// Lists every policy, in all namespaces, derived from the group `guid`.
    async fn list_policies(&self, guid: &str) -> Result<Vec<NetworkPolicy>, kube::Error>;
}

/// Reads spaces and updates security group bookkeeping.
#[async_trait::async_trait]
pub trait GroupClient: Send + Sync {
    /// Lists the GUIDs of every known space.
    async fn list_spaces(&self) -> Result<Vec<String>, kube::Error>;

    async fn add_finalizer(&self, group: &SecurityGroup) -> Result<(), kube::Error>;

    async fn remove_finalizer(&self, group: &SecurityGroup) -> Result<(), kube::Error>;

    async fn patch_status(
        &self,
        group: &SecurityGroup,
        status: &SecurityGroupStatus,
    ) -> Result<(), kube::Error>;
}

/// Implements both client seams against the Kubernetes API.
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
}

pub(crate) fn is_not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(ae) if ae.code == 404)
}

// === impl KubeClient ===

impl KubeClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn policies(&self, namespace: &str) -> Api<NetworkPolicy> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn groups(&self, group: &SecurityGroup) -> Api<SecurityGroup> {
        match group.namespace() {
            Some(ns) => Api::namespaced(self.client.clone(), &ns),
            None => Api::default_namespaced(self.client.clone()),
        }
    }

    /// Writes the finalizer list, conditional on the group not having changed
    /// since it was read.
    async fn patch_finalizers(
        &self,
        group: &SecurityGroup,
        finalizers: Vec<String>,
    ) -> Result<(), kube::Error> {
        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers,
                "resourceVersion": group.resource_version(),
            }
        });
        self.groups(group)
            .patch(&group.name_any(), &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl PolicyClient for KubeClient {
    async fn get_policy(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<NetworkPolicy>, kube::Error> {
        self.policies(namespace).get_opt(name).await
    }

    async fn create_policy(
        &self,
        namespace: &str,
        policy: &NetworkPolicy,
    ) -> Result<(), kube::Error> {
        self.policies(namespace)
            .create(&PostParams::default(), policy)
            .await?;
        Ok(())
    }

    async fn replace_policy(
        &self,
        namespace: &str,
        policy: &NetworkPolicy,
    ) -> Result<(), kube::Error> {
        self.policies(namespace)
            .replace(&policy.name_any(), &PostParams::default(), policy)
            .await?;
        Ok(())
    }

    async fn delete_policy(&self, namespace: &str, name: &str) -> Result<(), kube::Error> {
        match self
            .policies(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(error) if is_not_found(&error) => Ok(()),
            Err(error) => Err(error),
        }
    }

    async fn list_policies(&self, guid: &str) -> Result<Vec<NetworkPolicy>, kube::Error> {
        let params = ListParams::default().labels(&labels::security_group_selector(guid));
        let list = Api::<NetworkPolicy>::all(self.client.clone())
            .list(&params)
            .await?;
        Ok(list.items)
    }
}

#[async_trait::async_trait]
impl GroupClient for KubeClient {
    async fn list_spaces(&self) -> Result<Vec<String>, kube::Error> {
        let list = Api::<Space>::all(self.client.clone())
            .list(&ListParams::default())
            .await?;
        Ok(list.items.iter().map(ResourceExt::name_any).collect())
    }

    async fn add_finalizer(&self, group: &SecurityGroup) -> Result<(), kube::Error> {
        let mut finalizers = group.finalizers().to_vec();
        finalizers.push(FINALIZER.to_string());
        self.patch_finalizers(group, finalizers).await
    }

    async fn remove_finalizer(&self, group: &SecurityGroup) -> Result<(), kube::Error> {
        let finalizers = group
            .finalizers()
            .iter()
            .filter(|f| *f != FINALIZER)
            .cloned()
            .collect();
        match self.patch_finalizers(group, finalizers).await {
            Err(error) if is_not_found(&error) => Ok(()),
            res => res,
        }
    }

    async fn patch_status(
        &self,
        group: &SecurityGroup,
        status: &SecurityGroupStatus,
    ) -> Result<(), kube::Error> {
        let patch = serde_json::json!({ "status": status });
        self.groups(group)
            .patch_status(&group.name_any(), &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        Ok(())
    }
}
