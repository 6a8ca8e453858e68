use crate::{
    messages::{bind_patch, unbind_patch, CreateSecurityGroup, ListSecurityGroups, UpdateSecurityGroup},
    SecurityGroupRecord,
};
use korifi_security_group_controller_core::{validate, Scope, ValidationError};
use korifi_security_group_controller_k8s_api::{
    Api, Client, DeleteParams, ListParams, Patch, PatchParams, PostParams, SecurityGroup,
};

/// Reads and writes security groups in the platform's root namespace.
///
/// Writes return as soon as the object store has accepted them; the derived
/// network policies converge asynchronously.
#[derive(Clone)]
pub struct SecurityGroupRepository {
    api: Api<SecurityGroup>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("security group {0} not found")]
    NotFound(String),

    #[error("security group name {0:?} is already taken")]
    DuplicateName(String),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("security group {0} changed concurrently")]
    Conflict(String),

    #[error(transparent)]
    Kube(#[from] kube::Error),
}

// === impl SecurityGroupRepository ===

impl SecurityGroupRepository {
    pub fn new(client: Client, root_namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, root_namespace),
        }
    }

    pub async fn create(&self, msg: CreateSecurityGroup) -> Result<SecurityGroupRecord, Error> {
        let spec = msg.into_spec();
        validate(&spec)?;
        self.ensure_unique_name(&spec.display_name, None).await?;

        let guid = uuid::Uuid::new_v4().to_string();
        let group = self
            .api
            .create(&PostParams::default(), &SecurityGroup::new(&guid, spec))
            .await?;
        tracing::info!(%guid, name = %group.spec.display_name, "Created security group");
        Ok(SecurityGroupRecord::from(&group))
    }

    pub async fn get(&self, guid: &str) -> Result<SecurityGroupRecord, Error> {
        let group = self.fetch(guid).await?;
        Ok(SecurityGroupRecord::from(&group))
    }

    pub async fn list(&self, msg: &ListSecurityGroups) -> Result<Vec<SecurityGroupRecord>, Error> {
        let groups = self.api.list(&ListParams::default()).await?;
        Ok(groups
            .items
            .iter()
            .filter(|g| msg.matches(g))
            .map(SecurityGroupRecord::from)
            .collect())
    }

    pub async fn update(&self, msg: &UpdateSecurityGroup) -> Result<SecurityGroupRecord, Error> {
        let current = self.fetch(&msg.guid).await?;
        let updated = msg.apply(&current.spec);
        validate(&updated)?;
        if updated.display_name != current.spec.display_name {
            self.ensure_unique_name(&updated.display_name, Some(&msg.guid))
                .await?;
        }

        self.patch(&msg.guid, msg.patch()).await
    }

    pub async fn bind_running<S: AsRef<str>>(
        &self,
        guid: &str,
        spaces: &[S],
    ) -> Result<SecurityGroupRecord, Error> {
        self.bind(guid, Scope::Running, spaces).await
    }

    pub async fn bind_staging<S: AsRef<str>>(
        &self,
        guid: &str,
        spaces: &[S],
    ) -> Result<SecurityGroupRecord, Error> {
        self.bind(guid, Scope::Staging, spaces).await
    }

    pub async fn unbind_running(&self, guid: &str, space: &str) -> Result<(), Error> {
        self.unbind(guid, Scope::Running, space).await
    }

    pub async fn unbind_staging(&self, guid: &str, space: &str) -> Result<(), Error> {
        self.unbind(guid, Scope::Staging, space).await
    }

    /// Marks the group for deletion. It is removed once its policies are torn
    /// down.
    pub async fn delete(&self, guid: &str) -> Result<(), Error> {
        self.api
            .delete(guid, &DeleteParams::default())
            .await
            .map_err(|e| store_error(e, guid))?;
        tracing::info!(%guid, "Deleted security group");
        Ok(())
    }

    async fn bind<S: AsRef<str>>(
        &self,
        guid: &str,
        scope: Scope,
        spaces: &[S],
    ) -> Result<SecurityGroupRecord, Error> {
        let record = self.patch(guid, bind_patch(scope, spaces)).await?;
        tracing::info!(%guid, ?scope, spaces = spaces.len(), "Bound security group");
        Ok(record)
    }

    async fn unbind(&self, guid: &str, scope: Scope, space: &str) -> Result<(), Error> {
        let group = self.fetch(guid).await?;
        let Some(patch) = unbind_patch(&group, scope, space) else {
            tracing::debug!(%guid, ?scope, %space, "Security group is not bound");
            return Ok(());
        };
        self.patch(guid, patch).await?;
        tracing::info!(%guid, ?scope, %space, "Unbound security group");
        Ok(())
    }

    async fn fetch(&self, guid: &str) -> Result<SecurityGroup, Error> {
        self.api
            .get_opt(guid)
            .await?
            .ok_or_else(|| Error::NotFound(guid.to_string()))
    }

    async fn patch(&self, guid: &str, patch: serde_json::Value) -> Result<SecurityGroupRecord, Error> {
        let group = self
            .api
            .patch(guid, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| store_error(e, guid))?;
        Ok(SecurityGroupRecord::from(&group))
    }

    /// Fails if a group other than `guid` that is not being deleted already
    /// uses `name`, ignoring case.
    async fn ensure_unique_name(&self, name: &str, guid: Option<&str>) -> Result<(), Error> {
        let groups = self.api.list(&ListParams::default()).await?;
        if name_taken(&groups.items, name, guid) {
            return Err(Error::DuplicateName(name.to_string()));
        }
        Ok(())
    }
}

fn name_taken(groups: &[SecurityGroup], name: &str, guid: Option<&str>) -> bool {
    groups.iter().any(|g| {
        !g.is_deleting()
            && Some(g.guid().as_str()) != guid
            && g.spec.display_name.eq_ignore_ascii_case(name)
    })
}

fn store_error(error: kube::Error, guid: &str) -> Error {
    match error {
        kube::Error::Api(ae) if ae.code == 404 => Error::NotFound(guid.to_string()),
        kube::Error::Api(ae) if ae.code == 409 => Error::Conflict(guid.to_string()),
        error => Error::Kube(error),
    }
}
