use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A space groups application workloads. Its name is the space GUID and the
/// name of the namespace that holds the space's workloads.
#[derive(Clone, Debug, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "korifi.cloudfoundry.org",
    version = "v1alpha1",
    kind = "CFSpace",
    root = "Space",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct SpaceSpec {
    #[serde(default)]
    pub display_name: String,
}
