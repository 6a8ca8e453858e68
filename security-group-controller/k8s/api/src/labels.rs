//! Labels and label values shared between the security group API and the
//! network policies derived from it.

/// Links a derived `NetworkPolicy` back to the `CFSecurityGroup` it was
/// generated from. The value is the security group's GUID.
pub const SECURITY_GROUP_NAME: &str = "korifi.cloudfoundry.org/security-group-name";

/// Set on every workload pod to distinguish running apps from staging builds.
pub const WORKLOAD_TYPE: &str = "korifi.cloudfoundry.org/workload-type";

/// `WORKLOAD_TYPE` value for running application instances.
pub const WORKLOAD_TYPE_APP: &str = "app";

/// `WORKLOAD_TYPE` value for staging (build) workloads.
pub const WORKLOAD_TYPE_BUILD: &str = "build";

/// Returns a label selector query matching every policy derived from the
/// security group with the given GUID.
pub fn security_group_selector(guid: &str) -> String {
    format!("{SECURITY_GROUP_NAME}={guid}")
}
