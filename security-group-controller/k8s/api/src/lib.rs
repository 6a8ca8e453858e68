#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod labels;
pub mod security_group;
pub mod space;

pub use self::{
    security_group::{
        Protocol, SecurityGroup, SecurityGroupRule, SecurityGroupSpec, SecurityGroupStatus,
        SecurityGroupWorkloads, FINALIZER,
    },
    space::{Space, SpaceSpec},
};
pub use k8s_openapi::{
    api::networking::v1::{
        IPBlock, NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicyPeer, NetworkPolicyPort,
        NetworkPolicySpec,
    },
    apimachinery::pkg::{
        apis::meta::v1::{Condition, LabelSelector, LabelSelectorRequirement, Time},
        util::intstr::IntOrString,
    },
};
pub use kube::{
    api::{Api, DeleteParams, ListParams, ObjectMeta, Patch, PatchParams, PostParams},
    runtime::watcher,
    Client, Error, Resource, ResourceExt,
};
