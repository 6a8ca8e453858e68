#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! The write path for security groups: creating, updating, binding and
//! deleting `CFSecurityGroup` objects on behalf of API callers.

mod messages;
mod record;
mod repository;

pub use self::{
    messages::{bind_patch, unbind_patch, CreateSecurityGroup, ListSecurityGroups, UpdateSecurityGroup},
    record::SecurityGroupRecord,
    repository::{Error, SecurityGroupRepository},
};
