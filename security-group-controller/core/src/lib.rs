#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Pure translation of security groups: rules into egress rules, address
//! ranges into CIDR blocks, and space bindings into enforcement targets.

pub mod cidr;
mod destination;
mod ports;
pub mod rule;
pub mod target;

pub use self::{
    cidr::range_to_cidrs,
    destination::parse_destination,
    ports::{parse_ports, PortRange},
    rule::{
        translate, translate_all, validate, EgressRule, PortSelector, RuleError, Transport,
        ValidationError,
    },
    target::{by_namespace, resolve, workload_types, Scope, Target},
};
pub use ipnet::Ipv4Net;
