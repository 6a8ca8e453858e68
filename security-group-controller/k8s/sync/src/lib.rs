#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod client;
mod metrics;
pub mod policy;
pub mod reconcile;
pub mod sync;


pub use self::{
    client::{GroupClient, KubeClient, PolicyClient},
    metrics::{Op, Outcome, ReconcileMetrics},
    reconcile::{error_policy, reconcile, Context, Error},
    sync::{Summary, Synchronizer},
};
