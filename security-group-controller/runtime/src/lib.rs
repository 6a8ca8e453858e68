pub use korifi_security_group_controller_core as core;
pub use korifi_security_group_controller_k8s_api as k8s;
pub use korifi_security_group_controller_k8s_sync as sync;

mod admission;
mod args;
mod controller;

pub use self::args::Args;
