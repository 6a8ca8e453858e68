use crate::{admission::Admission, controller, sync::ReconcileMetrics};
use anyhow::{bail, ensure, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use std::time::Duration;
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "security-group-controller",
    about = "Enforces security groups as network policies"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "korifi=info,warn",
        env = "KORIFI_SECURITY_GROUP_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    server: kubert::ServerArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Disables the admission controller server.
    #[clap(long)]
    admission_controller_disabled: bool,

    /// The namespace holding security groups.
    #[clap(long, default_value = "cf")]
    root_namespace: String,

    /// How often every security group is reconciled in the absence of changes.
    #[clap(long, default_value = "600")]
    resync_period_secs: u64,

    /// The number of security groups reconciled in parallel.
    #[clap(long, default_value = "4")]
    controller_concurrency: u16,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            server,
            admission_controller_disabled,
            root_namespace,
            resync_period_secs,
            controller_concurrency,
        } = self;

        ensure!(resync_period_secs > 0, "--resync-period-secs must be positive");

        let server = if admission_controller_disabled {
            None
        } else {
            Some(server)
        };

        let mut prom = <Registry>::default();
        let metrics = ReconcileMetrics::register(prom.sub_registry_with_prefix("security_group"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .with_optional_server(server)
            .build()
            .await?;

        info!(namespace = %root_namespace, "Watching security groups");
        tokio::spawn(
            controller::run(
                runtime.client(),
                root_namespace,
                metrics,
                Duration::from_secs(resync_period_secs),
                controller_concurrency,
            )
            .instrument(info_span!("securitygroups")),
        );

        let runtime = runtime.spawn_server(Admission::new);

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
