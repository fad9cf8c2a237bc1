use crate::{
    admission::Admission,
    auth::{self, AuthServer},
    index,
    k8s::{self, Client, Resource},
    metrics::{AdmissionMetrics, AuthMetrics},
    review::{self, Dispatcher},
    store::KubeMiddlewareStore,
    IngressClassIndex, PolicyIndex,
};
use anyhow::{bail, Result};
use clap::Parser;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use std::{net::SocketAddr, sync::Arc};
use tracing::{info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "acp-controller",
    about = "Enforces access control policies on ingress resources"
)]
pub struct Args {
    #[clap(long, default_value = "acp=info,warn", env = "ACP_CONTROLLER_LOG")]
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

    /// Address the ACP auth server listens on.
    #[clap(long, default_value = "0.0.0.0:8080")]
    auth_server_addr: SocketAddr,

    /// URL ingress controllers use to reach the ACP auth server.
    #[clap(long, env = "ACP_CONTROLLER_AUTH_SERVER_URL")]
    auth_server_url: String,
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
            auth_server_addr,
            auth_server_url,
        } = self;

        let server = if admission_controller_disabled {
            None
        } else {
            Some(server)
        };

        // Build the indexes that hold the cluster state reviews and the auth
        // server are evaluated against.
        let ingress_classes = index::ingress_class::Index::shared();
        let policies = index::policy::Index::shared();

        let mut prom = <Registry>::default();
        index::metrics::register(&mut prom, ingress_classes.clone(), policies.clone());
        let admission_metrics = AdmissionMetrics::register(&mut prom);
        let auth_metrics = AuthMetrics::register(&mut prom);
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .with_optional_server(server)
            .build()
            .await?;

        // Spawn resource watches.

        let classes = runtime.watch_all::<k8s::IngressClass>(watcher::Config::default());
        tokio::spawn(
            kubert::index::cluster(ingress_classes.clone(), classes)
                .instrument(info_span!("ingressclasses")),
        );

        if api_resource_exists::<k8s::AccessControlPolicy>(&runtime.client()).await {
            let acps = runtime.watch_all::<k8s::AccessControlPolicy>(watcher::Config::default());
            tokio::spawn(
                kubert::index::namespaced(policies.clone(), acps)
                    .instrument(info_span!("accesscontrolpolicies")),
            );
        } else {
            tracing::warn!(
                "accesscontrolpolicies.hub.traefik.io resource kind not found, skipping watches"
            );
        }

        // Run the auth server, answering ingress controllers' forwarded
        // requests by looking up handlers against the policy index.
        let auth = AuthServer::new(PolicyIndex::new(policies.clone()), auth_metrics);
        tokio::spawn(auth::serve(auth_server_addr, auth, runtime.shutdown_handle()));

        let dispatcher = Arc::new(Dispatcher::new(
            review::Config { auth_server_url },
            Arc::new(IngressClassIndex::new(ingress_classes)),
            Arc::new(PolicyIndex::new(policies)),
            Arc::new(KubeMiddlewareStore::new(runtime.client())),
        ));
        let admission = Admission::new(dispatcher, admission_metrics);
        let runtime = runtime.spawn_server(move || admission.clone());

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

async fn api_resource_exists<T>(client: &Client) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    client
        .list_api_group_resources(&T::api_version(&dt))
        .await
        .ok()
        .iter()
        .flat_map(|r| r.resources.iter())
        .any(|r| r.kind == T::kind(&dt))
}
