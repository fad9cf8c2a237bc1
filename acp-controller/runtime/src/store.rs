use crate::{
    core::CONTROLLER_NAME,
    k8s::{traefik::Middleware, Client, ResourceExt},
    review::MiddlewareStore,
};
use anyhow::Context;
use kube::api::{Api, Patch, PatchParams};

/// Writes managed middlewares to the cluster with server-side apply, so that
/// repeated reviews converge on the same object.
#[derive(Clone)]
pub(crate) struct KubeMiddlewareStore {
    client: Client,
}

impl KubeMiddlewareStore {
    pub(crate) fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl MiddlewareStore for KubeMiddlewareStore {
    async fn apply(&self, middleware: Middleware) -> anyhow::Result<()> {
        let ns = middleware
            .namespace()
            .context("middleware must be namespaced")?;
        let name = middleware.name_any();

        let api = Api::<Middleware>::namespaced(self.client.clone(), &ns);
        let params = PatchParams::apply(CONTROLLER_NAME).force();
        api.patch(&name, &params, &Patch::Apply(&middleware)).await?;
        tracing::debug!(%ns, %name, "Applied middleware");
        Ok(())
    }
}
