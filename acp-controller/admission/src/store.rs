use acp_controller_k8s_api::traefik::Middleware;

/// Persists the Traefik middlewares managed by the controller.
#[async_trait::async_trait]
pub trait MiddlewareStore: Send + Sync {
    /// Creates or updates the middleware. The middleware must carry its name
    /// and namespace.
    async fn apply(&self, middleware: Middleware) -> anyhow::Result<()>;
}
