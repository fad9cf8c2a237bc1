//! The ACP auth server.
//!
//! Ingress controllers forward each protected request here, on the path of
//! the policy protecting it. The request's headers are checked against the
//! policy and the answer tells the controller whether to let the request
//! through and which headers to add to it.

use crate::{
    core::apikey::Outcome,
    metrics::{AuthMetrics, AuthOutcome},
    PolicyIndex,
};
use anyhow::Result;
use futures::future;
use hyper::{http, Request, Response};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
    service::TowerToHyperService,
};
use std::{convert::Infallible, net::SocketAddr};
use tokio::net::TcpListener;
use tracing::{debug, info, instrument, warn, Instrument};

#[derive(Clone, Debug)]
pub(crate) struct AuthServer {
    policies: PolicyIndex,
    metrics: AuthMetrics,
}

type Body = http_body_util::Full<bytes::Bytes>;

// === impl AuthServer ===

impl AuthServer {
    pub(crate) fn new(policies: PolicyIndex, metrics: AuthMetrics) -> Self {
        Self { policies, metrics }
    }

    pub(crate) fn authenticate<B>(&self, req: &Request<B>) -> Response<Body> {
        let canonical = req.uri().path().trim_start_matches('/');
        if canonical.is_empty() || canonical.contains('/') {
            self.metrics.observe(AuthOutcome::NotFound);
            return status(http::StatusCode::NOT_FOUND);
        }

        let Some(handler) = self.policies.handler(canonical) else {
            debug!(policy = %canonical, "No handler for policy");
            self.metrics.observe(AuthOutcome::NotFound);
            return status(http::StatusCode::NOT_FOUND);
        };

        match handler.authenticate(req.headers()) {
            Ok(Outcome::Accepted(headers)) => {
                debug!(policy = %canonical, "Accepted");
                self.metrics.observe(AuthOutcome::Accepted);
                let mut rsp = status(http::StatusCode::OK);
                *rsp.headers_mut() = headers;
                rsp
            }
            Ok(Outcome::Rejected) => {
                self.metrics.observe(AuthOutcome::Rejected);
                status(http::StatusCode::UNAUTHORIZED)
            }
            Err(error) => {
                warn!(policy = %canonical, %error, "Failed to authenticate request");
                self.metrics.observe(AuthOutcome::Error);
                status(http::StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

impl<B> tower::Service<Request<B>> for AuthServer {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = future::Ready<Result<Response<Body>, Infallible>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        future::ok(self.authenticate(&req))
    }
}

fn status(code: http::StatusCode) -> Response<Body> {
    let mut rsp = Response::new(Body::default());
    *rsp.status_mut() = code;
    rsp
}

/// Serves the auth server until the drain signal fires. Open connections are
/// shut down gracefully before the drain handle is released.
#[instrument(skip_all, fields(port = %addr.port()))]
pub(crate) async fn serve(addr: SocketAddr, svc: AuthServer, drain: drain::Watch) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "ACP auth server listening");

    tokio::select! {
        res = accept(listener, svc, drain.clone()) => res,
        handle = drain.signaled() => {
            debug!("Stopped accepting connections");
            drop(handle);
            Ok(())
        }
    }
}

async fn accept(listener: TcpListener, svc: AuthServer, drain: drain::Watch) -> Result<()> {
    loop {
        let (io, client) = match listener.accept().await {
            Ok(conn) => conn,
            Err(error) => {
                warn!(%error, "Failed to accept connection");
                continue;
            }
        };

        let svc = TowerToHyperService::new(svc.clone());
        let drain = drain.clone();
        tokio::spawn(
            async move {
                let http = auto::Builder::new(TokioExecutor::new());
                let conn = http.serve_connection(TokioIo::new(io), svc);
                tokio::pin!(conn);

                let res = tokio::select! {
                    res = conn.as_mut() => res,
                    handle = drain.signaled() => {
                        conn.as_mut().graceful_shutdown();
                        handle.release_after(conn).await
                    }
                };
                if let Err(error) = res {
                    debug!(%error, "Connection closed");
                }
            }
            .instrument(tracing::debug_span!("conn", %client)),
        );
    }
}
